//! Errors raised while building the registry and running shell modules.
//!
//! None of these cross the dispatch pipeline: the dispatcher converts every
//! failure into an [`RpcError`](rpcd_types::RpcError) in the request's reply
//! slot. I/O errors are wrapped in `Arc` to keep the enums small.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use rpcd_types::TypeError;
use thiserror::Error;

/// Errors raised while parsing firewall rule declarations.
#[derive(Debug, Clone, Error)]
pub enum FirewallError {
    /// A rule is not a map.
    #[error("firewall rule must be a table, got {kind}")]
    NotATable {
        /// Kind that was supplied instead.
        kind: rpcd_types::ValueKind,
    },
    /// A rule has no parameter name.
    #[error("firewall rule is missing a parameter name")]
    MissingName,
    /// The `type` entry names no known value kind.
    #[error("firewall rule for '{name}' has an invalid type")]
    InvalidKind {
        /// Parameter the rule guards.
        name: String,
        /// Parse failure.
        #[source]
        source: TypeError,
    },
    /// The `regex` entry does not compile.
    #[error("firewall rule for '{name}' has an invalid pattern")]
    InvalidPattern {
        /// Parameter the rule guards.
        name: String,
        /// Compilation failure.
        #[source]
        source: Box<regex::Error>,
    },
}

/// Reasons a directory entry was not registered as a module.
///
/// These are diagnostics: the scan continues past them.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No native implementation is linked under the file stem.
    #[error("no native module is linked for '{stem}'")]
    UnknownNative {
        /// File stem that was looked up.
        stem: String,
    },
    /// The native implementation reports a different API tag.
    #[error("module '{stem}' reports API tag {found:#010x}, expected {expected:#010x}")]
    ApiTagMismatch {
        /// File stem of the module.
        stem: String,
        /// Tag reported by the module.
        found: u32,
        /// Tag this daemon understands.
        expected: u32,
    },
    /// The entry's metadata could not be read.
    #[error("failed to inspect '{path}': {source}")]
    Metadata {
        /// Entry path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Errors raised while building or initialising the registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A configured directory does not exist.
    #[error("module directory '{path}' does not exist")]
    MissingDirectory {
        /// Configured path.
        path: Utf8PathBuf,
    },
    /// A configured path is not a directory.
    #[error("module path '{path}' is not a directory")]
    NotADirectory {
        /// Configured path.
        path: Utf8PathBuf,
    },
    /// A directory could not be listed.
    #[error("failed to read module directory '{path}': {source}")]
    ReadDirectory {
        /// Directory path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A directory that requires a handler loaded no module.
    #[error("module directory '{path}' provided no handler")]
    NoHandlers {
        /// Directory path.
        path: Utf8PathBuf,
    },
    /// Two directories of one service share a name.
    #[error("service '{service}' already has a directory named '{name}'")]
    DuplicateDirectory {
        /// Owning service.
        service: String,
        /// Clashing directory name.
        name: String,
    },
    /// A module's configuration declares an invalid firewall rule.
    #[error("invalid firewall configuration for module '{module}'")]
    Firewall {
        /// Module name.
        module: String,
        /// Parse failure.
        #[source]
        source: FirewallError,
    },
    /// A module's `init` returned `false`.
    #[error("module '{module}' at '{path}' failed to initialise")]
    InitFailed {
        /// Module name.
        module: String,
        /// Module file.
        path: Utf8PathBuf,
    },
}

/// Errors raised while running a shell module's executable.
#[derive(Debug, Clone, Error)]
pub enum ShellError {
    /// The executable could not be started.
    #[error("failed to start '{program}': {source}")]
    Spawn {
        /// Executable path.
        program: Utf8PathBuf,
        /// Underlying I/O error, carrying the OS error number.
        #[source]
        source: Arc<io::Error>,
    },
    /// Waiting for the child failed.
    #[error("failed to wait for '{program}': {source}")]
    Wait {
        /// Executable path.
        program: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The child exceeded its time budget and was killed.
    #[error("'{program}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Executable path.
        program: Utf8PathBuf,
        /// Budget in milliseconds.
        timeout_ms: u64,
    },
}

#[cfg(test)]
mod tests;
