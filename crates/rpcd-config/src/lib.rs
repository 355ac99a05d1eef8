//! Layered configuration for the rpcd daemon.
//!
//! [`Config`] merges built-in defaults, a TOML file (`--config-path` or
//! `RPCD_CONFIG_PATH`), `RPCD_*` environment variables and command-line
//! flags, in that order of increasing precedence. The hierarchical service
//! layout lives in a separate [`ServiceManifest`] referenced by
//! `services_path`.

mod defaults;
mod formats;
mod manifest;
mod socket;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use defaults::{
    DEFAULT_DAEMON_NAME, DEFAULT_LOG_FILTER, DEFAULT_SERVICE_NAME, DEFAULT_TCP_PORT,
    default_log_filter, default_log_format, default_module_dir, default_protocol,
    default_socket_endpoint,
};
pub use formats::{FormatParseError, LogFormat, WireProtocol};
pub use manifest::{DirectorySpec, Fragment, ManifestError, ServiceManifest, ServiceSpec};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

const CONFIG_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::load");

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "RPCD")]
pub struct Config {
    /// Endpoint the daemon listens on.
    #[ortho_config(default = default_socket_endpoint())]
    pub daemon_socket: SocketEndpoint,
    /// Reader and writer pair used on every connection.
    #[ortho_config(default = default_protocol())]
    pub protocol: WireProtocol,
    /// Serve one connection over stdin and stdout instead of listening.
    #[ortho_config(default = false)]
    pub stdio: bool,
    /// Directories scanned into the default service.
    #[ortho_config(merge_strategy = "append")]
    #[serde(default)]
    pub module_dirs: Vec<Utf8PathBuf>,
    /// Service manifest describing services and their directories.
    #[serde(default)]
    pub services_path: Option<Utf8PathBuf>,
    /// Password file; authentication is disabled when unset.
    #[serde(default)]
    pub htpasswd: Option<Utf8PathBuf>,
    /// Wall-clock budget for shell module subprocesses, in seconds.
    #[serde(default)]
    pub shell_timeout_secs: Option<u64>,
    /// Daemon name used in logs and authentication challenges.
    #[serde(default)]
    pub name: Option<String>,
    /// `tracing` filter directive.
    #[ortho_config(default = default_log_filter())]
    pub log_filter: String,
    /// Log output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_socket: default_socket_endpoint(),
            protocol: default_protocol(),
            stdio: false,
            module_dirs: Vec::new(),
            services_path: None,
            htpasswd: None,
            shell_timeout_secs: None,
            name: None,
            log_filter: default_log_filter(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint the daemon listens on.
    #[must_use]
    pub const fn daemon_socket(&self) -> &SocketEndpoint {
        &self.daemon_socket
    }

    /// `tracing` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Wire protocol used on every connection.
    #[must_use]
    pub const fn protocol(&self) -> WireProtocol {
        self.protocol
    }

    /// Configured daemon name, or `rpcd`.
    #[must_use]
    pub fn daemon_name(&self) -> &str {
        self.name.as_deref().unwrap_or(DEFAULT_DAEMON_NAME)
    }

    /// Shell subprocess budget, when configured.
    #[must_use]
    pub const fn shell_timeout(&self) -> Option<Duration> {
        defaults::shell_timeout(self.shell_timeout_secs)
    }

    /// Builds the effective service manifest.
    ///
    /// The manifest named by `services_path` is loaded first; every entry in
    /// `module_dirs` is then added to its default service. When neither
    /// yields a directory the current directory is scanned.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when the manifest cannot be loaded.
    pub fn service_manifest(&self) -> Result<ServiceManifest, ManifestError> {
        let mut manifest = match &self.services_path {
            Some(path) => ServiceManifest::load(path)?,
            None => ServiceManifest::default(),
        };
        for dir in &self.module_dirs {
            let key = manifest.add_module_dir(dir);
            debug!(target: CONFIG_TARGET, directory = %dir, key, "added module directory");
        }
        if manifest.has_no_directories() {
            manifest.add_module_dir(&default_module_dir());
        }
        Ok(manifest)
    }
}
