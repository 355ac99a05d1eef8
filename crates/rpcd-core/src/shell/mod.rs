//! Modules backed by external executables.
//!
//! List parameters become positional arguments; map parameters become
//! environment variables. A zero exit status means stdout holds a
//! `key: value` block, which becomes a map reply. Any other status becomes
//! an error reply carrying the status, stdout and stderr.

mod process;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use rpcd_types::{ErrorCode, RpcError, Value};
use tracing::warn;

use crate::firewall::FIREWALL_KEY;
use crate::module::{ModuleInfo, RpcModule};
use crate::request::Request;
use crate::rfc822;

pub use self::process::{
    CAPTURE_LIMIT, CommandRunner, ProcessRunner, ShellInvocation, ShellOutput,
};

#[cfg(test)]
pub use self::process::MockCommandRunner;

const SHELL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shell");

/// Characters removed from positional arguments.
const STRIPPED_CHARS: [char; 4] = ['\'', '"', '`', '\\'];

/// Process-wide settings shared by every shell module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellSettings {
    env: Vec<(String, String)>,
    path: Option<String>,
    timeout: Option<Duration>,
}

impl ShellSettings {
    /// Settings with an empty environment template and no timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the environment template, rendering each value.
    #[must_use]
    pub fn with_env_template<'a>(mut self, env: impl IntoIterator<Item = (&'a String, &'a Value)>) -> Self {
        self.env = env
            .into_iter()
            .map(|(key, value)| (key.clone(), value.render()))
            .collect();
        self
    }

    /// Sets the `PATH` handed to children.
    #[must_use]
    pub fn with_path(mut self, path: Option<String>) -> Self {
        self.path = path;
        self
    }

    /// Copies the daemon's own `PATH`.
    #[must_use]
    pub fn inherit_path(self) -> Self {
        let path = std::env::var("PATH").ok();
        self.with_path(path)
    }

    /// Sets the subprocess budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Subprocess budget.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// A module whose procedure is an executable file.
#[derive(Clone)]
pub struct ShellModule {
    settings: Arc<ShellSettings>,
    runner: Arc<dyn CommandRunner>,
}

impl ShellModule {
    /// Creates a module running through `runner`.
    #[must_use]
    pub const fn new(settings: Arc<ShellSettings>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { settings, runner }
    }

    /// Builds the invocation for `request`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error when the parameters are neither a list
    /// nor a map.
    pub fn invocation(
        &self,
        info: &ModuleInfo,
        request: &Request,
    ) -> Result<ShellInvocation, RpcError> {
        let mut env = IndexMap::new();
        let args = match request.params() {
            Value::List(items) => items.iter().map(|item| escape_arg(&item.render())).collect(),
            Value::Map(params) => {
                for (key, value) in params {
                    let name = sanitize_key(key);
                    if is_reserved_name(&name) {
                        warn!(
                            target: SHELL_TARGET,
                            module = info.name(),
                            parameter = %key,
                            "dropping parameter with a reserved environment name"
                        );
                        continue;
                    }
                    env.insert(name, value.render());
                }
                Vec::new()
            }
            other => {
                return Err(RpcError::from_code(ErrorCode::InvalidInput)
                    .with_data(format!("parameters must be a list or a map, got {}", other.kind())));
            }
        };
        // Daemon entries are written last so parameters never shadow them.
        env.extend(self.base_env(info, request));
        Ok(ShellInvocation {
            program: info.path().to_path_buf(),
            args,
            env: env.into_iter().collect(),
            timeout: self.settings.timeout,
        })
    }

    fn base_env(&self, info: &ModuleInfo, request: &Request) -> IndexMap<String, String> {
        let mut env: IndexMap<String, String> = self.settings.env.iter().cloned().collect();
        if let Some(path) = &self.settings.path {
            env.insert(String::from("PATH"), path.clone());
        }
        for (key, value) in info.config() {
            if key == FIREWALL_KEY || matches!(value, Value::List(_) | Value::Map(_) | Value::Error(_)) {
                continue;
            }
            let name = format!("CFG_{}", sanitize_key(key).to_ascii_uppercase());
            env.insert(name, value.render());
        }
        env.insert(String::from("RPCD_METHOD"), request.method().to_owned());
        if let Some(id) = request.id() {
            env.insert(String::from("RPCD_ID"), id.render());
        }
        if let Some(user) = request.user() {
            env.insert(String::from("RPCD_USER"), user.name().to_owned());
        }
        if !info.service().is_empty() {
            env.insert(String::from("RPCD_SERVICE"), info.service().to_owned());
        }
        env
    }
}

impl fmt::Debug for ShellModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellModule")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl RpcModule for ShellModule {
    fn handle(&self, info: &ModuleInfo, request: &mut Request) -> bool {
        let invocation = match self.invocation(info, request) {
            Ok(invocation) => invocation,
            Err(error) => {
                request.set_error(error);
                return false;
            }
        };

        let output = match self.runner.run(&invocation) {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    target: SHELL_TARGET,
                    module = info.name(),
                    %error,
                    "shell module failed to run"
                );
                request.set_error(
                    RpcError::from_code(ErrorCode::InternalError).with_data(error.to_string()),
                );
                return false;
            }
        };

        if !output.success() {
            request.set_error(exit_error(&output));
            return false;
        }

        match rfc822::parse_block(&output.stdout) {
            Ok(reply) => {
                request.set_reply(reply);
                true
            }
            Err(error) => {
                request.set_error(
                    RpcError::from_code(ErrorCode::OutputParseError).with_data(error.to_string()),
                );
                false
            }
        }
    }
}

/// Whether a sanitised parameter name collides with a variable the daemon
/// owns or one that changes how the child is loaded.
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    const RESERVED: [&str; 4] = ["PATH", "IFS", "ENV", "BASH_ENV"];
    const RESERVED_PREFIXES: [&str; 4] = ["RPCD_", "CFG_", "LD_", "DYLD_"];
    let upper = name.to_ascii_uppercase();
    RESERVED.contains(&upper.as_str())
        || RESERVED_PREFIXES
            .iter()
            .any(|prefix| upper.starts_with(prefix))
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Removes quote and backslash characters from a positional argument.
#[must_use]
pub fn escape_arg(arg: &str) -> String {
    arg.chars().filter(|c| !STRIPPED_CHARS.contains(c)).collect()
}

fn exit_error(output: &ShellOutput) -> RpcError {
    let message = output.stdout.trim();
    let stderr = output.stderr.trim();
    let error = RpcError::new(
        i64::from(output.status),
        if message.is_empty() {
            ErrorCode::InternalError.default_message()
        } else {
            message
        },
        None,
    );
    if stderr.is_empty() {
        error
    } else {
        error.with_data(stderr)
    }
}
