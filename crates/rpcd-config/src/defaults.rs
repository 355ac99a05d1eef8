//! Default values shared by [`Config`](crate::Config) and its tests.

use std::time::Duration;

use camino::Utf8PathBuf;

#[cfg(unix)]
use dirs::runtime_dir;
#[cfg(unix)]
use libc::geteuid;

use crate::formats::{LogFormat, WireProtocol};
use crate::socket::SocketEndpoint;

/// TCP port used where Unix domain sockets are unavailable.
pub const DEFAULT_TCP_PORT: u16 = 9780;

/// Log filter applied when none is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Name reported in logs and HTTP authentication challenges.
pub const DEFAULT_DAEMON_NAME: &str = "rpcd";

/// Name of the service synthesised from `module_dirs`.
pub const DEFAULT_SERVICE_NAME: &str = "main";

/// Default log filter.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default wire protocol.
#[must_use]
pub const fn default_protocol() -> WireProtocol {
    WireProtocol::Json
}

/// Directory scanned when neither a manifest nor module directories are set.
#[must_use]
pub fn default_module_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}

/// Converts the configured shell timeout into a [`Duration`].
#[must_use]
pub const fn shell_timeout(seconds: Option<u64>) -> Option<Duration> {
    match seconds {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    }
}

/// Computes the default listening endpoint.
///
/// On Unix this is `$XDG_RUNTIME_DIR/rpcd/rpcd.sock`; without a runtime
/// directory the socket lives under a per-user namespace in the temporary
/// directory.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    platform_socket_endpoint()
}

#[cfg(unix)]
fn platform_socket_endpoint() -> SocketEndpoint {
    let mut base = match runtime_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok()) {
        Some(dir) => dir.join("rpcd"),
        None => temp_base().join("rpcd").join(user_namespace()),
    };
    base.push("rpcd.sock");
    SocketEndpoint::unix(base)
}

#[cfg(unix)]
fn temp_base() -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(std::env::temp_dir()).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}

#[cfg(unix)]
fn user_namespace() -> String {
    // SAFETY: geteuid has no preconditions and cannot fail.
    let uid = unsafe { geteuid() };
    format!("uid-{uid}")
}

#[cfg(not(unix))]
fn platform_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
