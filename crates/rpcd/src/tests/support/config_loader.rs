//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use rpcd_config::{Config, SocketEndpoint, WireProtocol};
use tempfile::TempDir;

use crate::bootstrap::ConfigLoader;

/// Loader backed by a temporary directory holding a module directory, a
/// socket path and optionally a password file.
///
/// The module directory contains the built-in `ping` and `echo` modules, a
/// `greet` shell module and one entry that cannot be loaded.
pub struct TestConfigLoader {
    root: Arc<TempDir>,
    endpoint: SocketEndpoint,
    protocol: WireProtocol,
    htpasswd: Option<Utf8PathBuf>,
}

impl TestConfigLoader {
    /// Listens on a Unix socket inside the temporary directory.
    #[must_use]
    pub fn new() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        let socket = utf8(&root).join("rpcd.sock");
        Self::with_root(root, SocketEndpoint::unix(socket))
    }

    /// Listens on an ephemeral loopback TCP port.
    #[must_use]
    pub fn tcp() -> Self {
        let root = TempDir::new().expect("failed to create temporary directory");
        Self::with_root(root, SocketEndpoint::tcp("127.0.0.1", 0))
    }

    fn with_root(root: TempDir, endpoint: SocketEndpoint) -> Self {
        let modules = utf8(&root).join("modules");
        fs::create_dir(&modules).expect("create module directory");
        fs::write(modules.join("ping.so"), "").expect("write ping module");
        fs::write(modules.join("echo.so"), "").expect("write echo module");
        fs::write(modules.join("mystery.so"), "").expect("write unknown module");
        let greet = modules.join("greet.sh");
        fs::write(&greet, "#!/bin/sh\necho \"greeting: hello ${name}\"\n").expect("write script");
        fs::set_permissions(&greet, fs::Permissions::from_mode(0o755)).expect("chmod script");
        Self {
            root: Arc::new(root),
            endpoint,
            protocol: WireProtocol::Json,
            htpasswd: None,
        }
    }

    /// Selects the wire protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: WireProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Enables authentication with a single user.
    #[must_use]
    pub fn with_user(mut self, user: &str, password: &str) -> Self {
        let path = utf8(&self.root).join("htpasswd");
        fs::write(&path, format!("{user}:{password}\n")).expect("write password file");
        self.htpasswd = Some(path);
        self
    }

    /// Directory scanned for modules.
    #[must_use]
    pub fn module_dir(&self) -> Utf8PathBuf {
        utf8(&self.root).join("modules")
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: self.endpoint.clone(),
            protocol: self.protocol,
            module_dirs: vec![self.module_dir()],
            htpasswd: self.htpasswd.clone(),
            ..Config::default()
        })
    }
}

fn utf8(dir: &TempDir) -> &Utf8Path {
    Utf8Path::from_path(dir.path()).expect("temporary directory was not valid UTF-8")
}

/// Loader that intentionally fails by passing invalid CLI arguments.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("rpcd"),
            OsString::from("--daemon-socket"),
            OsString::from("invalid://socket"),
        ];
        Config::load_from_iter(args)
    }
}
