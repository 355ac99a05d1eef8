//! Daemon bootstrap orchestration.
//!
//! Bootstrap runs once, before any connection is served: it loads the
//! configuration, installs telemetry, builds the module registry from the
//! service manifest, initialises every module and wires the authentication
//! gate. The resulting [`Daemon`] owns the immutable [`Dispatcher`] that
//! connection workers share.

use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use rpcd_config::{Config, ManifestError, SocketPreparationError};
use rpcd_core::shell::ShellSettings;
use rpcd_core::{AuthGate, Dispatcher, HtpasswdAuthenticator, ModuleLoader, Registry, RegistryError};

use crate::codec::{self, WireCodec};
use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when any configuration layer is invalid.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that merges defaults, the configuration file, the environment and
/// command-line flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// The service manifest could not be loaded.
    #[error("failed to load service manifest: {source}")]
    Manifest {
        /// Underlying manifest error.
        #[source]
        source: ManifestError,
    },
    /// Scanning, registering or initialising modules failed.
    #[error("failed to build module registry: {source}")]
    Registry {
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Shared request dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Reader and writer pair selected by the configuration.
    #[must_use]
    pub fn codec(&self) -> Arc<dyn WireCodec> {
        codec::for_protocol(self.config.protocol(), self.config.daemon_name())
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// De-initialises every module and returns how many failed.
    pub fn release(&self) -> usize {
        let failures = self.dispatcher.registry().deinit_all();
        self.reporter.modules_released(failures);
        failures
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first stage that fails; the reporter
/// has already been told about it.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();
    match build(loader, reporter.as_ref()) {
        Ok((config, dispatcher, telemetry)) => {
            reporter.bootstrap_succeeded(&config, dispatcher.registry().len());
            Ok(Daemon {
                config,
                dispatcher: Arc::new(dispatcher),
                telemetry,
                reporter,
            })
        }
        Err(error) => {
            reporter.bootstrap_failed(&error);
            Err(error)
        }
    }
}

fn build(
    loader: &dyn ConfigLoader,
    reporter: &dyn HealthReporter,
) -> Result<(Config, Dispatcher, TelemetryHandle), BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    if !config.stdio {
        config
            .daemon_socket()
            .prepare_filesystem()
            .map_err(|source| BootstrapError::Socket { source })?;
    }

    let manifest = config
        .service_manifest()
        .map_err(|source| BootstrapError::Manifest { source })?;
    let settings = ShellSettings::new()
        .with_env_template(&manifest.env)
        .inherit_path()
        .with_timeout(config.shell_timeout());
    let module_loader = ModuleLoader::with_settings(settings);
    let registry = Registry::from_manifest(&manifest, &module_loader)
        .map_err(|source| BootstrapError::Registry { source })?;
    for directory in registry.directories() {
        reporter.directory_loaded(directory);
        for entry in directory.skipped() {
            reporter.entry_skipped(directory, entry);
        }
    }
    registry
        .init_all()
        .map_err(|source| BootstrapError::Registry { source })?;

    let auth = config.htpasswd.as_ref().map_or_else(AuthGate::disabled, |path| {
        AuthGate::new(Arc::new(HtpasswdAuthenticator::new(path.clone())))
    });
    Ok((config, Dispatcher::new(registry, auth), telemetry))
}
