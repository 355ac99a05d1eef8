//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use rpcd_config::Config;
use rpcd_core::{Directory, SkippedEntry};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config, modules: usize);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after a module directory was scanned and registered.
    fn directory_loaded(&self, directory: &Directory);

    /// Invoked for every directory entry that was not registered.
    fn entry_skipped(&self, directory: &Directory, entry: &SkippedEntry);

    /// Invoked during shutdown once modules have been de-initialised.
    fn modules_released(&self, failures: usize);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config, modules: usize) {
        (**self).bootstrap_succeeded(config, modules);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn directory_loaded(&self, directory: &Directory) {
        (**self).directory_loaded(directory);
    }

    fn entry_skipped(&self, directory: &Directory, entry: &SkippedEntry) {
        (**self).entry_skipped(directory, entry);
    }

    fn modules_released(&self, failures: usize) {
        (**self).modules_released(failures);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting daemon bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config, modules: usize) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            name = config.daemon_name(),
            protocol = %config.protocol(),
            stdio = config.stdio,
            socket = %config.daemon_socket(),
            authentication = config.htpasswd.is_some(),
            modules,
            "daemon bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "daemon bootstrap failed"
        );
    }

    fn directory_loaded(&self, directory: &Directory) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "directory_loaded",
            service = directory.service(),
            directory = directory.name(),
            path = %directory.path(),
            modules = directory.modules().count(),
            common = directory.common().map(|module| module.name()),
            skipped = directory.skipped().len(),
            "module directory registered"
        );
    }

    fn entry_skipped(&self, directory: &Directory, entry: &SkippedEntry) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "entry_skipped",
            directory = directory.name(),
            path = %entry.path,
            reason = %entry.reason,
            "module entry not registered"
        );
    }

    fn modules_released(&self, failures: usize) {
        if failures == 0 {
            tracing::info!(
                target: HEALTH_TARGET,
                event = "modules_released",
                "modules de-initialised"
            );
        } else {
            tracing::warn!(
                target: HEALTH_TARGET,
                event = "modules_released",
                failures,
                "some modules failed to de-initialise"
            );
        }
    }
}
