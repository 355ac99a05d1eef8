//! Test double for [`HealthReporter`] that records structured events for assertions.

use std::sync::Mutex;

use rpcd_config::Config;
use rpcd_core::{Directory, SkippedEntry};

use crate::bootstrap::BootstrapError;
use crate::health::HealthReporter;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed with the given number of modules.
    BootstrapSucceeded { modules: usize },
    /// Bootstrap failed with an error description.
    BootstrapFailed(String),
    /// A module directory was scanned.
    DirectoryLoaded { name: String, modules: usize },
    /// A directory entry was not loaded.
    EntrySkipped { path: String },
    /// Modules were de-initialised.
    ModulesReleased { failures: usize },
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config, modules: usize) {
        self.record(HealthEvent::BootstrapSucceeded { modules });
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn directory_loaded(&self, directory: &Directory) {
        self.record(HealthEvent::DirectoryLoaded {
            name: directory.name().to_owned(),
            modules: directory.modules().count(),
        });
    }

    fn entry_skipped(&self, _directory: &Directory, entry: &SkippedEntry) {
        self.record(HealthEvent::EntrySkipped {
            path: entry.path.to_string(),
        });
    }

    fn modules_released(&self, failures: usize) {
        self.record(HealthEvent::ModulesReleased { failures });
    }
}
