//! BDD test world: holds the loader, reporter and daemon state shared by steps.

use std::cell::RefCell;
use std::io::Cursor;
use std::sync::Arc;

use crate::bootstrap::{BootstrapError, ConfigLoader, Daemon, bootstrap_with};
use crate::transport::serve_connection;

use super::config_loader::{FailingConfigLoader, TestConfigLoader};
use super::reporter::RecordingHealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    loader: Box<dyn ConfigLoader>,
    pub reporter: Arc<RecordingHealthReporter>,
    daemon: Option<Daemon>,
    bootstrap_error: Option<BootstrapError>,
    replies: Vec<serde_json::Value>,
}

impl TestWorld {
    /// Builds a world with a successful configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loader: Box::new(TestConfigLoader::new()),
            reporter: Arc::new(RecordingHealthReporter::default()),
            daemon: None,
            bootstrap_error: None,
            replies: Vec::new(),
        }
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Box::new(FailingConfigLoader);
        self.reset_results();
    }

    /// Installs a loader that succeeds.
    pub fn use_successful_loader(&mut self) {
        self.loader = Box::new(TestConfigLoader::new());
        self.reset_results();
    }

    /// Installs a loader that requires `user` to authenticate.
    pub fn use_authenticating_loader(&mut self, user: &str, password: &str) {
        self.loader = Box::new(TestConfigLoader::new().with_user(user, password));
        self.reset_results();
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        if self.daemon.is_some() || self.bootstrap_error.is_some() {
            return;
        }
        match bootstrap_with(&*self.loader, self.reporter.clone()) {
            Ok(daemon) => self.daemon = Some(daemon),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Returns whether bootstrap produced an error.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// Returns true when the daemon handle is available.
    #[must_use]
    pub const fn daemon_started(&self) -> bool {
        self.daemon.is_some()
    }

    /// Feeds `input` through the daemon's codec and dispatcher, keeping
    /// every reply.
    pub fn send(&mut self, input: &str) {
        let daemon = self.daemon.as_ref().expect("daemon should be running");
        let codec = daemon.codec();
        let mut reader = Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        serve_connection(daemon.dispatcher(), codec.as_ref(), &mut reader, &mut output)
            .expect("serve requests");
        let text = String::from_utf8(output).expect("utf8 reply");
        self.replies = text
            .split("\n\n")
            .filter(|chunk| !chunk.trim().is_empty())
            .map(|chunk| serde_json::from_str(chunk).expect("json reply"))
            .collect();
    }

    /// The most recent reply envelope.
    #[must_use]
    pub fn last_reply(&self) -> &serde_json::Value {
        self.replies.last().expect("no reply recorded")
    }

    /// De-initialises the daemon's modules.
    pub fn release(&self) {
        if let Some(daemon) = &self.daemon {
            daemon.release();
        }
    }

    fn reset_results(&mut self) {
        self.daemon = None;
        self.bootstrap_error = None;
        self.replies.clear();
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
