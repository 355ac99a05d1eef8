//! Module doubles and directory builders shared by the unit tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};
use rpcd_types::{RpcError, Value};
use tempfile::TempDir;

use crate::firewall::FirewallRule;
use crate::module::{ModuleInfo, RpcModule};
use crate::native::NativeCatalog;
use crate::request::Request;

/// Lifecycle calls observed by recorders, in call order.
pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn event_log() -> EventLog {
    Arc::default()
}

pub(crate) fn events(log: &EventLog) -> Vec<String> {
    log.lock().expect("event log").clone()
}

/// What a recorder does when handling a request.
#[derive(Debug, Clone)]
pub(crate) enum Behaviour {
    /// Sets the reply and succeeds.
    Reply(Value),
    /// Succeeds without a reply.
    Succeed,
    /// Fails without a reply.
    Fail,
    /// Sets an error reply and fails.
    FailWith(RpcError),
    /// Adds `seen_by: <label>` to a map reply and succeeds.
    Annotate,
}

/// A module that logs each hook call as `<hook>:<label>`.
#[derive(Debug, Clone)]
pub(crate) struct Recorder {
    label: String,
    log: EventLog,
    init: bool,
    check: bool,
    behaviour: Behaviour,
    rules: Vec<FirewallRule>,
    api_tag: u32,
}

impl Recorder {
    pub(crate) fn new(label: &str, log: &EventLog) -> Self {
        Self {
            label: label.to_owned(),
            log: Arc::clone(log),
            init: true,
            check: true,
            behaviour: Behaviour::Succeed,
            rules: Vec::new(),
            api_tag: crate::module::API_TAG,
        }
    }

    pub(crate) const fn failing_init(mut self) -> Self {
        self.init = false;
        self
    }

    pub(crate) const fn rejecting(mut self) -> Self {
        self.check = false;
        self
    }

    pub(crate) fn behaving(mut self, behaviour: Behaviour) -> Self {
        self.behaviour = behaviour;
        self
    }

    pub(crate) fn guarded_by(mut self, rule: FirewallRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub(crate) const fn tagged(mut self, api_tag: u32) -> Self {
        self.api_tag = api_tag;
        self
    }

    fn record(&self, hook: &str) {
        self.log
            .lock()
            .expect("event log")
            .push(format!("{hook}:{}", self.label));
    }
}

impl RpcModule for Recorder {
    fn init(&self, _info: &ModuleInfo) -> bool {
        self.record("init");
        self.init
    }

    fn deinit(&self, _info: &ModuleInfo) -> bool {
        self.record("deinit");
        true
    }

    fn check(&self, _info: &ModuleInfo, _request: &mut Request) -> bool {
        self.record("check");
        self.check
    }

    fn handle(&self, _info: &ModuleInfo, request: &mut Request) -> bool {
        self.record("handle");
        match &self.behaviour {
            Behaviour::Reply(value) => {
                request.set_reply(value.clone());
                true
            }
            Behaviour::Succeed => true,
            Behaviour::Fail => false,
            Behaviour::FailWith(error) => {
                request.set_error(error.clone());
                false
            }
            Behaviour::Annotate => {
                if let Some(reply) = request.reply_mut() {
                    reply.insert("seen_by", self.label.clone());
                }
                true
            }
        }
    }

    fn firewall(&self) -> Vec<FirewallRule> {
        self.rules.clone()
    }

    fn api_tag(&self) -> u32 {
        self.api_tag
    }
}

/// A catalog linking each recorder under its stem.
pub(crate) fn catalog(entries: Vec<(&str, Recorder)>) -> NativeCatalog {
    let mut catalog = NativeCatalog::builtin();
    for (stem, recorder) in entries {
        catalog.register(stem, move || Box::new(recorder.clone()));
    }
    catalog
}

/// A temporary directory with a UTF-8 path.
pub(crate) fn module_dir() -> (TempDir, Utf8PathBuf) {
    let dir = TempDir::new().expect("temp dir");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
    (dir, path)
}

/// Creates an empty, non-executable file.
pub(crate) fn touch(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, "").expect("write file");
    path
}

/// Writes an executable `/bin/sh` script.
pub(crate) fn script(dir: &Utf8Path, name: &str, body: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}
