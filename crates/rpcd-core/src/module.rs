//! The contract every module implements, and the registry's view of a
//! loaded module.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use rpcd_types::Map;

use crate::firewall::FirewallRule;
use crate::request::Request;

/// Tag a native module must report before it is trusted.
pub const API_TAG: u32 = 0x1337_0003;

/// Behaviour of a callable procedure.
///
/// Only [`RpcModule::handle`] is mandatory. The lifecycle hooks and the
/// admission check default to accepting everything.
pub trait RpcModule: Send + Sync + fmt::Debug {
    /// Runs once before the daemon serves requests.
    fn init(&self, _info: &ModuleInfo) -> bool {
        true
    }

    /// Runs once at shutdown.
    fn deinit(&self, _info: &ModuleInfo) -> bool {
        true
    }

    /// Admission check run after the firewall.
    ///
    /// Returning `false` without setting an error reply yields an
    /// invalid-input error.
    fn check(&self, _info: &ModuleInfo, _request: &mut Request) -> bool {
        true
    }

    /// Executes the procedure, storing the result with
    /// [`Request::set_reply`].
    ///
    /// Returning `true` without a reply counts as a `true` result; returning
    /// `false` without an error reply yields an internal error.
    fn handle(&self, info: &ModuleInfo, request: &mut Request) -> bool;

    /// Firewall rules the module declares for itself.
    fn firewall(&self) -> Vec<FirewallRule> {
        Vec::new()
    }

    /// API revision the module was built against.
    fn api_tag(&self) -> u32 {
        API_TAG
    }
}

/// How a module is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Statically linked implementation selected by file stem.
    Native,
    /// Executable run as a subprocess.
    Shell,
    /// Script placeholder; every call fails.
    Script,
}

impl ModuleKind {
    /// Classifies a directory entry by extension and permissions.
    ///
    /// Returns `None` for entries that are not modules, including shell
    /// scripts without an executable bit.
    #[must_use]
    pub fn classify(path: &Utf8Path, executable: bool) -> Option<Self> {
        match path.extension()? {
            "sh" if executable => Some(Self::Shell),
            "so" => Some(Self::Native),
            "js" => Some(Self::Script),
            _ => None,
        }
    }

    /// Lowercase name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Shell => "shell",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and configuration of a registered module.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    name: String,
    path: Utf8PathBuf,
    kind: ModuleKind,
    service: String,
    directory: String,
    config: Map,
    firewall: Vec<FirewallRule>,
}

impl ModuleInfo {
    /// Describes a module found at `path`.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<Utf8PathBuf>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            service: String::new(),
            directory: String::new(),
            config: Map::new(),
            firewall: Vec::new(),
        }
    }

    /// Sets the owning service and directory names.
    #[must_use]
    pub fn with_owner(mut self, service: impl Into<String>, directory: impl Into<String>) -> Self {
        self.service = service.into();
        self.directory = directory.into();
        self
    }

    /// Sets the bound configuration fragment.
    #[must_use]
    pub fn with_config(mut self, config: Map) -> Self {
        self.config = config;
        self
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Execution kind.
    #[must_use]
    pub const fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Owning service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Owning directory name.
    #[must_use]
    pub fn directory(&self) -> &str {
        &self.directory
    }

    /// Bound configuration fragment.
    #[must_use]
    pub const fn config(&self) -> &Map {
        &self.config
    }

    /// Effective firewall: declared rules then configured rules.
    #[must_use]
    pub fn firewall(&self) -> &[FirewallRule] {
        &self.firewall
    }

    pub(crate) fn set_owner(&mut self, service: &str, directory: &str) {
        service.clone_into(&mut self.service);
        directory.clone_into(&mut self.directory);
    }

    pub(crate) fn bind(&mut self, config: Map, configured: Vec<FirewallRule>) {
        self.config = config;
        self.firewall.extend(configured);
    }

    pub(crate) fn declare_rules(&mut self, declared: Vec<FirewallRule>) {
        self.firewall = declared;
    }
}

/// A loaded module: its description plus its behaviour.
#[derive(Debug)]
pub struct Module {
    info: ModuleInfo,
    handler: Box<dyn RpcModule>,
}

impl Module {
    /// Pairs a description with an implementation, adopting the
    /// implementation's declared firewall rules.
    #[must_use]
    pub fn new(mut info: ModuleInfo, handler: Box<dyn RpcModule>) -> Self {
        info.declare_rules(handler.firewall());
        Self { info, handler }
    }

    /// Description.
    #[must_use]
    pub const fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub(crate) const fn info_mut(&mut self) -> &mut ModuleInfo {
        &mut self.info
    }

    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// Module file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.info.path()
    }

    /// Effective firewall rules.
    #[must_use]
    pub fn firewall(&self) -> &[FirewallRule] {
        self.info.firewall()
    }

    /// Runs the module's `init` hook.
    #[must_use]
    pub fn init(&self) -> bool {
        self.handler.init(&self.info)
    }

    /// Runs the module's `deinit` hook.
    #[must_use]
    pub fn deinit(&self) -> bool {
        self.handler.deinit(&self.info)
    }

    /// Runs the module's admission check.
    #[must_use]
    pub fn check(&self, request: &mut Request) -> bool {
        self.handler.check(&self.info, request)
    }

    /// Runs the procedure.
    #[must_use]
    pub fn handle(&self, request: &mut Request) -> bool {
        self.handler.handle(&self.info, request)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("status.sh", true, Some(ModuleKind::Shell))]
    #[case("status.sh", false, None)]
    #[case("echo.so", false, Some(ModuleKind::Native))]
    #[case("legacy.js", false, Some(ModuleKind::Script))]
    #[case("README", true, None)]
    #[case("notes.txt", true, None)]
    fn classifies_entries(
        #[case] name: &str,
        #[case] executable: bool,
        #[case] expected: Option<ModuleKind>,
    ) {
        assert_eq!(ModuleKind::classify(Utf8Path::new(name), executable), expected);
    }

    #[derive(Debug)]
    struct Guarded;

    impl RpcModule for Guarded {
        fn handle(&self, _info: &ModuleInfo, _request: &mut Request) -> bool {
            true
        }

        fn firewall(&self) -> Vec<FirewallRule> {
            vec![FirewallRule::new("declared")]
        }
    }

    #[test]
    fn configured_rules_follow_declared_rules() {
        let info = ModuleInfo::new("guarded", "/srv/guarded.so", ModuleKind::Native);
        let mut module = Module::new(info, Box::new(Guarded));
        module
            .info_mut()
            .bind(Map::new(), vec![FirewallRule::new("configured")]);

        let names: Vec<&str> = module.firewall().iter().map(FirewallRule::name).collect();
        assert_eq!(names, ["declared", "configured"]);
    }

    #[test]
    fn default_hooks_accept() {
        let info = ModuleInfo::new("guarded", "/srv/guarded.so", ModuleKind::Native);
        let module = Module::new(info, Box::new(Guarded));
        let mut request = Request::new("guarded");
        assert!(module.init());
        assert!(module.check(&mut request));
        assert!(module.deinit());
        assert_eq!(Guarded.api_tag(), API_TAG);
    }
}
