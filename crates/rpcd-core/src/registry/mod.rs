//! Module registry.
//!
//! The registry is built once at startup from the service manifest and is
//! read-only afterwards. Services own directories, directories own modules
//! and an optional common module, and two first-wins indices map method
//! names to modules: one per service and one across the whole registry.
//!
//! Configuration is layered: a module sees its service fragment, overridden
//! by its directory fragment, overridden by its own fragment. Firewall rules
//! are only taken from the module's own fragment.

mod loader;

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use indexmap::map::Entry;
use rpcd_config::ServiceManifest;
use rpcd_types::Map;
use tracing::{debug, info, warn};

use crate::error::{LoadError, RegistryError};
use crate::firewall::FirewallRule;
use crate::module::Module;

pub use self::loader::{COMMON_STEM, ModuleLoader};
use self::loader::inheritable;

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Separator between a directory name and a procedure name.
pub const QUALIFIER: char = '.';

/// Why a directory entry was not registered.
#[derive(Debug, Clone)]
pub enum SkipReason {
    /// The entry looks like a module but could not be loaded.
    Invalid(LoadError),
    /// A module with the same name is already in the directory.
    DuplicateName,
    /// The directory already has a common module.
    ExtraCommon,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(error) => write!(f, "{error}"),
            Self::DuplicateName => f.write_str("a module with this name is already registered"),
            Self::ExtraCommon => f.write_str("the directory already has a common module"),
        }
    }
}

/// A directory entry left out of the registry.
#[derive(Debug, Clone)]
pub struct SkippedEntry {
    /// Entry path.
    pub path: Utf8PathBuf,
    /// Why it was left out.
    pub reason: SkipReason,
}

/// The modules found in one scanned directory.
#[derive(Debug)]
pub struct Directory {
    name: String,
    path: Utf8PathBuf,
    service: String,
    config: Map,
    modules: IndexMap<String, Module>,
    common: Option<Module>,
    skipped: Vec<SkippedEntry>,
}

impl Directory {
    fn new(path: &Utf8Path, config: Map) -> Self {
        let name = path
            .file_name()
            .filter(|name| !name.is_empty())
            .unwrap_or(path.as_str())
            .to_owned();
        Self {
            name,
            path: path.to_path_buf(),
            service: String::new(),
            config,
            modules: IndexMap::new(),
            common: None,
            skipped: Vec::new(),
        }
    }

    /// Renames the directory; names default to the path's basename.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn skip(&mut self, path: Utf8PathBuf, reason: SkipReason) {
        self.skipped.push(SkippedEntry { path, reason });
    }

    /// Directory name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scanned path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Owning service name, empty until the directory is registered.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Directory-wide configuration fragment.
    #[must_use]
    pub const fn config(&self) -> &Map {
        &self.config
    }

    /// Callable modules in scan order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Looks up a callable module by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// The directory's common module.
    #[must_use]
    pub const fn common(&self) -> Option<&Module> {
        self.common.as_ref()
    }

    /// Entries that were not registered.
    #[must_use]
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Attaches per-module fragments.
    ///
    /// Each fragment is layered over the directory fragment and its
    /// `firewall` entries are appended to the module's rules. Keys naming no
    /// module are logged and ignored. The common module is addressed by its
    /// own name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Firewall`] when a fragment declares a
    /// malformed rule.
    pub fn bind_config(&mut self, fragments: &IndexMap<String, Map>) -> Result<(), RegistryError> {
        let inherited = inheritable(&self.config);
        for (name, fragment) in fragments {
            let target = match self.modules.get_mut(name) {
                Some(module) => Some(module),
                None => self.common.as_mut().filter(|common| common.name() == name.as_str()),
            };
            let Some(module) = target else {
                warn!(
                    target: REGISTRY_TARGET,
                    directory = %self.path,
                    module = %name,
                    "configuration names no module in this directory"
                );
                continue;
            };
            let rules = FirewallRule::from_fragment(fragment).map_err(|source| {
                RegistryError::Firewall {
                    module: name.clone(),
                    source,
                }
            })?;
            module.info_mut().bind(layer(&inherited, fragment), rules);
        }
        Ok(())
    }

    fn all_modules_mut(&mut self) -> impl Iterator<Item = &mut Module> {
        self.common.iter_mut().chain(self.modules.values_mut())
    }
}

/// A named group of directories.
#[derive(Debug)]
pub struct Service {
    name: String,
    config: Map,
    default_directory: Option<String>,
    directories: IndexMap<String, Directory>,
    index: IndexMap<String, String>,
}

impl Service {
    /// Creates an empty service.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Map::new(),
            default_directory: None,
            directories: IndexMap::new(),
            index: IndexMap::new(),
        }
    }

    /// Sets the service-wide fragment inherited by every module.
    #[must_use]
    pub fn with_config(mut self, config: Map) -> Self {
        self.config = config;
        self
    }

    /// Sets the directory consulted first for unqualified methods.
    #[must_use]
    pub fn with_default_directory(mut self, directory: Option<String>) -> Self {
        self.default_directory = directory;
        self
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directories in registration order.
    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.values()
    }

    /// Looks up a directory by name.
    #[must_use]
    pub fn directory(&self, name: &str) -> Option<&Directory> {
        self.directories.get(name)
    }

    /// The configured default directory, or the first registered one.
    #[must_use]
    pub fn default_directory(&self) -> Option<&Directory> {
        match &self.default_directory {
            Some(name) => self.directories.get(name),
            None => self.directories.values().next(),
        }
    }

    /// Looks up a method across this service's directories.
    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<&Module> {
        let directory = self.index.get(method)?;
        self.directories.get(directory)?.module(method)
    }
}

/// Where a module lives inside the registry.
#[derive(Debug, Clone)]
struct ModuleRef {
    service: String,
    directory: String,
}

/// Every loaded module, indexed for dispatch.
#[derive(Debug, Default)]
pub struct Registry {
    services: IndexMap<String, Service>,
    default_service: Option<String>,
    index: IndexMap<String, ModuleRef>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every directory named by `manifest`.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError`] raised while scanning, binding
    /// configuration or registering a directory.
    pub fn from_manifest(manifest: &ServiceManifest, loader: &ModuleLoader) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for (service_name, spec) in &manifest.services {
            registry.add_service(
                Service::new(service_name.clone())
                    .with_config(spec.config.clone())
                    .with_default_directory(spec.default_directory.clone()),
            );
            for (directory_name, directory_spec) in &spec.directories {
                let mut directory = loader
                    .scan_directory(
                        &directory_spec.path,
                        directory_spec.config.clone(),
                        directory_spec.require_handler,
                    )?
                    .with_name(directory_name.clone());
                directory.bind_config(&directory_spec.modules)?;
                registry.add_directory(service_name, directory)?;
            }
        }
        registry.default_service = manifest.default_service_name().map(str::to_owned);
        info!(
            target: REGISTRY_TARGET,
            services = registry.services.len(),
            methods = registry.index.len(),
            "registry built"
        );
        Ok(registry)
    }

    /// Adds a service, keeping an existing one of the same name.
    pub fn add_service(&mut self, service: Service) {
        if self.default_service.is_none() {
            self.default_service = Some(service.name.clone());
        }
        self.services.entry(service.name.clone()).or_insert(service);
    }

    /// Registers a scanned directory under `service`, creating the service
    /// when needed.
    ///
    /// Method names already indexed keep their first module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateDirectory`] when the service already
    /// has a directory with this name.
    pub fn add_directory(&mut self, service: &str, mut directory: Directory) -> Result<(), RegistryError> {
        if !self.services.contains_key(service) {
            self.add_service(Service::new(service));
        }
        let Some(owner) = self.services.get_mut(service) else {
            return Ok(());
        };
        if owner.directories.contains_key(&directory.name) {
            return Err(RegistryError::DuplicateDirectory {
                service: service.to_owned(),
                name: directory.name.clone(),
            });
        }

        let inherited = inheritable(&owner.config);
        directory.service = service.to_owned();
        let directory_name = directory.name.clone();
        for module in directory.all_modules_mut() {
            let config = layer(&inherited, module.info().config());
            let info = module.info_mut();
            info.set_owner(service, &directory_name);
            info.bind(config, Vec::new());
        }

        for name in directory.modules.keys() {
            match owner.index.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(directory_name.clone());
                }
                Entry::Occupied(first) => debug!(
                    target: REGISTRY_TARGET,
                    service,
                    method = %name,
                    kept = %first.get(),
                    ignored = %directory_name,
                    "method already registered in service"
                ),
            }
            match self.index.entry(name.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(ModuleRef {
                        service: service.to_owned(),
                        directory: directory_name.clone(),
                    });
                }
                Entry::Occupied(first) => debug!(
                    target: REGISTRY_TARGET,
                    method = %name,
                    kept_service = %first.get().service,
                    kept_directory = %first.get().directory,
                    "method already registered"
                ),
            }
        }
        owner.directories.insert(directory_name, directory);
        Ok(())
    }

    /// Services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Looks up a service by name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// The service used for requests that name none.
    #[must_use]
    pub fn default_service(&self) -> Option<&Service> {
        self.services.get(self.default_service.as_deref()?)
    }

    /// Looks up a method in the global index.
    #[must_use]
    pub fn lookup(&self, method: &str) -> Option<&Module> {
        let location = self.index.get(method)?;
        self.services
            .get(&location.service)?
            .directories
            .get(&location.directory)?
            .module(method)
    }

    /// Resolves a request's target.
    ///
    /// `dir.proc` names a directory of the selected service; otherwise the
    /// service's default directory, then the service index and finally the
    /// global index are consulted. A service that does not exist resolves
    /// nothing.
    #[must_use]
    pub fn resolve(&self, service: Option<&str>, method: &str) -> Option<&Module> {
        let selected = match service {
            Some(name) => Some(self.services.get(name)?),
            None => self.default_service(),
        };
        if let Some(owner) = selected {
            if let Some((directory_name, procedure)) = method.split_once(QUALIFIER)
                && let Some(module) = owner
                    .directories
                    .get(directory_name)
                    .and_then(|directory| directory.module(procedure))
            {
                return Some(module);
            }
            if let Some(module) = owner
                .default_directory()
                .and_then(|directory| directory.module(method))
                .or_else(|| owner.lookup(method))
            {
                return Some(module);
            }
        }
        self.lookup(method)
    }

    /// The common module of the directory that owns `module`.
    #[must_use]
    pub fn common_for(&self, module: &Module) -> Option<&Module> {
        self.services
            .get(module.info().service())?
            .directories
            .get(module.info().directory())?
            .common()
    }

    /// Directories across all services.
    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.services.values().flat_map(Service::directories)
    }

    /// Common modules across all directories.
    pub fn commons(&self) -> impl Iterator<Item = &Module> {
        self.directories().filter_map(Directory::common)
    }

    /// Callable modules across all directories.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.directories().flat_map(Directory::modules)
    }

    /// Number of distinct method names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Runs `init` on every common module, then on every other module.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InitFailed`] for the first module whose
    /// `init` fails; later modules are not initialised.
    pub fn init_all(&self) -> Result<(), RegistryError> {
        for module in self.commons().chain(self.modules()) {
            if !module.init() {
                return Err(RegistryError::InitFailed {
                    module: module.name().to_owned(),
                    path: module.path().to_path_buf(),
                });
            }
            debug!(
                target: REGISTRY_TARGET,
                module = module.name(),
                kind = %module.info().kind(),
                "module initialised"
            );
        }
        Ok(())
    }

    /// Runs `deinit` on every module, callable modules first.
    ///
    /// Failures are logged; returns how many modules failed.
    pub fn deinit_all(&self) -> usize {
        let mut failures = 0;
        for module in self.modules().chain(self.commons()) {
            if !module.deinit() {
                failures += 1;
                warn!(
                    target: REGISTRY_TARGET,
                    module = module.name(),
                    path = %module.path(),
                    "module failed to de-initialise"
                );
            }
        }
        failures
    }
}

/// `base` with every entry of `over` written on top.
fn layer(base: &Map, over: &Map) -> Map {
    let mut merged = base.clone();
    for (key, value) in over {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
