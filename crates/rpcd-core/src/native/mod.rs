//! Statically linked module implementations.
//!
//! A `.so` file in a module directory selects an implementation from the
//! [`NativeCatalog`] by its file stem; the file itself is never loaded.
//! Implementations must report [`API_TAG`](crate::module::API_TAG).

mod builtin;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rpcd_types::{ErrorCode, RpcError};

use crate::module::{ModuleInfo, RpcModule};
use crate::request::Request;

pub use self::builtin::{DateModule, EchoModule, PingModule};

/// Constructor for a native module.
pub type NativeFactory = Arc<dyn Fn() -> Box<dyn RpcModule> + Send + Sync>;

/// Native implementations keyed by file stem.
#[derive(Clone, Default)]
pub struct NativeCatalog {
    factories: BTreeMap<String, NativeFactory>,
}

impl NativeCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog of modules shipped with the daemon: `echo`, `date` and
    /// `ping`.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("echo", || Box::new(EchoModule));
        catalog.register("date", || Box::new(DateModule));
        catalog.register("ping", || Box::new(PingModule));
        catalog
    }

    /// Links an implementation under `stem`, replacing any previous one.
    pub fn register<F>(&mut self, stem: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn RpcModule> + Send + Sync + 'static,
    {
        self.factories.insert(stem.into(), Arc::new(factory));
    }

    /// Instantiates the implementation linked under `stem`.
    #[must_use]
    pub fn instantiate(&self, stem: &str) -> Option<Box<dyn RpcModule>> {
        self.factories.get(stem).map(|factory| factory())
    }

    /// Linked stems in sorted order.
    pub fn stems(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for NativeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.stems()).finish()
    }
}

/// Placeholder for script modules, which this daemon cannot run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptModule;

impl RpcModule for ScriptModule {
    fn handle(&self, info: &ModuleInfo, request: &mut Request) -> bool {
        request.set_error(
            RpcError::from_code(ErrorCode::InternalError)
                .with_data(format!("{} modules are not supported", info.kind())),
        );
        false
    }
}
