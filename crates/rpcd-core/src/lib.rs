//! Request dispatch engine for the rpcd daemon.
//!
//! The `rpcd-core` crate turns parsed requests into replies. It owns the
//! module contract ([`RpcModule`]), the registry that discovers modules in
//! configured directories ([`Registry`], [`ModuleLoader`]), the declarative
//! parameter firewall, the shell module adapter and the per-request
//! pipeline ([`Dispatcher`]).
//!
//! # Architecture
//!
//! Wire codecs live in the daemon crate. They produce a [`Request`] holding
//! the method, parameters and any claimed credentials, hand it to
//! [`Dispatcher::dispatch`], and serialise [`Request::final_reply`]
//! afterwards. The registry and the authentication gate are built once at
//! startup and only read while serving, so one [`Dispatcher`] can be shared
//! across connection workers behind an `Arc`.
//!
//! Modules come in three kinds:
//!
//! - **shell**: executable `.sh` files run as subprocesses by
//!   [`ShellModule`], with parameters passed as arguments or environment
//!   variables and an RFC822-style `key: value` block parsed from stdout;
//! - **native**: `.so` entries selecting a statically linked implementation
//!   from the [`NativeCatalog`] by file stem;
//! - **script**: `.js` entries, registered but always failing.
//!
//! # Example
//!
//! ```rust,no_run
//! use camino::Utf8Path;
//! use rpcd_config::ServiceManifest;
//! use rpcd_core::{AuthGate, Dispatcher, ModuleLoader, Registry, Request};
//! use rpcd_core::shell::ShellSettings;
//!
//! let mut manifest = ServiceManifest::default();
//! manifest.add_module_dir(Utf8Path::new("/usr/lib/rpcd"));
//! let loader = ModuleLoader::with_settings(ShellSettings::new().inherit_path());
//! let registry = Registry::from_manifest(&manifest, &loader).expect("registry");
//! registry.init_all().expect("modules initialise");
//!
//! let dispatcher = Dispatcher::new(registry, AuthGate::disabled());
//! let mut request = Request::new("ping");
//! dispatcher.dispatch(&mut request);
//! println!("{:?}", request.final_reply());
//! ```

pub mod auth;
pub mod dispatch;
pub mod error;
pub mod firewall;
pub mod module;
pub mod native;
pub mod registry;
pub mod request;
pub mod rfc822;
pub mod shell;

#[cfg(test)]
mod tests;

pub use self::auth::{AuthGate, Authenticator, HtpasswdAuthenticator, User, UserDirectory};
pub use self::dispatch::Dispatcher;
pub use self::error::{FirewallError, LoadError, RegistryError, ShellError};
pub use self::firewall::FirewallRule;
pub use self::module::{API_TAG, Module, ModuleInfo, ModuleKind, RpcModule};
pub use self::native::NativeCatalog;
pub use self::registry::{Directory, ModuleLoader, Registry, Service, SkipReason, SkippedEntry};
pub use self::request::{Credentials, Request};
pub use self::shell::ShellModule;
