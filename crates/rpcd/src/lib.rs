//! The rpcd daemon.
//!
//! rpcd loads RPC modules from configured directories and serves them over
//! a Unix socket, a TCP socket or the standard streams. Startup follows a
//! fixed sequence: load the layered [`rpcd_config::Config`], install
//! structured telemetry, prepare the socket filesystem, scan every module
//! directory named by the service manifest and initialise the modules.
//! [`bootstrap_with`] performs that sequence and hands back a [`Daemon`].
//!
//! [`run_daemon`] then binds the listener and serves until a termination
//! signal arrives. Each connection runs on its own thread and speaks the
//! configured wire protocol: newline-delimited JSON-RPC, RFC 822 style
//! key-value blocks, or JSON-RPC over HTTP/1.1 with Basic authentication.
//! Requests on one connection are answered strictly in order.
//!
//! Health reporting hooks emit structured events at each stage so operators
//! can see which modules loaded, which directory entries were skipped and
//! why, and whether every module de-initialised cleanly on shutdown.

mod bootstrap;
pub mod codec;
mod health;
mod process;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::ListenerError;

#[cfg(test)]
mod tests;
