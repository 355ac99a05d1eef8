//! Socket transport for the daemon.
//!
//! The listener binds the configured endpoint and accepts connections on a
//! background thread. Each connection runs on its own worker, which reads
//! requests with the configured codec and answers them in order.

mod errors;
mod handler;
mod listener;
#[cfg(test)]
mod listener_tests;
mod session;
#[cfg(test)]
mod test_utils;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, ConnectionStream, RpcConnectionHandler};
#[cfg(test)]
pub(crate) use self::listener::ListenerHandle;
pub(crate) use self::listener::SocketListener;
pub(crate) use self::session::serve_connection;
#[cfg(test)]
pub(crate) use self::test_utils::CountingHandler;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
