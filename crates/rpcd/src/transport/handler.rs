//! Connection handling abstractions for the daemon listener.

use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use rpcd_core::Dispatcher;
use tracing::{debug, warn};

use super::LISTENER_TARGET;
use super::session::serve_connection;
use crate::codec::WireCodec;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Stream types accepted by the daemon listener.
#[derive(Debug)]
pub(crate) enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Second handle on the same socket, used as the write half.
    fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Handles accepted socket connections.
pub(crate) trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: ConnectionStream);
}

/// Serves RPC requests on each connection until the peer leaves.
pub(crate) struct RpcConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    codec: Arc<dyn WireCodec>,
}

impl RpcConnectionHandler {
    pub(crate) const fn new(dispatcher: Arc<Dispatcher>, codec: Arc<dyn WireCodec>) -> Self {
        Self { dispatcher, codec }
    }
}

impl ConnectionHandler for RpcConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        let mut writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(error) => {
                warn!(
                    target: LISTENER_TARGET,
                    error = %error,
                    "failed to split connection"
                );
                return;
            }
        };
        let mut reader = BufReader::new(stream);
        match serve_connection(&self.dispatcher, self.codec.as_ref(), &mut reader, &mut writer) {
            Ok(served) => debug!(
                target: LISTENER_TARGET,
                served,
                "connection closed"
            ),
            Err(error) => warn!(
                target: LISTENER_TARGET,
                error = %error,
                "connection aborted"
            ),
        }
    }
}
