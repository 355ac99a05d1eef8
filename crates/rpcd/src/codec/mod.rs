//! Wire protocols.
//!
//! A [`WireCodec`] turns bytes from a connection into [`Request`]s and
//! serialises finished requests back. Codecs never dispatch: malformed
//! input becomes a request that already carries its error reply, so the
//! connection loop can answer it like any other.
//!
//! Every read is bounded by [`MAX_REQUEST_BYTES`]; a client exceeding it
//! loses the connection because the stream cannot be resynchronised.

mod http;
mod json;
mod rfc822;

use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

use rpcd_config::WireProtocol;
use rpcd_core::Request;
use rpcd_types::{ErrorCode, RpcError};
use thiserror::Error;

pub use self::http::HttpCodec;
pub use self::json::JsonCodec;
pub use self::rfc822::Rfc822Codec;

const CODEC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::codec");

/// Largest request a codec accepts, headers included.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Result of reading one request.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A well-formed request ready for dispatch.
    Request(Request),
    /// Input that could not be parsed; the request holds the error reply.
    Malformed(Request),
    /// The peer closed the stream between requests.
    EndOfStream,
}

impl ReadOutcome {
    fn malformed(code: ErrorCode) -> Self {
        Self::Malformed(Request::failed(RpcError::from_code(code)))
    }

    const fn request_mut(&mut self) -> Option<&mut Request> {
        match self {
            Self::Request(request) | Self::Malformed(request) => Some(request),
            Self::EndOfStream => None,
        }
    }
}

/// Transport failures that end a connection.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Reading from or writing to the peer failed.
    #[error("connection i/o failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The request exceeded the size limit.
    #[error("request exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit.
        limit: usize,
    },
    /// A reply could not be encoded.
    #[error("failed to encode reply: {source}")]
    Encode {
        /// Underlying serialiser error.
        #[source]
        source: Arc<serde_json::Error>,
    },
}

impl From<io::Error> for CodecError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(source: serde_json::Error) -> Self {
        Self::Encode {
            source: Arc::new(source),
        }
    }
}

/// Reader and writer pair for one wire protocol.
pub trait WireCodec: Send + Sync {
    /// Reads the next request, blocking until one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the stream fails or a request is too
    /// large; the connection should be closed.
    fn read_request(&self, reader: &mut dyn BufRead) -> Result<ReadOutcome, CodecError>;

    /// Serialises the reply held by `request`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when the reply cannot be written.
    fn write_reply(&self, writer: &mut dyn Write, request: &Request) -> Result<(), CodecError>;
}

/// Builds the codec for `protocol`. `realm` names the daemon in HTTP
/// authentication challenges.
#[must_use]
pub fn for_protocol(protocol: WireProtocol, realm: &str) -> Arc<dyn WireCodec> {
    match protocol {
        WireProtocol::Json => Arc::new(JsonCodec),
        WireProtocol::Rfc822 => Arc::new(Rfc822Codec),
        WireProtocol::Http => Arc::new(HttpCodec::new(realm)),
    }
}

/// Byte allowance for one request.
#[derive(Debug)]
struct Budget {
    remaining: usize,
}

impl Budget {
    const fn new() -> Self {
        Self {
            remaining: MAX_REQUEST_BYTES,
        }
    }

    /// Reads one line into `line`, replacing its contents. Returns `false`
    /// at end of stream.
    fn read_line(&mut self, reader: &mut dyn BufRead, line: &mut String) -> Result<bool, CodecError> {
        line.clear();
        let allowance = u64::try_from(self.remaining)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let read = Read::take(&mut *reader, allowance).read_line(line)?;
        self.charge(read)?;
        Ok(read > 0)
    }

    /// Reads exactly `length` bytes.
    fn read_exact(&mut self, reader: &mut dyn BufRead, length: usize) -> Result<Vec<u8>, CodecError> {
        self.charge(length)?;
        let mut body = vec![0_u8; length];
        reader.read_exact(&mut body)?;
        Ok(body)
    }

    fn charge(&mut self, bytes: usize) -> Result<(), CodecError> {
        self.remaining = self
            .remaining
            .checked_sub(bytes)
            .ok_or(CodecError::TooLarge {
                limit: MAX_REQUEST_BYTES,
            })?;
        Ok(())
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
