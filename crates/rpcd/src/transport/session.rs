//! The per-connection request loop.

use std::io::{BufRead, Write};

use rpcd_core::Dispatcher;
use tracing::debug;

use super::LISTENER_TARGET;
use crate::codec::{CodecError, ReadOutcome, WireCodec};

/// Reads, dispatches and answers requests one at a time.
///
/// The loop ends when the peer closes the stream between requests or a
/// request asks to close the connection. Each request is dropped as soon as
/// its reply has been written. Returns the number of replies written.
pub(crate) fn serve_connection(
    dispatcher: &Dispatcher,
    codec: &dyn WireCodec,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<usize, CodecError> {
    let mut served = 0_usize;
    loop {
        let request = match codec.read_request(reader)? {
            ReadOutcome::EndOfStream => return Ok(served),
            ReadOutcome::Malformed(request) => request,
            ReadOutcome::Request(mut request) => {
                dispatcher.dispatch(&mut request);
                request
            }
        };
        debug!(
            target: LISTENER_TARGET,
            method = request.method(),
            failed = request.has_error(),
            "request served"
        );
        codec.write_reply(writer, &request)?;
        served += 1;
        if request.is_last() {
            return Ok(served);
        }
    }
}
