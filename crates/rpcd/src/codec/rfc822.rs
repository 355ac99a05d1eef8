//! `key: value` request blocks.

use std::io::{BufRead, Write};

use rpcd_core::{Request, rfc822};
use rpcd_types::{ErrorCode, RpcError, Value};
use tracing::debug;

use super::{Budget, CODEC_TARGET, CodecError, ReadOutcome, WireCodec, is_blank};

/// Line-oriented framing.
///
/// A request is a block of `key: value` lines ending with a blank line.
/// `method`, `id` and `service` form the envelope, `jsonrpc` is ignored and
/// every other key becomes a string parameter. Map replies are written back
/// as a block; any other reply becomes a single `result` line.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rfc822Codec;

impl WireCodec for Rfc822Codec {
    fn read_request(&self, reader: &mut dyn BufRead) -> Result<ReadOutcome, CodecError> {
        let mut budget = Budget::new();
        let mut text = String::new();
        let mut line = String::new();
        while budget.read_line(reader, &mut line)? {
            if is_blank(&line) {
                if text.is_empty() {
                    continue;
                }
                break;
            }
            text.push_str(&line);
        }
        if text.is_empty() {
            return Ok(ReadOutcome::EndOfStream);
        }

        let mut fields = match rfc822::parse_block(&text) {
            Ok(fields) => fields,
            Err(error) => {
                debug!(target: CODEC_TARGET, %error, "unparseable request block");
                return Ok(ReadOutcome::malformed(ErrorCode::ParseError));
            }
        };
        fields.shift_remove("jsonrpc");
        let id = fields.shift_remove("id");
        let service = fields.shift_remove("service").map(|value| value.render());
        let method = fields
            .shift_remove("method")
            .map(|value| value.render())
            .unwrap_or_default();

        if method.is_empty() {
            let mut request =
                Request::failed(RpcError::from_code(ErrorCode::InvalidRequest).with_data("method"));
            request.set_id(id);
            return Ok(ReadOutcome::Malformed(request));
        }
        let mut request = Request::new(method).with_params(Value::Map(fields));
        request.set_id(id);
        request.set_service(service);
        Ok(ReadOutcome::Request(request))
    }

    fn write_reply(&self, writer: &mut dyn Write, request: &Request) -> Result<(), CodecError> {
        let block = render_reply(&request.final_reply());
        writer.write_all(block.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

fn render_reply(reply: &Value) -> String {
    match reply {
        // A bare terminator would read as a request separator.
        Value::Map(map) if map.is_empty() => rfc822::write_block([("result", String::new())]),
        Value::Map(map) => rfc822::write_block(
            map.iter()
                .map(|(key, value)| (key.as_str(), value.render())),
        ),
        Value::Error(error) => {
            let code = error.code().to_string();
            let mut pairs = vec![("code", code), ("message", error.message().to_owned())];
            if let Some(data) = error.data() {
                pairs.push(("data", data.to_owned()));
            }
            rfc822::write_block(pairs)
        }
        other => rfc822::write_block([("result", other.render())]),
    }
}
