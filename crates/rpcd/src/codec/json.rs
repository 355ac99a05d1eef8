//! JSON-RPC objects delimited by newlines or blank lines.

use std::io::{BufRead, Write};

use rpcd_core::Request;
use rpcd_types::{ErrorCode, RpcError, Value};
use serde_json::{Map as JsonMap, Value as Json};
use tracing::debug;

use super::{Budget, CODEC_TARGET, CodecError, ReadOutcome, WireCodec, is_blank};

const JSONRPC_VERSION: &str = "2.0";

/// Plain JSON-RPC framing.
///
/// A request is one JSON object. It may span several lines; the reader
/// stops at the end of the line that closes the outermost value, and a
/// blank line ends a document early. Replies are followed by a blank line.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl WireCodec for JsonCodec {
    fn read_request(&self, reader: &mut dyn BufRead) -> Result<ReadOutcome, CodecError> {
        let mut budget = Budget::new();
        let mut scanner = DocumentScanner::default();
        let mut text = String::new();
        let mut line = String::new();
        loop {
            if !budget.read_line(reader, &mut line)? {
                return Ok(if is_blank(&text) {
                    ReadOutcome::EndOfStream
                } else {
                    parse_document(&text)
                });
            }
            if is_blank(&line) {
                if is_blank(&text) {
                    continue;
                }
                return Ok(parse_document(&text));
            }
            scanner.feed(line.as_bytes());
            text.push_str(&line);
            if scanner.is_complete() {
                return Ok(parse_document(&text));
            }
        }
    }

    fn write_reply(&self, writer: &mut dyn Write, request: &Request) -> Result<(), CodecError> {
        let text = encode_envelope(request)?;
        writer.write_all(text.as_bytes())?;
        writer.write_all(b"\n\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Tracks nesting across lines so a document is parsed once, when its
/// outermost value closes.
#[derive(Debug, Default)]
struct DocumentScanner {
    depth: usize,
    started: bool,
    in_string: bool,
    escaped: bool,
}

impl DocumentScanner {
    fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => {
                    self.in_string = true;
                    self.started = true;
                }
                b'{' | b'[' => {
                    self.depth = self.depth.saturating_add(1);
                    self.started = true;
                }
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.started = true;
                }
                _ if byte.is_ascii_whitespace() => {}
                _ => self.started = true,
            }
        }
    }

    /// A top-level value has been seen and every bracket and string is
    /// closed. Stray closers count as complete so the parser can reject
    /// them.
    const fn is_complete(&self) -> bool {
        self.started && self.depth == 0 && !self.in_string
    }
}

fn parse_document(text: &str) -> ReadOutcome {
    serde_json::from_str::<Json>(text).map_or_else(
        |error| {
            debug!(target: CODEC_TARGET, %error, "unparseable JSON request");
            ReadOutcome::malformed(ErrorCode::ParseError)
        },
        request_from_document,
    )
}

/// Builds a request from a parsed JSON-RPC object.
///
/// `method` must be a non-empty string and `params`, when present, an
/// object, an array or `null`. `jsonrpc` is optional but must read `2.0`
/// when given. The `id` is kept even when the envelope is rejected.
pub(super) fn request_from_document(document: Json) -> ReadOutcome {
    let Json::Object(mut object) = document else {
        return ReadOutcome::malformed(ErrorCode::InvalidRequest);
    };
    let id = object.remove("id").map(Value::from);
    match envelope_request(&mut object) {
        Ok(mut request) => {
            request.set_id(id);
            ReadOutcome::Request(request)
        }
        Err(error) => {
            let mut request = Request::failed(error);
            request.set_id(id);
            ReadOutcome::Malformed(request)
        }
    }
}

fn envelope_request(object: &mut JsonMap<String, Json>) -> Result<Request, RpcError> {
    let invalid = |detail: &str| RpcError::from_code(ErrorCode::InvalidRequest).with_data(detail);

    match object.remove("jsonrpc") {
        None => {}
        Some(Json::String(version)) if version == JSONRPC_VERSION => {}
        Some(_) => return Err(invalid("jsonrpc")),
    }
    let method = match object.remove("method") {
        Some(Json::String(method)) if !method.is_empty() => method,
        _ => return Err(invalid("method")),
    };
    let params = match object.remove("params") {
        None | Some(Json::Null) => Value::map(),
        Some(params @ (Json::Object(_) | Json::Array(_))) => Value::from(params),
        Some(_) => return Err(invalid("params")),
    };
    let service = match object.remove("service") {
        None | Some(Json::Null) => None,
        Some(Json::String(service)) => Some(service),
        Some(_) => return Err(invalid("service")),
    };

    let mut request = Request::new(method).with_params(params);
    request.set_service(service);
    Ok(request)
}

/// Renders the JSON-RPC reply envelope for `request`.
pub(super) fn encode_envelope(request: &Request) -> Result<String, CodecError> {
    let reply = request.final_reply();
    let mut envelope = JsonMap::new();
    envelope.insert(String::from("jsonrpc"), Json::from(JSONRPC_VERSION));
    if let Some(id) = request.id() {
        envelope.insert(String::from("id"), Json::from(id));
    }
    let slot = if reply.is_error() { "error" } else { "result" };
    envelope.insert(String::from(slot), Json::from(&reply));
    Ok(serde_json::to_string(&Json::Object(envelope))?)
}
