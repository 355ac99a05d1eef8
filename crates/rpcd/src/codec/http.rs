//! JSON-RPC carried in HTTP/1.x `POST` bodies.

use std::io::{BufRead, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use rpcd_core::{Credentials, Request};
use rpcd_types::{ErrorCode, RpcError, Value};
use tracing::debug;

use super::json::{encode_envelope, request_from_document};
use super::{Budget, CODEC_TARGET, CodecError, ReadOutcome, WireCodec, is_blank};

const CONTENT_TYPE: &str = "application/json-rpc";

/// HTTP framing.
///
/// Requests are `POST`s whose body is one JSON-RPC object. HTTP Basic
/// credentials become the request's claimed identity and the first segment
/// of the URI path, when present, selects the service. Other methods are
/// answered with an invalid-request error.
#[derive(Debug, Clone)]
pub struct HttpCodec {
    realm: String,
}

impl HttpCodec {
    /// Builds a codec that names `realm` in authentication challenges.
    #[must_use]
    pub fn new(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
        }
    }
}

/// Request line and headers of one HTTP message.
#[derive(Debug)]
struct Head {
    method: String,
    uri: String,
    version: String,
    headers: Vec<(String, String)>,
}

impl Head {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn has_token(&self, name: &str, token: &str) -> bool {
        self.header(name).is_some_and(|value| {
            value
                .split(',')
                .any(|part| part.trim().eq_ignore_ascii_case(token))
        })
    }

    /// HTTP/1.1 keeps connections open unless told otherwise; HTTP/1.0 only
    /// when asked to.
    fn closes_connection(&self) -> bool {
        if self.has_token("connection", "close") {
            return true;
        }
        self.version.eq_ignore_ascii_case("HTTP/1.0") && !self.has_token("connection", "keep-alive")
    }

    fn credentials(&self) -> Option<Credentials> {
        let (scheme, encoded) = self.header("authorization")?.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        let (user, password) = text.split_once(':')?;
        Some(Credentials::new(user, password))
    }

    /// First path segment, percent-decoded.
    fn service(&self) -> Option<String> {
        let path = self.uri.split(['?', '#']).next().unwrap_or_default();
        let segment = path.trim_start_matches('/').split('/').next()?;
        if segment.is_empty() {
            return None;
        }
        percent_decode_str(segment)
            .decode_utf8()
            .ok()
            .map(|decoded| decoded.into_owned())
    }

    /// Declared body length; `None` when the header is not a number.
    fn content_length(&self) -> Option<usize> {
        self.header("content-length")
            .map_or(Some(0), |value| value.trim().parse().ok())
    }
}

impl WireCodec for HttpCodec {
    fn read_request(&self, reader: &mut dyn BufRead) -> Result<ReadOutcome, CodecError> {
        let mut budget = Budget::new();
        let head = match read_head(reader, &mut budget)? {
            Framing::Head(head) => head,
            Framing::Broken => return Ok(closing(ReadOutcome::malformed(ErrorCode::InvalidRequest))),
            Framing::EndOfStream => return Ok(ReadOutcome::EndOfStream),
        };
        let Some(length) = head.content_length() else {
            return Ok(closing(ReadOutcome::malformed(ErrorCode::InvalidRequest)));
        };
        let body = budget.read_exact(reader, length)?;

        let outcome = if head.method.eq_ignore_ascii_case("POST") {
            parse_body(&body)
        } else {
            debug!(target: CODEC_TARGET, method = %head.method, uri = %head.uri, "unsupported HTTP method");
            ReadOutcome::Malformed(Request::failed(
                RpcError::from_code(ErrorCode::InvalidRequest).with_data(head.method.clone()),
            ))
        };
        Ok(attach_transport(outcome, &head))
    }

    fn write_reply(&self, writer: &mut dyn Write, request: &Request) -> Result<(), CodecError> {
        let mut body = encode_envelope(request)?;
        body.push('\n');
        let (status, reason) = status_for(request);

        let mut head = format!("HTTP/1.1 {status} {reason}\r\n");
        head.push_str(&format!("Content-Type: {CONTENT_TYPE}\r\n"));
        head.push_str(&format!("Content-Length: {}\r\n", body.len()));
        if status == 401 {
            head.push_str(&format!(
                "WWW-Authenticate: Basic realm=\"{}\"\r\n",
                self.realm
            ));
        }
        let connection = if request.is_last() { "close" } else { "keep-alive" };
        head.push_str(&format!("Connection: {connection}\r\n\r\n"));

        writer.write_all(head.as_bytes())?;
        writer.write_all(body.as_bytes())?;
        writer.flush()?;
        Ok(())
    }
}

enum Framing {
    Head(Head),
    Broken,
    EndOfStream,
}

/// Reads the request line and headers.
fn read_head(reader: &mut dyn BufRead, budget: &mut Budget) -> Result<Framing, CodecError> {
    let mut line = String::new();
    loop {
        if !budget.read_line(reader, &mut line)? {
            return Ok(Framing::EndOfStream);
        }
        if !is_blank(&line) {
            break;
        }
    }
    let mut parts = line.split_whitespace();
    let (Some(method), Some(uri), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!(target: CODEC_TARGET, line = line.trim_end(), "malformed HTTP request line");
        return Ok(Framing::Broken);
    };
    let mut head = Head {
        method: method.to_owned(),
        uri: uri.to_owned(),
        version: version.to_owned(),
        headers: Vec::new(),
    };

    let mut malformed = false;
    while budget.read_line(reader, &mut line)? && !is_blank(&line) {
        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => head
                .headers
                .push((name.trim().to_owned(), value.trim().to_owned())),
            _ => malformed = true,
        }
    }
    if malformed {
        debug!(target: CODEC_TARGET, uri = %head.uri, "malformed HTTP header");
        return Ok(Framing::Broken);
    }
    Ok(Framing::Head(head))
}

fn parse_body(body: &[u8]) -> ReadOutcome {
    serde_json::from_slice::<serde_json::Value>(body).map_or_else(
        |error| {
            debug!(target: CODEC_TARGET, %error, "unparseable HTTP body");
            ReadOutcome::malformed(ErrorCode::ParseError)
        },
        request_from_document,
    )
}

/// Copies headers, credentials, the URI and the connection policy onto the
/// request. A service named in the URI wins over one in the body.
fn attach_transport(mut outcome: ReadOutcome, head: &Head) -> ReadOutcome {
    if let Some(request) = outcome.request_mut() {
        for (name, value) in &head.headers {
            request.insert_header(name, value.clone());
        }
        request.set_uri(head.uri.clone());
        request.set_credentials(head.credentials());
        if let Some(service) = head.service() {
            request.set_service(Some(service));
        }
        request.set_last(head.closes_connection());
    }
    outcome
}

/// Marks an outcome as the last on its connection.
const fn closing(mut outcome: ReadOutcome) -> ReadOutcome {
    if let Some(request) = outcome.request_mut() {
        request.set_last(true);
    }
    outcome
}

/// Maps a reply to an HTTP status.
///
/// Access denials answer 401 when no credentials were offered at all, so
/// clients can retry with a challenge response, and 403 otherwise.
fn status_for(request: &Request) -> (u16, &'static str) {
    let reply = request.final_reply();
    let Some(error) = reply.as_error() else {
        return (200, "OK");
    };
    match error.error_code() {
        Some(
            ErrorCode::ParseError
            | ErrorCode::InvalidRequest
            | ErrorCode::InvalidParams
            | ErrorCode::InvalidInput,
        ) => (400, "Bad Request"),
        Some(ErrorCode::AccessDenied) if request.credentials().is_none() => (401, "Unauthorized"),
        Some(ErrorCode::AccessDenied) => (403, "Forbidden"),
        Some(ErrorCode::MethodNotFound) => (404, "Not Found"),
        _ => (500, "Internal Server Error"),
    }
}
