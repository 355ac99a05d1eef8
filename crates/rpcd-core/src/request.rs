//! Per-request state carried through the dispatch pipeline.
//!
//! A [`Request`] is created by a wire reader, mutated by the dispatcher and
//! the modules it invokes, and dropped once the writer has serialised the
//! reply. Nothing in it outlives the request.

use indexmap::IndexMap;
use rpcd_types::{ErrorCode, RpcError, Value};

use crate::auth::User;

/// Identity claimed by the transport, such as HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// Builds a credential pair.
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Claimed user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Claimed password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// One RPC invocation.
#[derive(Debug, Clone, Default)]
pub struct Request {
    id: Option<Value>,
    service: Option<String>,
    method: String,
    params: Value,
    reply: Option<Value>,
    credentials: Option<Credentials>,
    user: Option<User>,
    headers: IndexMap<String, String>,
    uri: Option<String>,
    last: bool,
}

impl Request {
    /// Creates a request for `method` with an empty parameter map.
    #[must_use]
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Value::map(),
            ..Self::default()
        }
    }

    /// Creates a request that failed before dispatch, such as a parse error.
    #[must_use]
    pub fn failed(error: RpcError) -> Self {
        Self {
            reply: Some(Value::Error(error)),
            ..Self::new(String::new())
        }
    }

    /// Sets the parameters. `Null` becomes an empty map.
    #[must_use]
    pub fn with_params(mut self, params: impl Into<Value>) -> Self {
        self.set_params(params.into());
        self
    }

    /// Sets the echo token.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Targets a named service.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches claimed credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Echo token, when the client supplied one.
    #[must_use]
    pub const fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    /// Replaces the echo token.
    pub fn set_id(&mut self, id: Option<Value>) {
        self.id = id;
    }

    /// Requested service, when any.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Replaces the requested service.
    pub fn set_service(&mut self, service: Option<String>) {
        self.service = service;
    }

    /// Method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Parameters.
    #[must_use]
    pub const fn params(&self) -> &Value {
        &self.params
    }

    /// Mutable parameters; the firewall coerces values in place.
    pub const fn params_mut(&mut self) -> &mut Value {
        &mut self.params
    }

    /// Replaces the parameters. `Null` becomes an empty map.
    pub fn set_params(&mut self, params: Value) {
        self.params = match params {
            Value::Null => Value::map(),
            other => other,
        };
    }

    /// Reply produced so far.
    #[must_use]
    pub const fn reply(&self) -> Option<&Value> {
        self.reply.as_ref()
    }

    /// Mutable reply, for modules that augment an earlier result.
    pub const fn reply_mut(&mut self) -> Option<&mut Value> {
        self.reply.as_mut()
    }

    /// Sets the reply.
    pub fn set_reply(&mut self, reply: impl Into<Value>) {
        self.reply = Some(reply.into());
    }

    /// Sets an error reply.
    pub fn set_error(&mut self, error: RpcError) {
        self.reply = Some(Value::Error(error));
    }

    /// Returns `true` when the reply is an error.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.reply.as_ref().is_some_and(Value::is_error)
    }

    /// Replaces the reply with `code` unless it already holds an error.
    pub fn fail(&mut self, code: ErrorCode) {
        if !self.has_error() {
            self.set_error(RpcError::from_code(code));
        }
    }

    /// Reply to serialise: the stored reply, or a "no output" error.
    #[must_use]
    pub fn final_reply(&self) -> Value {
        self.reply
            .clone()
            .unwrap_or_else(|| Value::Error(RpcError::from_code(ErrorCode::NoOutput)))
    }

    /// Claimed credentials.
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Replaces the claimed credentials.
    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        self.credentials = credentials;
    }

    /// Authenticated user, set by the dispatcher.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Records the authenticated user.
    pub fn set_user(&mut self, user: User) {
        self.user = Some(user);
    }

    /// Looks up a transport header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Stores a transport header under its lowercase name.
    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Requested URI, for HTTP transports.
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Records the requested URI.
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = Some(uri.into());
    }

    /// Returns `true` when the connection closes after this request.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.last
    }

    /// Marks whether the connection closes after this request.
    pub const fn set_last(&mut self, last: bool) {
        self.last = last;
    }
}
