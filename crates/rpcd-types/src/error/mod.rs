//! Error taxonomy shared by the dispatcher, the modules and the wire codecs.
//!
//! Codes are derived from JSON-RPC 2.0. The reserved range below `-32000` is
//! extended with rpcd-specific codes for authentication, shell output parsing,
//! admission checks and handlers that produced nothing. Codes outside the
//! table (for example a shell module's exit status) are carried verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::ValueKind;

/// Well-known error codes with fixed default messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The request could not be decoded from the wire.
    ParseError,
    /// The request decoded but is not a valid invocation.
    InvalidRequest,
    /// No module is registered under the requested method name.
    MethodNotFound,
    /// A parameter failed firewall validation.
    InvalidParams,
    /// A handler failed without describing why.
    InternalError,
    /// Authentication was required and failed.
    AccessDenied,
    /// A shell module printed output that is not a `key: value` block.
    OutputParseError,
    /// An admission check rejected the request.
    InvalidInput,
    /// The request completed without producing a reply.
    NoOutput,
}

impl ErrorCode {
    /// Every known code, in wire order.
    pub const ALL: [Self; 9] = [
        Self::ParseError,
        Self::InvalidRequest,
        Self::MethodNotFound,
        Self::InvalidParams,
        Self::InternalError,
        Self::AccessDenied,
        Self::OutputParseError,
        Self::InvalidInput,
        Self::NoOutput,
    ];

    /// Returns the numeric wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::AccessDenied => -32099,
            Self::OutputParseError => -32098,
            Self::InvalidInput => -32097,
            Self::NoOutput => -32096,
        }
    }

    /// Returns the message used when no explicit message is supplied.
    #[must_use]
    pub const fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::AccessDenied => "Access denied",
            Self::OutputParseError => "Output parse error",
            Self::InvalidInput => "Invalid input",
            Self::NoOutput => "No output",
        }
    }

    /// Maps a numeric code back to a known variant.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.code())
    }
}

/// Structured error carried in a reply.
///
/// # Example
///
/// ```
/// use rpcd_types::{ErrorCode, RpcError};
///
/// let error = RpcError::from_code(ErrorCode::InvalidParams).with_data("msg");
/// assert_eq!(error.code(), -32602);
/// assert_eq!(error.message(), "Invalid params");
/// assert_eq!(error.data(), Some("msg"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    code: i64,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

impl RpcError {
    /// Builds an error from its raw parts.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>, data: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Builds an error for a known code using its default message.
    #[must_use]
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code.code(), code.default_message(), None)
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Attaches additional detail.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Numeric code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional detail.
    #[must_use]
    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Returns the known code this error carries, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl From<ErrorCode> for RpcError {
    fn from(code: ErrorCode) -> Self {
        Self::from_code(code)
    }
}

/// Errors raised by value conversions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The target kind has no coercion rule.
    #[error("values cannot be coerced to {kind}")]
    Unsupported {
        /// Requested target kind.
        kind: ValueKind,
    },
    /// A type name did not match any known kind.
    #[error("unknown value type '{name}'")]
    UnknownKind {
        /// Name that failed to parse.
        name: String,
    },
}
