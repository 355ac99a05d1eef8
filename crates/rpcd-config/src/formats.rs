//! Enumerated format choices: log output and the wire protocol.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Log output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Single-line human-readable output.
    Compact,
}

/// Request reader and reply writer pair used on every connection.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WireProtocol {
    /// JSON-RPC objects delimited by newlines or blank lines.
    #[default]
    Json,
    /// `key: value` blocks terminated by a blank line.
    Rfc822,
    /// JSON-RPC carried in HTTP `POST` bodies.
    Http,
}

/// Error returned when a format name is not recognised.
pub type FormatParseError = strum::ParseError;
