//! `key: value` line blocks.
//!
//! Shell modules print their result in this format and the RFC822 wire
//! protocol uses it for whole requests. A block ends at the first blank line
//! or at the end of the text.

use rpcd_types::{Map, Value};
use thiserror::Error;

/// A line that is not `key: value`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line} is not a 'key: value' pair: {text:?}")]
pub struct BlockParseError {
    /// One-based line number.
    pub line: usize,
    /// Offending text.
    pub text: String,
}

/// Parses a block into an ordered string map.
///
/// Keys and values are trimmed. A repeated key keeps its last value.
///
/// # Errors
///
/// Returns [`BlockParseError`] for the first line without a colon or with
/// an empty key.
pub fn parse_block(text: &str) -> Result<Map, BlockParseError> {
    let mut map = Map::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            break;
        }
        let parsed = line
            .split_once(':')
            .map(|(key, value)| (key.trim(), value.trim()))
            .filter(|(key, _)| !key.is_empty());
        let Some((key, value)) = parsed else {
            return Err(BlockParseError {
                line: index + 1,
                text: line.to_owned(),
            });
        };
        map.insert(key.to_owned(), Value::from(value));
    }
    Ok(map)
}

/// Renders `pairs` as a block terminated by a blank line.
///
/// Newlines inside values are folded into spaces so each pair stays on one
/// line.
#[must_use]
pub fn write_block<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> String {
    let mut out = String::new();
    for (key, value) in pairs {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&fold(&value));
        out.push('\n');
    }
    out.push('\n');
    out
}

fn fold(value: &str) -> String {
    value
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join(" ")
}
