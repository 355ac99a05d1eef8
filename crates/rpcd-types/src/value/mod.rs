//! The dynamically tagged [`Value`] type.

mod coerce;

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::error::{RpcError, TypeError};

/// Ordered string-keyed map used for object-shaped values.
pub type Map = IndexMap<String, Value>;

/// Discriminant of a [`Value`], used by firewall rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Absent value.
    Null,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Double-precision float.
    Double,
    /// UTF-8 string.
    String,
    /// Ordered list.
    List,
    /// Ordered string-keyed map.
    Map,
    /// Structured error.
    Error,
}

impl ValueKind {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = TypeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "bool" | "boolean" => Ok(Self::Bool),
            "int" | "integer" => Ok(Self::Int),
            "double" | "float" | "number" => Ok(Self::Double),
            "string" | "str" => Ok(Self::String),
            "list" | "array" => Ok(Self::List),
            "map" | "hash" | "object" => Ok(Self::Map),
            "error" => Ok(Self::Error),
            _ => Err(TypeError::UnknownKind {
                name: input.to_owned(),
            }),
        }
    }
}

/// Request parameters and replies.
///
/// Only one variant is live at a time. Use [`Value::coerce`] for the
/// firewall's conversion table and [`Value::render`] for the string form.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list.
    List(Vec<Value>),
    /// Ordered string-keyed map.
    Map(Map),
    /// Structured error.
    Error(RpcError),
}

impl Value {
    /// Creates an empty map value.
    #[must_use]
    pub fn map() -> Self {
        Self::Map(Map::new())
    }

    /// Returns the discriminant.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Double(_) => ValueKind::Double,
            Self::String(_) => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Error(_) => ValueKind::Error,
        }
    }

    /// Returns `true` for map values.
    #[must_use]
    pub const fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Returns `true` for error values.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Borrows the map payload.
    #[must_use]
    pub const fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrows the map payload.
    pub const fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Borrows the list payload.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Borrows the string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    /// Borrows the error payload.
    #[must_use]
    pub const fn as_error(&self) -> Option<&RpcError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Looks up a key when the value is a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Inserts a key when the value is a map, returning the previous entry.
    ///
    /// Non-map values are left untouched and `None` is returned.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Self>) -> Option<Self> {
        self.as_map_mut()
            .and_then(|map| map.insert(key.into(), value.into()))
    }

    /// Converts the value to the requested kind using the fixed coercion
    /// table.
    ///
    /// Coercing to the value's own kind returns an unchanged clone, so
    /// repeated coercion is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::Unsupported`] when the target is
    /// [`ValueKind::Null`] or [`ValueKind::Error`].
    pub fn coerce(&self, kind: ValueKind) -> Result<Self, TypeError> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        coerce::coerce(self, kind)
    }

    /// Renders the value as a string.
    ///
    /// Lists are joined with single spaces; maps become `key: value` lines.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(flag) => flag.to_string(),
            Self::Int(number) => number.to_string(),
            Self::Double(number) => render_double(*number),
            Self::String(text) => text.clone(),
            Self::List(items) => items
                .iter()
                .map(Self::render)
                .collect::<Vec<_>>()
                .join(" "),
            Self::Map(map) => map
                .iter()
                .map(|(key, value)| format!("{key}: {}", value.render()))
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Error(error) => error.message().to_owned(),
        }
    }
}

/// Shortest round-trip rendering; integral values drop the fraction.
fn render_double(number: f64) -> String {
    format!("{number}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Self::Int(number)
    }
}

impl From<i32> for Value {
    fn from(number: i32) -> Self {
        Self::Int(i64::from(number))
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Double(number)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::String(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::String(text)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl From<RpcError> for Value {
    fn from(error: RpcError) -> Self {
        Self::Error(error)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::Map(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
