//! Declarative parameter validation.
//!
//! A rule names a parameter, whether it must be present, the kind it must
//! have and an optional pattern its rendering must match. Rules are applied
//! in order and the first failure ends evaluation. Wrong kinds are coerced
//! in place, so a second pass over the same parameters changes nothing.

use std::fmt;

use regex::Regex;
use rpcd_types::{ErrorCode, Map, RpcError, Value, ValueKind};

use crate::error::FirewallError;

/// Key of a configuration fragment holding extra rules.
pub const FIREWALL_KEY: &str = "firewall";

/// Message used when parameters are not a map.
pub const EXPECTED_OBJECT: &str = "Expected parameters in object form";
/// Message used when a required parameter is absent.
pub const PARAMETER_REQUIRED: &str = "Parameter required";
/// Message used when a parameter does not match its pattern.
pub const INVALID_VALUE: &str = "Invalid value";

/// Validation rule for one parameter.
#[derive(Clone)]
pub struct FirewallRule {
    name: String,
    required: bool,
    kind: Option<ValueKind>,
    pattern: Option<Regex>,
}

impl FirewallRule {
    /// An optional rule with no type or pattern constraint.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind: None,
            pattern: None,
        }
    }

    /// Marks the parameter as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Requires the parameter to have `kind`, coercing when it does not.
    #[must_use]
    pub const fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Requires the parameter's rendering to match `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError::InvalidPattern`] when the pattern does not
    /// compile.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, FirewallError> {
        let regex = Regex::new(pattern).map_err(|source| FirewallError::InvalidPattern {
            name: self.name.clone(),
            source: Box::new(source),
        })?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the parameter must be present.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Expected kind.
    #[must_use]
    pub const fn kind(&self) -> Option<ValueKind> {
        self.kind
    }

    /// Parses a rule from a `{name, required, type, regex}` table.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] when the table is malformed.
    pub fn from_value(value: &Value) -> Result<Self, FirewallError> {
        let table = value
            .as_map()
            .ok_or(FirewallError::NotATable { kind: value.kind() })?;
        let name = table
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or(FirewallError::MissingName)?;

        let mut rule = Self::new(name);
        if table
            .get("required")
            .and_then(|flag| flag.coerce(ValueKind::Bool).ok())
            == Some(Value::Bool(true))
        {
            rule = rule.required();
        }
        if let Some(kind_name) = table.get("type").map(Value::render) {
            let kind = kind_name
                .parse()
                .map_err(|source| FirewallError::InvalidKind {
                    name: name.to_owned(),
                    source,
                })?;
            rule = rule.with_kind(kind);
        }
        match table.get("regex").map(Value::render) {
            Some(pattern) => rule.with_pattern(&pattern),
            None => Ok(rule),
        }
    }

    /// Reads the `firewall` list of a configuration fragment.
    ///
    /// A missing key yields no rules.
    ///
    /// # Errors
    ///
    /// Returns [`FirewallError`] for the first malformed entry.
    pub fn from_fragment(fragment: &Map) -> Result<Vec<Self>, FirewallError> {
        match fragment.get(FIREWALL_KEY) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::List(rules)) => rules.iter().map(Self::from_value).collect(),
            Some(single) => Ok(vec![Self::from_value(single)?]),
        }
    }

    fn apply(&self, params: &mut Map) -> Result<(), RpcError> {
        let Some(value) = params.get_mut(&self.name) else {
            if self.required {
                return Err(self.failure(PARAMETER_REQUIRED));
            }
            return Ok(());
        };

        if let Some(kind) = self.kind
            && value.kind() != kind
        {
            *value = value.coerce(kind).map_err(|error| {
                RpcError::from_code(ErrorCode::InternalError).with_data(error.to_string())
            })?;
        }

        match &self.pattern {
            Some(pattern) if !pattern.is_match(&value.render()) => {
                Err(self.failure(INVALID_VALUE))
            }
            _ => Ok(()),
        }
    }

    fn failure(&self, message: &str) -> RpcError {
        RpcError::from_code(ErrorCode::InvalidParams)
            .with_message(message)
            .with_data(self.name.clone())
    }
}

impl fmt::Debug for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirewallRule")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("kind", &self.kind)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .finish()
    }
}

/// Validates `params` against `rules`, coercing values in place.
///
/// # Errors
///
/// Returns an invalid-params [`RpcError`] naming the offending parameter, or
/// an internal error when a rule asks for a kind that has no coercion.
pub fn evaluate(params: &mut Value, rules: &[FirewallRule]) -> Result<(), RpcError> {
    if rules.is_empty() {
        return Ok(());
    }
    let Some(map) = params.as_map_mut() else {
        return Err(RpcError::from_code(ErrorCode::InvalidParams).with_message(EXPECTED_OBJECT));
    };
    rules.iter().try_for_each(|rule| rule.apply(map))
}

#[cfg(test)]
mod tests;
