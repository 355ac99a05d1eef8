//! Shared value model for the rpcd daemon.
//!
//! Every request parameter set and every reply travels through the daemon as
//! a [`Value`]: a closed, dynamically tagged union covering the JSON data
//! model plus a dedicated error variant. The crate also defines the JSON-RPC
//! derived error taxonomy ([`ErrorCode`], [`RpcError`]) shared by the wire
//! codecs, the dispatcher and the module implementations.
//!
//! Conversions between variants are explicit. [`Value::coerce`] implements the
//! fixed coercion table used by the parameter firewall and [`Value::render`]
//! produces the canonical string rendering used for regex checks and for
//! passing parameters to shell modules.
//!
//! # Example
//!
//! ```
//! use rpcd_types::{Value, ValueKind};
//!
//! let value = Value::from("42");
//! let coerced = value.coerce(ValueKind::Int).expect("int is coercible");
//! assert_eq!(coerced, Value::Int(42));
//! assert_eq!(Value::Double(2.5).render(), "2.5");
//! ```

pub mod error;
mod json;
pub mod value;

pub use self::error::{ErrorCode, RpcError, TypeError};
pub use self::value::{Map, Value, ValueKind};
