//! Configuration document model and scalar coercion.
//!
//! Pure functions over the evaluated source, which is always a normalized
//! JSON tree.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An evaluated configuration source.
///
/// Immutable once built. Lookups walk dotted paths such as
/// `ai.localAI.defaultPort` and never fail: anything missing, empty or of the
/// wrong shape resolves to the caller's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    #[must_use]
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// A document without any keys. Every lookup returns its default.
    #[must_use]
    pub fn empty() -> Self {
        Self { root: Value::Null }
    }

    /// Borrow the raw tree.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Walk `path` and return the terminal value, if every segment exists.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }
        path.split('.').try_fold(&self.root, |node, segment| {
            if segment.is_empty() {
                return None;
            }
            node.as_object()?.get(segment)
        })
    }

    /// Resolve `path` coerced to `T`, falling back to `default`.
    #[must_use]
    pub fn get<T: ConfigScalar>(&self, path: &str, default: T) -> T {
        self.lookup(path)
            .filter(|v| !is_empty(v))
            .and_then(T::from_value)
            .unwrap_or(default)
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Types a configuration value can be coerced into.
pub trait ConfigScalar: Sized {
    /// Convert a non-empty JSON value, or `None` if it does not fit.
    fn from_value(value: &Value) -> Option<Self>;
}

impl ConfigScalar for String {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl ConfigScalar for bool {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_u64().map(|n| n != 0),
            _ => None,
        }
    }
}

impl ConfigScalar for u64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ConfigScalar for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ConfigScalar for u32 {
    fn from_value(value: &Value) -> Option<Self> {
        u64::from_value(value).and_then(|n| u32::try_from(n).ok())
    }
}

impl ConfigScalar for u16 {
    fn from_value(value: &Value) -> Option<Self> {
        u64::from_value(value).and_then(|n| u16::try_from(n).ok())
    }
}

impl ConfigScalar for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl ConfigScalar for Vec<String> {
    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(String::from_value)
            .collect::<Option<Vec<_>>>()
    }
}

/// Modification signature of a configuration source.
///
/// Two signatures compare equal only if both the modification time and the
/// length are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSignature {
    pub modified_secs: u64,
    pub modified_nanos: u32,
    pub len: u64,
}
