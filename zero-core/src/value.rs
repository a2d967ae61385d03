//! Scalar values that can appear in a [`Row`](crate::row::Row).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a column, fixed by the table's [`TableSpec`](crate::schema::TableSpec).
///
/// Every [`Value`] carries an implicit kind (its variant); `ColumnKind` is the
/// declared kind a column is allowed to hold, checked on `push` (see
/// `zero-dataflow::storage`) and reported as `SchemaMismatch` on mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Bool,
    Int64,
    Float64,
    String,
    Bytes,
    Json,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Bool => "bool",
            ColumnKind::Int64 => "int64",
            ColumnKind::Float64 => "float64",
            ColumnKind::String => "string",
            ColumnKind::Bytes => "bytes",
            ColumnKind::Json => "json",
        };
        f.write_str(s)
    }
}

/// A scalar value of one of the kinds enumerated in `spec.md` §3: `{null, bool,
/// int64, float64, string, bytes, json}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    /// Returns the [`ColumnKind`] this value would satisfy, or `None` for `Null`
    /// (null is assignable to any kind).
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Int(_) => Some(ColumnKind::Int64),
            Value::Float(_) => Some(ColumnKind::Float64),
            Value::String(_) => Some(ColumnKind::String),
            Value::Bytes(_) => Some(ColumnKind::Bytes),
            Value::Json(_) => Some(ColumnKind::Json),
        }
    }

    /// Whether this value may be stored in a column declared with `kind`.
    pub fn matches_kind(&self, kind: ColumnKind) -> bool {
        matches!(self.kind(), None) || self.kind() == Some(kind)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// `Value` needs a total order so OrderBy and primary-key comparisons are
// well-defined even over floats (`f64` has no `Ord` because of `NaN`). We use
// `total_cmp`, matching IEEE 754-2019 totalOrder, and treat cross-kind
// comparisons by a fixed variant rank so a (mis-typed) mixed column still
// sorts deterministically rather than panicking.
fn variant_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) => 2,
        Value::Float(_) => 3,
        Value::String(_) => 4,
        Value::Bytes(_) => 5,
        Value::Json(_) => 6,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (String(a), String(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.to_string().cmp(&b.to_string()),
            _ => variant_rank(self).cmp(&variant_rank(other)),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        variant_rank(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Json(j) => j.to_string().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "0x{}", hex(b)),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_nan_orders_without_panicking() {
        let nan = Value::Float(f64::NAN);
        let zero = Value::Float(0.0);
        // total_cmp gives NaN a fixed (if arbitrary) slot; just check it doesn't panic
        // and is consistent both ways.
        let a = nan.cmp(&zero);
        let b = zero.cmp(&nan);
        assert_eq!(a.reverse(), b);
    }

    #[test]
    fn int_and_float_compare_numerically() {
        assert_eq!(Value::Int(2).cmp(&Value::Float(2.0)), Ordering::Equal);
        assert!(Value::Int(1) < Value::Float(1.5));
    }

    #[test]
    fn null_matches_any_kind() {
        assert!(Value::Null.matches_kind(ColumnKind::String));
        assert!(!Value::Int(1).matches_kind(ColumnKind::String));
    }
}
