//! Rows: the unit of data flowing through storage and the dataflow operators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A mapping from column name to scalar value, as described in `spec.md` §3.
///
/// Backed by a `BTreeMap` rather than a hash map: operators frequently need to
/// iterate a row's columns in a stable order (for hashing into a CVR row
/// version, for example), and rows are small enough that the asymptotic cost
/// of a btree over a hash map is irrelevant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self {
            columns: iter.into_iter().collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Extracts the ordered key value for `columns` (typically a table's
    /// primary key, or a secondary unique key). Panics only if `columns` names
    /// a column absent from this row's schema-declared column set, which
    /// callers should have validated against the `TableSpec` already.
    pub fn key_for(&self, columns: &[String]) -> RowKey {
        RowKey(
            columns
                .iter()
                .map(|c| self.columns.get(c).cloned().unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Returns a copy of this row with the zero-version column stripped, as
    /// is required before the row is exposed to a client query (`spec.md` §3
    /// table-spec invariant).
    pub fn without_column(&self, column: &str) -> Row {
        let mut c = self.columns.clone();
        c.remove(column);
        Row { columns: c }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// A primary (or secondary unique) key value: an ordered tuple of column
/// values, comparable and hashable so it can key a `BTreeMap`/`HashMap`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey(Vec<Value>);

impl RowKey {
    pub fn new(values: Vec<Value>) -> Self {
        RowKey(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}
