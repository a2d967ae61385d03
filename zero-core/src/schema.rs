//! Table and relationship metadata (`spec.md` §3 "Table spec", "Schema").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{internal_err, ZeroResult};
use crate::value::ColumnKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Cardinality of the child side of a one-hop relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// The intermediate table of a two-hop relationship (`spec.md` §3, §4.2.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionSpec {
    pub table: String,
    /// Correlation from the parent table's key to the junction table.
    pub parent_to_junction: Vec<(String, String)>,
    /// Correlation from the junction table to the child table's key.
    pub junction_to_child: Vec<(String, String)>,
}

/// A named, directional relationship from one table to another, optionally
/// through a junction table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub parent_table: String,
    pub child_table: String,
    /// Correlated (parent column, child column) pairs. For a two-hop
    /// relationship these correlate the parent to `junction`, and `junction`
    /// supplies the second hop.
    pub correlation: Vec<(String, String)>,
    pub cardinality: Cardinality,
    pub junction: Option<JunctionSpec>,
}

impl Relationship {
    pub fn is_two_hop(&self) -> bool {
        self.junction.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Non-empty ordered sequence of column names whose concatenated value is
    /// unique (`spec.md` §3 "Row").
    pub primary_key: Vec<String>,
    pub unique_keys: Vec<Vec<String>>,
    /// Monotonic per-row version column, always last, never exposed to client
    /// queries (`spec.md` §3 invariant).
    pub zero_version_column: String,
}

impl TableSpec {
    pub fn column_kind(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Columns exposed to client queries: everything except the zero-version
    /// column.
    pub fn client_visible_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns
            .iter()
            .filter(move |c| c.name != self.zero_version_column)
    }

    pub fn validate(&self) -> ZeroResult<()> {
        if self.primary_key.is_empty() {
            return Err(internal_err(format!(
                "table {} has an empty primary key",
                self.name
            )));
        }
        for pk_col in &self.primary_key {
            if !self.has_column(pk_col) {
                return Err(internal_err(format!(
                    "table {} primary key references unknown column {}",
                    self.name, pk_col
                )));
            }
        }
        if !self.has_column(&self.zero_version_column) {
            return Err(internal_err(format!(
                "table {} is missing its zero-version column {}",
                self.name, self.zero_version_column
            )));
        }
        if self.columns.last().map(|c| &c.name) != Some(&self.zero_version_column) {
            return Err(internal_err(format!(
                "table {}'s zero-version column must be ordered last",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: HashMap<String, TableSpec>,
    pub relationships: Vec<Relationship>,
}

impl Schema {
    pub fn table(&self, name: &str) -> ZeroResult<&TableSpec> {
        self.tables
            .get(name)
            .ok_or_else(|| internal_err(format!("unknown table {name}")))
    }

    /// Relationships declared on `table`, by name.
    pub fn relationships_on(&self, table: &str) -> impl Iterator<Item = &Relationship> {
        self.relationships
            .iter()
            .filter(move |r| r.parent_table == table)
    }

    pub fn relationship(&self, table: &str, name: &str) -> ZeroResult<&Relationship> {
        self.relationships_on(table)
            .find(|r| r.name == name)
            .ok_or_else(|| internal_err(format!("unknown relationship {table}.{name}")))
    }

    pub fn validate(&self) -> ZeroResult<()> {
        for t in self.tables.values() {
            t.validate()?;
        }
        for r in &self.relationships {
            self.table(&r.parent_table)?;
            self.table(&r.child_table)?;
            if let Some(j) = &r.junction {
                self.table(&j.table)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_table() -> TableSpec {
        TableSpec {
            name: "item".into(),
            columns: vec![
                ColumnSpec { name: "id".into(), kind: ColumnKind::String },
                ColumnSpec { name: "price".into(), kind: ColumnKind::Int64 },
                ColumnSpec { name: "_0_version".into(), kind: ColumnKind::String },
            ],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_table() {
        assert!(item_table().validate().is_ok());
    }

    #[test]
    fn validate_rejects_version_column_not_last() {
        let mut t = item_table();
        t.columns.swap(1, 2);
        assert!(t.validate().is_err());
    }

    #[test]
    fn client_visible_columns_excludes_version() {
        let t = item_table();
        let names: Vec<_> = t.client_visible_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "price"]);
    }
}
