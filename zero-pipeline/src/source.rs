//! Pull-side row sources the builder wires from live table storage: the
//! per-table lookup the host application implements, the two-hop junction
//! combinator, and the filtered/ordered/limited wrappers that serve a
//! RELATED child or EXISTS subquery's own WHERE/ORDER BY/LIMIT (`spec.md`
//! §4.2.2, §4.2.3, §4.3 "C3").

use std::sync::Arc;

use zero_core::errors::ZeroResult;
use zero_core::{Relationship, Row, Schema};

use zero_dataflow::{Constraint, OrderDirection, RowSource};

use crate::plan::PlanExpr;
use crate::predicate::row_matches;

/// Resolves a table name to its live row source. `zero-server` implements
/// this over its map of `TableStore`s (`spec.md` §4.1 "C1"); a pipeline
/// never reaches into storage directly, matching the "small fixed
/// capability set" boundary of `spec.md` §9.
pub trait SourceFactory: Send + Sync {
    fn table_source(&self, table: &str) -> ZeroResult<Arc<dyn RowSource>>;
}

/// The schema and source factory shared by every stage a [`crate::builder`]
/// wires, threaded through as owned `Arc`s so a `RowSource` built partway
/// through compilation can outlive the call that built it.
#[derive(Clone)]
pub struct BuildContext {
    pub schema: Arc<Schema>,
    pub sources: Arc<dyn SourceFactory>,
}

/// Chains a parent-to-junction fetch with a junction-to-child fetch, so a
/// two-hop relationship's child side can be pulled as a single `RowSource`
/// without the junction table ever surfacing to the caller (`spec.md`
/// §4.2.3: "the middle table is never exposed to the client view tree").
pub struct TwoHopSource {
    junction: Arc<dyn RowSource>,
    child: Arc<dyn RowSource>,
    junction_to_child: Vec<(String, String)>,
}

impl TwoHopSource {
    pub fn new(
        junction: Arc<dyn RowSource>,
        child: Arc<dyn RowSource>,
        junction_to_child: Vec<(String, String)>,
    ) -> Self {
        TwoHopSource {
            junction,
            child,
            junction_to_child,
        }
    }
}

impl RowSource for TwoHopSource {
    fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
        let junction_rows = self.junction.fetch(constraint)?;
        let mut out = Vec::new();
        for j in &junction_rows {
            let mut child_constraint = Constraint::none();
            for (j_col, c_col) in &self.junction_to_child {
                if let Some(v) = j.get(j_col) {
                    child_constraint = child_constraint.with(c_col.clone(), v.clone());
                }
            }
            out.extend(self.child.fetch(&child_constraint)?);
        }
        Ok(out)
    }
}

/// Re-filters a base source's result set against a compiled WHERE tree,
/// re-fetching for any nested `EXISTS` it contains (via [`row_matches`]).
/// Used for a RELATED child's own filter and an EXISTS subquery's nested
/// `where_`, neither of which need to emit their own `Child` events — they
/// only ever gate a pull.
pub struct FilteredSource {
    base: Arc<dyn RowSource>,
    where_: PlanExpr,
    ctx: BuildContext,
}

impl FilteredSource {
    pub fn new(base: Arc<dyn RowSource>, where_: PlanExpr, ctx: BuildContext) -> Self {
        FilteredSource { base, where_, ctx }
    }
}

impl RowSource for FilteredSource {
    fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
        let rows = self.base.fetch(constraint)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if row_matches(&self.where_, &row, &self.ctx)? {
                out.push(row);
            }
        }
        Ok(out)
    }
}

/// Sorts and truncates a base source's result set, for a RELATED child's own
/// ORDER BY/LIMIT (`spec.md` §4.2.5, §4.2.6). Applied once per fetch rather
/// than maintained incrementally: nested relationship lists are a bounded
/// convenience attached to a parent row, not a live keyset window in their
/// own right — `Limit`/`OrderBy` are reserved for the pipeline root.
pub struct OrderedLimitedSource {
    base: Arc<dyn RowSource>,
    order: Vec<(String, OrderDirection)>,
    limit: Option<u64>,
}

impl OrderedLimitedSource {
    pub fn new(base: Arc<dyn RowSource>, order: Vec<(String, OrderDirection)>, limit: Option<u64>) -> Self {
        OrderedLimitedSource { base, order, limit }
    }
}

impl RowSource for OrderedLimitedSource {
    fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
        let mut rows = self.base.fetch(constraint)?;
        if !self.order.is_empty() {
            rows.sort_by(|a, b| cmp_rows(a, b, &self.order));
        }
        if let Some(n) = self.limit {
            rows.truncate(n as usize);
        }
        Ok(rows)
    }
}

fn cmp_rows(a: &Row, b: &Row, order: &[(String, OrderDirection)]) -> std::cmp::Ordering {
    for (column, dir) in order {
        let av = a.get(column).cloned().unwrap_or(zero_core::Value::Null);
        let bv = b.get(column).cloned().unwrap_or(zero_core::Value::Null);
        let ord = match dir {
            OrderDirection::Asc => av.cmp(&bv),
            OrderDirection::Desc => bv.cmp(&av),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

/// Builds the fully-wired child source for `relationship`, honoring its own
/// `where_` filter and (for a two-hop relationship) chaining through the
/// junction table. Shared by the RELATED-child and EXISTS-subquery builders
/// (`crate::builder`) and by stateless EXISTS re-evaluation
/// (`crate::predicate::row_matches`).
pub fn child_source_for(
    relationship: &Relationship,
    child_where: Option<&PlanExpr>,
    ctx: &BuildContext,
) -> ZeroResult<Arc<dyn RowSource>> {
    let base: Arc<dyn RowSource> = match &relationship.junction {
        Some(junction) => {
            let junction_source = ctx.sources.table_source(&junction.table)?;
            let child_source = ctx.sources.table_source(&relationship.child_table)?;
            Arc::new(TwoHopSource::new(
                junction_source,
                child_source,
                junction.junction_to_child.clone(),
            ))
        }
        None => ctx.sources.table_source(&relationship.child_table)?,
    };
    match child_where {
        None => Ok(base),
        Some(expr) => Ok(Arc::new(FilteredSource::new(base, expr.clone(), ctx.clone()))),
    }
}
