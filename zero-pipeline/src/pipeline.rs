//! The wired operator graph a [`crate::builder`] compiles a [`crate::plan::PlanNode`]
//! into (`spec.md` §4.3 "C3"): a tree of stages mirroring the AST's shape,
//! each stage a thin driver of the stateless/stateful operators in
//! `zero-dataflow` (`spec.md` §4.2 "C2").

use zero_core::errors::ZeroResult;
use zero_core::{Relationship, Row, RowKey};

use zero_dataflow::ops::{Existence, FanIn, FanOut, Filter, Join, Limit, OrderBy, UnionFanIn};
use zero_dataflow::Change;

/// One node of the compiled WHERE tree: every shape mirrors the
/// corresponding [`crate::plan::PlanExpr`] variant, but drives a live
/// `zero-dataflow` operator instead of just describing one.
pub enum WhereStage {
    /// A subtree with no `EXISTS` anywhere in it: collapsed to a single
    /// stateless predicate.
    Predicate(Filter),
    And(Vec<WhereStage>),
    Or(OrStage),
    Exists(ExistsGate),
}

impl WhereStage {
    pub fn apply(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        match self {
            WhereStage::Predicate(f) => f.push(change),
            WhereStage::And(stages) => {
                let mut batch = vec![change];
                for stage in stages.iter_mut() {
                    batch = apply_each(stage, batch)?;
                }
                Ok(batch)
            }
            WhereStage::Or(or) => or.apply(change),
            WhereStage::Exists(gate) => gate.apply_parent(change),
        }
    }

    /// Routes a mutation on `table` (a relationship's child table, or — for
    /// a two-hop `EXISTS` — its junction table) to every `Exists` gate
    /// beneath this node that is correlated through it (`spec.md` §4.2.3's
    /// junction-reactivity problem).
    pub fn push_child(&mut self, table: &str, change: &Change) -> ZeroResult<Vec<Change>> {
        match self {
            WhereStage::Predicate(_) => Ok(vec![]),
            WhereStage::And(stages) => {
                let mut out = Vec::new();
                for stage in stages.iter_mut() {
                    out.extend(stage.push_child(table, change)?);
                }
                Ok(out)
            }
            WhereStage::Or(or) => or.push_child(table, change),
            WhereStage::Exists(gate) => gate.apply_child(table, change.clone()),
        }
    }
}

fn apply_each(stage: &mut WhereStage, batch: Vec<Change>) -> ZeroResult<Vec<Change>> {
    let mut out = Vec::new();
    for c in batch {
        out.extend(stage.apply(c)?);
    }
    Ok(out)
}

enum FanInKind {
    Simple(FanIn),
    Union(UnionFanIn),
}

/// An OR branch of the WHERE tree: broadcasts the incoming change to every
/// branch, then recombines with a plain [`FanIn`] (no branch contains
/// `EXISTS`) or a [`UnionFanIn`] (at least one does, so concurrent `Child`
/// events on the same parent need the literal merge table) (`spec.md`
/// §4.2.4).
pub struct OrStage {
    fan_out: FanOut,
    branches: Vec<WhereStage>,
    kind: FanInKind,
}

impl OrStage {
    pub fn new(branches: Vec<WhereStage>, pk: Vec<String>, any_branch_has_exists: bool) -> Self {
        let fan_out = FanOut::new(branches.len());
        let kind = if any_branch_has_exists {
            FanInKind::Union(UnionFanIn::new(pk))
        } else {
            FanInKind::Simple(FanIn::new(pk))
        };
        OrStage { fan_out, branches, kind }
    }

    pub fn apply(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        let clones = self.fan_out.broadcast(&change);
        let mut batch = Vec::new();
        for (branch, c) in self.branches.iter_mut().zip(clones) {
            batch.extend(branch.apply(c)?);
        }
        self.finish(batch)
    }

    fn push_child(&mut self, table: &str, change: &Change) -> ZeroResult<Vec<Change>> {
        let mut batch = Vec::new();
        for branch in self.branches.iter_mut() {
            batch.extend(branch.push_child(table, change)?);
        }
        self.finish(batch)
    }

    fn finish(&mut self, batch: Vec<Change>) -> ZeroResult<Vec<Change>> {
        match &mut self.kind {
            FanInKind::Union(u) => u.push_batch(batch),
            FanInKind::Simple(f) => {
                let mut out = Vec::new();
                for c in batch {
                    out.extend(f.push(c)?);
                }
                Ok(out)
            }
        }
    }
}

/// Drives an [`Existence`] operator and knows which table(s) (the
/// relationship's child table, or its junction table for a two-hop
/// relationship) feed it, so [`WhereStage::push_child`] can route to it by
/// table name.
pub struct ExistsGate {
    existence: Existence,
    relationship: Relationship,
}

impl ExistsGate {
    pub fn new(existence: Existence, relationship: Relationship) -> Self {
        ExistsGate { existence, relationship }
    }

    fn apply_parent(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        self.existence.push_parent(change)
    }

    fn apply_child(&mut self, table: &str, change: Change) -> ZeroResult<Vec<Change>> {
        if table == self.relationship.child_table {
            return self.existence.push_child(change);
        }
        if let Some(junction) = &self.relationship.junction {
            if table == junction.table {
                if let Some(parent_key) = junction_parent_key(&self.relationship, &change) {
                    return self.existence.refresh(&parent_key);
                }
            }
        }
        Ok(vec![])
    }
}

/// One RELATED child: a live [`Join`] plus the relationship it realizes, so
/// junction-table mutations can be routed to [`Join::refresh_children`] by
/// table name the same way [`ExistsGate`] routes to [`Existence::refresh`].
pub struct RelatedEdge {
    pub join: Join,
    pub relationship: Relationship,
}

impl RelatedEdge {
    pub fn push_child(&mut self, table: &str, change: &Change) -> ZeroResult<Vec<Change>> {
        if table == self.relationship.child_table {
            return self.join.push_child(change.clone());
        }
        if let Some(junction) = &self.relationship.junction {
            if table == junction.table {
                if let Some(parent_key) = junction_parent_key(&self.relationship, change) {
                    return self.join.refresh_children(&parent_key);
                }
            }
        }
        Ok(vec![])
    }
}

/// Recovers the parent row's key from a junction-table change, using the
/// relationship's parent-to-junction correlation. `None` if the junction row
/// doesn't carry every correlated column (a malformed junction row, or a
/// `Remove` keyed only by primary key with no other columns available) —
/// callers simply skip the refresh in that case rather than erroring, since
/// there is nothing to do: the delete's own terminal state needs no nudge.
fn junction_parent_key(relationship: &Relationship, change: &Change) -> Option<RowKey> {
    let junction = relationship.junction.as_ref()?;
    let row = match change {
        Change::Add { row, .. } | Change::Remove { row, .. } => row,
        Change::Edit { new, .. } => new,
        Change::Child { .. } | Change::OutputComplete => return None,
    };
    let mut values = Vec::new();
    for (parent_col, junction_col) in &junction.parent_to_junction {
        let _ = parent_col;
        values.push(row.get(junction_col)?.clone());
    }
    Some(RowKey::new(values))
}

/// One compiled query: the root table's WHERE tree, its RELATED children,
/// and the root-level ORDER BY/LIMIT/START window (`spec.md` §4.3). Mirrors
/// the [`crate::plan::PlanNode`] it was built from.
pub struct Pipeline {
    pub table: String,
    where_stage: Option<WhereStage>,
    related: Vec<RelatedEdge>,
    start: Option<Filter>,
    window: Window,
}

enum Window {
    None,
    OrderOnly(OrderBy),
    Limited(Limit),
}

impl Pipeline {
    pub fn new(
        table: impl Into<String>,
        where_stage: Option<WhereStage>,
        related: Vec<RelatedEdge>,
        start: Option<Filter>,
        window: WindowSpec,
    ) -> Self {
        let window = match window {
            WindowSpec::None => Window::None,
            WindowSpec::OrderOnly(ob) => Window::OrderOnly(ob),
            WindowSpec::Limited(l) => Window::Limited(l),
        };
        Pipeline {
            table: table.into(),
            where_stage,
            related,
            start,
            window,
        }
    }

    /// Applies a change originating from the root table itself (an initial
    /// hydration row, or a live replicated mutation).
    pub fn apply(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        let mut batch = match &mut self.where_stage {
            Some(stage) => stage.apply(change)?,
            None => vec![change],
        };
        for edge in self.related.iter_mut() {
            let mut next = Vec::new();
            for c in batch {
                next.extend(edge.join.push_parent(c)?);
            }
            batch = next;
        }
        if let Some(start) = &mut self.start {
            let mut next = Vec::new();
            for c in batch {
                next.extend(start.push(c)?);
            }
            batch = next;
        }
        match &mut self.window {
            Window::None => Ok(batch),
            Window::OrderOnly(ob) => {
                let mut out = Vec::new();
                for c in batch {
                    out.extend(ob.push(c)?);
                }
                Ok(out)
            }
            Window::Limited(limit) => {
                let mut out = Vec::new();
                for c in batch {
                    out.extend(limit.push(c)?);
                }
                Ok(out)
            }
        }
    }

    /// Routes a mutation on some other table (a RELATED child, a two-hop
    /// junction, or an EXISTS subquery's correlated table) to whichever
    /// operator is wired to it, then carries the result through the same
    /// START/ORDER BY/LIMIT window the root path uses.
    pub fn push_table_change(&mut self, table: &str, change: &Change) -> ZeroResult<Vec<Change>> {
        let mut batch = Vec::new();
        if let Some(stage) = &mut self.where_stage {
            batch.extend(stage.push_child(table, change)?);
        }
        for edge in self.related.iter_mut() {
            batch.extend(edge.push_child(table, change)?);
        }
        if batch.is_empty() {
            return Ok(batch);
        }
        if let Some(start) = &mut self.start {
            let mut next = Vec::new();
            for c in batch {
                next.extend(start.push(c)?);
            }
            batch = next;
        }
        match &mut self.window {
            Window::None => Ok(batch),
            Window::OrderOnly(ob) => {
                let mut out = Vec::new();
                for c in batch {
                    out.extend(ob.push(c)?);
                }
                Ok(out)
            }
            Window::Limited(limit) => {
                let mut out = Vec::new();
                for c in batch {
                    out.extend(limit.push(c)?);
                }
                Ok(out)
            }
        }
    }

    /// Every table whose mutations this pipeline cares about beyond its own
    /// root table: every RELATED child (and, for a two-hop relationship, its
    /// junction), and every EXISTS subquery's correlated table. The host
    /// application subscribes to each of these and calls
    /// [`Pipeline::push_table_change`] when one commits.
    pub fn dependent_tables(&self) -> Vec<String> {
        let mut out = Vec::new();
        for edge in &self.related {
            out.push(edge.relationship.child_table.clone());
            if let Some(j) = &edge.relationship.junction {
                out.push(j.table.clone());
            }
        }
        if let Some(stage) = &self.where_stage {
            collect_exists_tables(stage, &mut out);
        }
        out.sort();
        out.dedup();
        out
    }
}

fn collect_exists_tables(stage: &WhereStage, out: &mut Vec<String>) {
    match stage {
        WhereStage::Predicate(_) => {}
        WhereStage::And(stages) => {
            for s in stages {
                collect_exists_tables(s, out);
            }
        }
        WhereStage::Or(or) => {
            for branch in &or.branches {
                collect_exists_tables(branch, out);
            }
        }
        WhereStage::Exists(gate) => {
            out.push(gate.relationship.child_table.clone());
            if let Some(j) = &gate.relationship.junction {
                out.push(j.table.clone());
            }
        }
    }
}

/// What terminates the pipeline's root path: nothing (no LIMIT/ORDER BY
/// beyond the primary key `complete` always appends), an [`OrderBy`] alone,
/// or a [`Limit`] (which tracks its own order internally and supersedes a
/// plain `OrderBy`, per `crate::builder`'s compilation rule).
pub enum WindowSpec {
    None,
    OrderOnly(OrderBy),
    Limited(Limit),
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_core::Value;
    use zero_dataflow::ops::JoinMode;
    use zero_dataflow::{Constraint, RowSource};
    use zero_core::Cardinality;

    struct StaticSource(Vec<Row>);
    impl RowSource for StaticSource {
        fn fetch(&self, constraint: &Constraint) -> ZeroResult<Vec<Row>> {
            Ok(self.0.iter().filter(|r| constraint.matches(r)).cloned().collect())
        }
    }

    fn row(id: &str, price: i64) -> Row {
        Row::from_columns([
            ("id".to_string(), Value::String(id.to_string())),
            ("price".to_string(), Value::Int(price)),
        ])
    }

    #[test]
    fn pipeline_with_no_where_passes_rows_through() {
        let mut pipeline = Pipeline::new("item", None, vec![], None, WindowSpec::None);
        let out = pipeline
            .apply(Change::Add { row: row("a", 10), children: Default::default() })
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn pipeline_with_predicate_filters_root_rows() {
        let predicate = Filter::new(Box::new(|r: &Row| matches!(r.get("price"), Some(Value::Int(p)) if *p > 15)));
        let mut pipeline = Pipeline::new(
            "item",
            Some(WhereStage::Predicate(predicate)),
            vec![],
            None,
            WindowSpec::None,
        );
        let out = pipeline
            .apply(Change::Add { row: row("a", 10), children: Default::default() })
            .unwrap();
        assert!(out.is_empty());
        let out = pipeline
            .apply(Change::Add { row: row("b", 20), children: Default::default() })
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn related_child_mutation_routes_through_push_table_change() {
        let join = Join::new(
            "owner",
            vec![("ownerId".to_string(), "id".to_string())],
            Cardinality::One,
            vec!["id".to_string()],
            JoinMode::Normal,
            Box::new(StaticSource(vec![])),
        );
        let relationship = Relationship {
            name: "owner".into(),
            parent_table: "issue".into(),
            child_table: "user".into(),
            correlation: vec![("ownerId".to_string(), "id".to_string())],
            cardinality: Cardinality::One,
            junction: None,
        };
        let mut pipeline = Pipeline::new(
            "issue",
            None,
            vec![RelatedEdge { join, relationship }],
            None,
            WindowSpec::None,
        );
        let issue_row = Row::from_columns([
            ("id".to_string(), Value::String("i1".to_string())),
            ("ownerId".to_string(), Value::String("u1".to_string())),
        ]);
        pipeline
            .apply(Change::Add { row: issue_row, children: Default::default() })
            .unwrap();

        let user_edit = Change::Edit {
            old: Row::from_columns([
                ("id".to_string(), Value::String("u1".to_string())),
                ("name".to_string(), Value::String("Alice".to_string())),
            ]),
            new: Row::from_columns([
                ("id".to_string(), Value::String("u1".to_string())),
                ("name".to_string(), Value::String("Alicia".to_string())),
            ]),
        };
        let out = pipeline.push_table_change("user", &user_edit).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Change::Child { .. }));
    }

    #[test]
    fn dependent_tables_includes_related_children() {
        let join = Join::new(
            "owner",
            vec![("ownerId".to_string(), "id".to_string())],
            Cardinality::One,
            vec!["id".to_string()],
            JoinMode::Normal,
            Box::new(StaticSource(vec![])),
        );
        let relationship = Relationship {
            name: "owner".into(),
            parent_table: "issue".into(),
            child_table: "user".into(),
            correlation: vec![("ownerId".to_string(), "id".to_string())],
            cardinality: Cardinality::One,
            junction: None,
        };
        let pipeline = Pipeline::new(
            "issue",
            None,
            vec![RelatedEdge { join, relationship }],
            None,
            WindowSpec::None,
        );
        assert_eq!(pipeline.dependent_tables(), vec!["user".to_string()]);
    }
}
