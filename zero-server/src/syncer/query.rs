//! A single registered query's state machine and the live pipeline/view pair
//! it owns (`spec.md` §4.8 "State machine per query").

use std::collections::HashSet;

use zero_ast::CompletedAst;
use zero_core::errors::ZeroResult;
use zero_core::Schema;

use zero_dataflow::{Change, Constraint, RowSource, Singularity, View};
use zero_pipeline::{build_pipeline, BuildContext, Pipeline};

/// `spec.md` §4.8: `Registered -> Hydrating -> Complete -> (Idle after TTL)
/// -> Purged`. Errors from permission transform or source fetch transition
/// to `Error(cause)` without purging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Registered,
    Hydrating,
    Complete,
    Idle,
    Purged,
    Error(String),
}

/// One client group's view of one query: the compiled pipeline driving
/// incremental updates, the materialized [`View`] a CVR diff is computed
/// from, and the set of clients that currently desire it.
pub struct QueryHandle {
    pub query_hash: String,
    pub ast_json: String,
    pub table: String,
    pub dependent_tables: Vec<String>,
    pub state: QueryState,
    pub ttl_ms: u64,
    pub desired_by: HashSet<String>,
    pipeline: Pipeline,
    view: View,
}

impl QueryHandle {
    pub fn new(
        query_hash: String,
        ast_json: String,
        completed: &CompletedAst,
        schema: &Schema,
        ctx: &BuildContext,
        ttl_ms: u64,
    ) -> ZeroResult<Self> {
        let plan = zero_pipeline::build_plan(completed, schema)?;
        let pipeline = build_pipeline(&plan, ctx)?;
        let table_spec = schema.table(&plan.table)?;
        let singularity = if plan.limit == Some(1) { Singularity::Singular } else { Singularity::Sequence };
        let order = zero_pipeline::order_directions(&plan.order_by);
        let view = View::new(
            singularity,
            table_spec.primary_key.clone(),
            table_spec.zero_version_column.clone(),
            order,
        );
        Ok(QueryHandle {
            query_hash,
            ast_json,
            table: plan.table.clone(),
            dependent_tables: pipeline.dependent_tables(),
            state: QueryState::Registered,
            ttl_ms,
            desired_by: HashSet::new(),
            pipeline,
            view,
        })
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Pulls every row currently in the root table through the pipeline and
    /// applies the resulting changes to the view, then marks the root stream
    /// complete (`spec.md` §4.8 "Registered -> Hydrating -> Complete").
    pub fn hydrate(&mut self, source: &dyn RowSource) -> ZeroResult<()> {
        self.state = QueryState::Hydrating;
        let rows = source.fetch(&Constraint::none())?;
        for row in rows {
            let out = self.pipeline.apply(Change::Add { row, children: Default::default() })?;
            for change in out {
                self.view.apply(change)?;
            }
        }
        let out = self.pipeline.apply(Change::OutputComplete)?;
        for change in out {
            self.view.apply(change)?;
        }
        self.view.apply(Change::OutputComplete)?;
        self.state = QueryState::Complete;
        Ok(())
    }

    /// Advances the pipeline with a root-table mutation, applying the
    /// resulting changes to the view and returning them for CVR-delta/poke
    /// computation.
    pub fn advance_root(&mut self, change: Change) -> ZeroResult<Vec<Change>> {
        let out = self.pipeline.apply(change)?;
        for c in out.clone() {
            self.view.apply(c)?;
        }
        Ok(out)
    }

    /// Routes a dependent-table mutation (a RELATED child, junction, or
    /// EXISTS-correlated table) to the pipeline.
    pub fn advance_dependent(&mut self, table: &str, change: &Change) -> ZeroResult<Vec<Change>> {
        let out = self.pipeline.push_table_change(table, change)?;
        for c in out.clone() {
            self.view.apply(c)?;
        }
        Ok(out)
    }

    pub fn transition_to_error(&mut self, cause: zero_core::ZeroError) {
        self.state = QueryState::Error(cause.to_string());
        self.view.transition_to_error(cause);
    }

    pub fn idle(&mut self) {
        if self.state == QueryState::Complete {
            self.state = QueryState::Idle;
        }
    }
}
