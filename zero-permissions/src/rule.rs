//! Permission rule templates (`spec.md` §4.6): "a condition template
//! referencing auth variables", stored per table per action.

use std::collections::HashMap;

use zero_ast::CompareOp;
use zero_core::Value;

/// One side of a rule comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A column of the row the rule is being checked against.
    Column(String),
    /// A path into the auth claims (`spec.md` §4.6 "auth variables").
    Claim(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    And(Vec<RuleExpr>),
    Or(Vec<RuleExpr>),
    Not(Box<RuleExpr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// Always allow / always deny, for rules that don't need to inspect
    /// anything (`spec.md` §8 property 8's "permits all"/"denies all").
    Literal(bool),
}

impl RuleExpr {
    pub fn allow_if_owner(column: impl Into<String>, claim: impl Into<String>) -> RuleExpr {
        RuleExpr::Compare {
            left: Operand::Column(column.into()),
            op: CompareOp::Eq,
            right: Operand::Claim(claim.into()),
        }
    }
}

/// The five policy actions of `spec.md` §4.6: "select/insert/update-pre/
/// update-post/delete".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyAction {
    Select,
    Insert,
    UpdatePre,
    UpdatePost,
    Delete,
}

/// The set of allow rules for one table, keyed by action. A row/query is
/// permitted for an action if *any* rule for that action matches (the rules
/// are implicitly OR'd, `spec.md` §4.6).
#[derive(Debug, Clone, Default)]
pub struct TablePolicy {
    pub rules: HashMap<PolicyAction, Vec<RuleExpr>>,
}

impl TablePolicy {
    pub fn allow(mut self, action: PolicyAction, rule: RuleExpr) -> Self {
        self.rules.entry(action).or_default().push(rule);
        self
    }

    pub fn rules_for(&self, action: PolicyAction) -> &[RuleExpr] {
        self.rules.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The full per-table policy set (`spec.md` §4.6 "Inputs: ... per-table
/// policy").
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub tables: HashMap<String, TablePolicy>,
}

impl Policy {
    pub fn with_table(mut self, table: impl Into<String>, policy: TablePolicy) -> Self {
        self.tables.insert(table.into(), policy);
        self
    }

    /// A table absent from the policy set has no rules for any action, which
    /// — being an empty OR — denies by default. This is a deliberate
    /// fail-closed choice (`spec.md` §9 would otherwise leave this an open
    /// question); see `DESIGN.md`.
    pub fn rules_for<'a>(&'a self, table: &str, action: PolicyAction) -> &'a [RuleExpr] {
        self.tables
            .get(table)
            .map(|t| t.rules_for(action))
            .unwrap_or(&[])
    }
}
