//! Combined query identity (`spec.md` §4.6: "[the permission transform's]
//! hash fingerprint is included in CVR query identity"): a query registered
//! under the same AST but a different policy must land on a different CVR
//! row, since the rows it is permitted to see can differ.

use sha2::{Digest, Sha256};

use zero_ast::CompletedAst;
use zero_permissions::Policy;

/// `sha256(ast_hash || policy_fingerprint)`, hex-encoded — the key every
/// query is registered and persisted under in the CVR store.
pub fn query_hash(completed: &CompletedAst, policy: &Policy) -> String {
    let ast_hash = zero_ast::canonical_hash(completed);
    let policy_hash = zero_permissions::policy_fingerprint(policy);
    let mut hasher = Sha256::new();
    hasher.update(ast_hash.as_bytes());
    hasher.update(policy_hash.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use zero_ast::{complete, Ast};
    use zero_core::{ColumnKind, ColumnSpec, Schema, TableSpec};

    fn schema() -> Schema {
        let item = TableSpec {
            name: "item".into(),
            columns: vec![ColumnSpec { name: "id".into(), kind: ColumnKind::String }],
            primary_key: vec!["id".into()],
            unique_keys: vec![],
            zero_version_column: "_0_version".into(),
        };
        Schema { tables: [(item.name.clone(), item)].into_iter().collect(), relationships: vec![] }
    }

    #[test]
    fn different_policies_over_the_same_ast_hash_differently() {
        let schema = schema();
        let completed = complete(Ast::new("item"), &schema).unwrap();
        let open = Policy::default();
        let locked = Policy::default().with_table(
            "item",
            zero_permissions::TablePolicy::default()
                .allow(zero_permissions::PolicyAction::Select, zero_permissions::RuleExpr::Literal(false)),
        );
        assert_ne!(query_hash(&completed, &open), query_hash(&completed, &locked));
    }
}
