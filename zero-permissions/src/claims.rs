//! Auth claims: the variables permission rule templates resolve against
//! (`spec.md` §4.6).

use zero_core::Value;

/// The decoded claims of an auth token, represented generically as JSON so
/// rule templates can reference arbitrarily nested paths (`userId`,
/// `org.role`, ...). Verifying/decoding the token itself is an external
/// collaborator's job (`spec.md` §1); this type only holds the already-
/// decoded result.
#[derive(Debug, Clone, Default)]
pub struct AuthClaims(serde_json::Value);

impl AuthClaims {
    pub fn new(claims: serde_json::Value) -> Self {
        AuthClaims(claims)
    }

    pub fn anonymous() -> Self {
        AuthClaims(serde_json::Value::Null)
    }

    /// Resolves a dot-separated path against the claims document. Unknown
    /// paths resolve to [`Value::Null`] rather than erroring (`spec.md` §4.6:
    /// "unknown claim paths compare as NULL").
    pub fn get_path(&self, path: &str) -> Value {
        let mut current = &self.0;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(v) => current = v,
                None => return Value::Null,
            }
        }
        json_to_value(current)
    }
}

fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::Json(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let claims = AuthClaims::new(json!({"userId": "u1", "org": {"role": "admin"}}));
        assert_eq!(claims.get_path("userId"), Value::String("u1".into()));
        assert_eq!(claims.get_path("org.role"), Value::String("admin".into()));
    }

    #[test]
    fn unknown_path_resolves_to_null() {
        let claims = AuthClaims::new(json!({"userId": "u1"}));
        assert_eq!(claims.get_path("nope"), Value::Null);
        assert_eq!(claims.get_path("org.role"), Value::Null);
    }
}
