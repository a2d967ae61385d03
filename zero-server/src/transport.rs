//! External collaborators of the view-syncer (`spec.md` §1): token
//! verification and the wire transport itself are owned by the host
//! application, not this crate. These traits fix the boundary a
//! [`crate::syncer::ViewSyncer`] calls through.

use zero_permissions::AuthClaims;

/// Resolves an opaque bearer token into decoded [`AuthClaims`]. A real
/// implementation validates a JWT against a JWK set or shared secret
/// (`spec.md` §6 "Config surface" `auth: {jwk?, jwksUrl?, secret?}`); this
/// crate only needs the result.
pub trait AuthVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthClaims, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError(pub String);

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "auth verification failed: {}", self.0)
    }
}

impl std::error::Error for AuthError {}

/// An [`AuthVerifier`] that treats the token as already-decoded JSON claims.
/// Useful for tests and for deployments that terminate auth upstream of this
/// process.
pub struct PassthroughVerifier;

impl AuthVerifier for PassthroughVerifier {
    fn verify(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let value: serde_json::Value =
            serde_json::from_str(token).map_err(|e| AuthError(e.to_string()))?;
        Ok(AuthClaims::new(value))
    }
}
