//! The error taxonomy of `spec.md` §7, shared by every crate in the
//! workspace.

use thiserror::Error;

/// The result type returned by essentially every fallible operation in this
/// workspace.
pub type ZeroResult<T> = Result<T, ZeroError>;

#[derive(Debug, Error)]
pub enum ZeroError {
    /// Pushing an `add` whose primary key already exists in the table
    /// (`spec.md` §4.1).
    #[error("primary key violation on table {table}: key {key} already exists")]
    PrimaryKeyViolation { table: String, key: String },

    /// `remove`/`edit` of an absent key (`spec.md` §4.1).
    #[error("row not found in table {table}: key {key}")]
    NotFound { table: String, key: String },

    /// A value's kind doesn't match the column's declared kind (`spec.md`
    /// §4.1).
    #[error("schema mismatch on {table}.{column}: expected {expected}, got {actual}")]
    SchemaMismatch {
        table: String,
        column: String,
        expected: String,
        actual: String,
    },

    /// An internal bug: a codepath that should be unreachable given the
    /// invariants this workspace maintains. Aborts the enclosing batch and
    /// transitions the owning view to `error`, per `spec.md` §7.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    /// A permission rule rejected the current auth for this row/query.
    /// Never fatal: surfaced as a (possibly empty) completed result,
    /// `spec.md` §7.
    #[error("permission denied")]
    PermissionDenied,

    /// Replication observed a change incompatible with the current schema.
    #[error("schema drift detected, replica reset required: {0}")]
    SchemaDrift(String),

    /// A hydration or suspension point exceeded its deadline. Surfaced as
    /// `unknown` persisting, never silently dropped (`spec.md` §7).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// A feature this workspace deliberately does not implement (e.g. LIMIT
    /// inside a junction subquery, NOT EXISTS at the client level).
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Retryable or fatal I/O (including database) errors, per `spec.md` §7.
    #[error("io error: {0}")]
    Io(String),
}

impl ZeroError {
    pub fn internal(msg: impl Into<String>) -> Self {
        ZeroError::Invariant(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        ZeroError::Unsupported(msg.into())
    }

    /// Whether this error class should be retried with backoff rather than
    /// treated as immediately fatal (`spec.md` §7 "IO").
    pub fn is_retryable(&self) -> bool {
        matches!(self, ZeroError::Io(_) | ZeroError::Timeout(_))
    }
}

/// Construct an [`ZeroError::Invariant`]. Named to match the teacher corpus's
/// `internal_err` helper (used as `.ok_or_else(|| internal_err("..."))`).
pub fn internal_err(msg: impl Into<String>) -> ZeroError {
    ZeroError::internal(msg)
}

/// Return early with an [`ZeroError::Invariant`].
#[macro_export]
macro_rules! internal {
    ($($arg:tt)*) => {
        return Err($crate::errors::internal_err(format!($($arg)*)))
    };
}

/// Assert a condition, returning an [`ZeroError::Invariant`] if it does not
/// hold, instead of panicking. Mirrors the teacher corpus's `invariant!`
/// macro used throughout the SQL rewrite passes.
#[macro_export]
macro_rules! invariant {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::errors::internal_err(format!(
                "invariant violated: {}",
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err($crate::errors::internal_err(format!($($arg)*)));
        }
    };
}

/// Return early with an [`ZeroError::Unsupported`].
#[macro_export]
macro_rules! unsupported {
    ($($arg:tt)*) => {
        return Err($crate::errors::ZeroError::unsupported(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(x: i32) -> ZeroResult<i32> {
        invariant!(x >= 0, "x must be non-negative, got {x}");
        Ok(x)
    }

    #[test]
    fn invariant_macro_returns_err_on_false() {
        assert!(check(-1).is_err());
        assert!(check(1).is_ok());
    }

    #[test]
    fn io_and_timeout_are_retryable() {
        assert!(ZeroError::Io("x".into()).is_retryable());
        assert!(ZeroError::Timeout("x".into()).is_retryable());
        assert!(!ZeroError::PermissionDenied.is_retryable());
    }
}
