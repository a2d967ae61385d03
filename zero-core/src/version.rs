//! Replica versions: the opaque, lexicographically-ordered token stamped on
//! every committed change batch (`spec.md` §3).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque, monotonically non-decreasing token. Versions are compared
/// byte-wise (lexicographic on the underlying string), never parsed or
/// interpreted — any totally-ordered encoding upstream cares to use (LSNs
/// zero-padded into a fixed-width string, Postgres `pg_lsn` text form, etc.)
/// works as long as lexicographic order matches intended order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaVersion(String);

impl ReplicaVersion {
    pub fn new(token: impl Into<String>) -> Self {
        ReplicaVersion(token.into())
    }

    /// The all-zero sentinel version used before any transaction has ever
    /// committed.
    pub fn zero() -> Self {
        ReplicaVersion(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an error-free bool; versions must never decrease, so callers
    /// at the write path (`zero-replicator`) should check this before
    /// committing and treat a failure as `SchemaDrift`/`Invariant`.
    pub fn is_advance_from(&self, previous: &ReplicaVersion) -> bool {
        self > previous
    }
}

impl PartialOrd for ReplicaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReplicaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Display for ReplicaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_lexicographically() {
        let a = ReplicaVersion::new("0000000010");
        let b = ReplicaVersion::new("0000000020");
        assert!(a < b);
        assert!(b.is_advance_from(&a));
        assert!(!a.is_advance_from(&b));
    }

    #[test]
    fn zero_is_smaller_than_any_nonempty_version() {
        assert!(ReplicaVersion::zero() < ReplicaVersion::new("0"));
    }
}
