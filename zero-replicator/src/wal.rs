//! The `_zero_runtime_events` log (`spec.md` §6 "Persisted state: Replica")
//! and startup WAL replay (`spec.md` §4.7 guarantee (iii): "on startup, any
//! in-flight WAL is replayed before serving").

use chrono::{DateTime, Utc};

use zero_core::ReplicaVersion;

use crate::transaction::ReplicationTransaction;

/// One entry of the ordered, timestamped runtime-events log: a committed
/// transaction as it was durably recorded, independent of whether every
/// table store it touches has itself been checkpointed yet.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub recorded_at: DateTime<Utc>,
    pub transaction: ReplicationTransaction,
}

/// An append-only, version-ordered log of committed transactions. In a real
/// deployment this is backed by the replica file (`spec.md` §6); here it is
/// the in-process record a [`crate::Replicator`] appends to on every commit
/// and replays from on startup.
#[derive(Debug, Default)]
pub struct RuntimeEventLog {
    entries: Vec<RuntimeEvent>,
}

impl RuntimeEventLog {
    pub fn new() -> Self {
        RuntimeEventLog::default()
    }

    pub fn append(&mut self, entry: RuntimeEvent) {
        self.entries.push(entry);
    }

    /// Every entry whose version is strictly newer than `checkpoint`, in
    /// commit order — the set a fresh replicator run must replay before
    /// opening its subscriber channel, per `spec.md` §4.7 guarantee (iii).
    pub fn entries_after(&self, checkpoint: &ReplicaVersion) -> impl Iterator<Item = &RuntimeEvent> {
        self.entries.iter().filter(move |e| &e.transaction.version > checkpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Mutation;
    use zero_core::{Row, Value};

    fn tx(version: &str) -> ReplicationTransaction {
        ReplicationTransaction::new(
            ReplicaVersion::new(version),
            vec![Mutation::Add {
                table: "item".into(),
                row: Row::from_columns([("id".to_string(), Value::String("a".into()))]),
            }],
        )
    }

    #[test]
    fn entries_after_excludes_the_checkpoint_itself() {
        let mut log = RuntimeEventLog::new();
        log.append(RuntimeEvent { recorded_at: Utc::now(), transaction: tx("1") });
        log.append(RuntimeEvent { recorded_at: Utc::now(), transaction: tx("2") });
        log.append(RuntimeEvent { recorded_at: Utc::now(), transaction: tx("3") });

        let replay: Vec<_> = log.entries_after(&ReplicaVersion::new("1")).collect();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].transaction.version, ReplicaVersion::new("2"));
    }
}
