//! An in-process [`CvrBackend`] with no database underneath it, grounded on
//! the teacher corpus's `LocalAuthority`/`LocalAuthorityStore` pattern
//! (`replicators/tests/tests.rs`): a plain `Mutex`-guarded in-memory
//! structure standing in for an external, trait-abstracted store so tests
//! can exercise the syncer and the purger without a live Postgres instance.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use zero_core::errors::ZeroResult;
use zero_core::ReplicaVersion;

use super::backend::CvrBackend;
use super::model::{CvrInstance, DesireRecord, QueryRecord, RowRecord};

#[derive(Default)]
struct Inner {
    instances: HashMap<String, CvrInstance>,
    queries: HashMap<String, HashMap<String, QueryRecord>>,
    desires: HashMap<String, HashSet<DesireRecord>>,
    rows: HashMap<String, HashMap<(String, String), RowRecord>>,
    locks: HashSet<String>,
}

/// A DB-free stand-in for [`super::backend::PgCvrStore`]. Locking is a plain
/// in-process set rather than an advisory Postgres lock, but it gives the
/// same externally-observable contract: `try_lock_group` is exclusive, and
/// `purge_candidates` never returns a group some other caller holds.
#[derive(Default)]
pub struct MemoryCvrStore {
    inner: Mutex<Inner>,
}

impl MemoryCvrStore {
    pub fn new() -> Self {
        MemoryCvrStore::default()
    }
}

#[async_trait]
impl CvrBackend for MemoryCvrStore {
    async fn load_instance(&self, client_group_id: &str) -> ZeroResult<Option<CvrInstance>> {
        Ok(self.inner.lock().instances.get(client_group_id).cloned())
    }

    async fn touch_instance(&self, client_group_id: &str, now: DateTime<Utc>) -> ZeroResult<()> {
        let mut inner = self.inner.lock();
        inner
            .instances
            .entry(client_group_id.to_string())
            .and_modify(|i| i.last_active = now)
            .or_insert_with(|| CvrInstance {
                client_group_id: client_group_id.to_string(),
                last_active: now,
                rows_version: ReplicaVersion::zero(),
            });
        Ok(())
    }

    async fn upsert_query(&self, record: QueryRecord) -> ZeroResult<()> {
        self.inner
            .lock()
            .queries
            .entry(record.client_group_id.clone())
            .or_default()
            .insert(record.query_hash.clone(), record);
        Ok(())
    }

    async fn remove_query(&self, client_group_id: &str, query_hash: &str) -> ZeroResult<()> {
        if let Some(group) = self.inner.lock().queries.get_mut(client_group_id) {
            group.remove(query_hash);
        }
        Ok(())
    }

    async fn list_queries(&self, client_group_id: &str) -> ZeroResult<Vec<QueryRecord>> {
        Ok(self
            .inner
            .lock()
            .queries
            .get(client_group_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_desire(&self, desire: DesireRecord) -> ZeroResult<()> {
        self.inner
            .lock()
            .desires
            .entry(desire.client_group_id.clone())
            .or_default()
            .insert(desire);
        Ok(())
    }

    async fn remove_desire(&self, client_group_id: &str, client_id: &str, query_hash: &str) -> ZeroResult<()> {
        if let Some(group) = self.inner.lock().desires.get_mut(client_group_id) {
            group.retain(|d| !(d.client_id == client_id && d.query_hash == query_hash));
        }
        Ok(())
    }

    async fn remove_client(&self, client_group_id: &str, client_id: &str) -> ZeroResult<()> {
        if let Some(group) = self.inner.lock().desires.get_mut(client_group_id) {
            group.retain(|d| d.client_id != client_id);
        }
        Ok(())
    }

    async fn list_desires(&self, client_group_id: &str) -> ZeroResult<Vec<DesireRecord>> {
        Ok(self
            .inner
            .lock()
            .desires
            .get(client_group_id)
            .map(|group| group.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn upsert_rows(&self, rows: Vec<RowRecord>) -> ZeroResult<()> {
        let mut inner = self.inner.lock();
        for row in rows {
            inner
                .rows
                .entry(row.client_group_id.clone())
                .or_default()
                .insert((row.table.clone(), row.row_key.clone()), row);
        }
        Ok(())
    }

    async fn remove_rows(&self, client_group_id: &str, keys: Vec<(String, String)>) -> ZeroResult<()> {
        if let Some(group) = self.inner.lock().rows.get_mut(client_group_id) {
            for key in keys {
                group.remove(&key);
            }
        }
        Ok(())
    }

    async fn list_rows(&self, client_group_id: &str) -> ZeroResult<Vec<RowRecord>> {
        Ok(self
            .inner
            .lock()
            .rows
            .get(client_group_id)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn try_lock_group(&self, client_group_id: &str) -> ZeroResult<bool> {
        Ok(self.inner.lock().locks.insert(client_group_id.to_string()))
    }

    async fn unlock_group(&self, client_group_id: &str) -> ZeroResult<()> {
        self.inner.lock().locks.remove(client_group_id);
        Ok(())
    }

    async fn purge_candidates(&self, threshold: DateTime<Utc>, limit: u64) -> ZeroResult<Vec<String>> {
        let inner = self.inner.lock();
        let mut candidates: Vec<&CvrInstance> = inner
            .instances
            .values()
            .filter(|i| i.last_active < threshold && !inner.locks.contains(&i.client_group_id))
            .collect();
        candidates.sort_by_key(|i| i.last_active);
        Ok(candidates.into_iter().take(limit as usize).map(|i| i.client_group_id.clone()).collect())
    }

    async fn purgeable_count(&self, threshold: DateTime<Utc>) -> ZeroResult<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .instances
            .values()
            .filter(|i| i.last_active < threshold && !inner.locks.contains(&i.client_group_id))
            .count() as u64)
    }

    async fn purge_group(&self, client_group_id: &str) -> ZeroResult<()> {
        let mut inner = self.inner.lock();
        inner.desires.remove(client_group_id);
        inner.queries.remove(client_group_id);
        inner.rows.remove(client_group_id);
        inner.instances.remove(client_group_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn purge_candidates_excludes_locked_groups() {
        let store = MemoryCvrStore::new();
        let old = Utc::now() - chrono::Duration::hours(1);
        store.touch_instance("g1", old).await.unwrap();
        store.touch_instance("g2", old).await.unwrap();
        store.try_lock_group("g1").await.unwrap();

        let threshold = Utc::now();
        let candidates = store.purge_candidates(threshold, 10).await.unwrap();
        assert_eq!(candidates, vec!["g2".to_string()]);
    }

    #[tokio::test]
    async fn purge_group_cascades_every_table() {
        let store = MemoryCvrStore::new();
        let now = Utc::now();
        store.touch_instance("g1", now).await.unwrap();
        store
            .upsert_query(QueryRecord {
                client_group_id: "g1".into(),
                query_hash: "h1".into(),
                ast_json: "{}".into(),
                ttl_ms: 1000,
                last_use: now,
            })
            .await
            .unwrap();
        store
            .set_desire(DesireRecord { client_group_id: "g1".into(), client_id: "c1".into(), query_hash: "h1".into() })
            .await
            .unwrap();
        store
            .upsert_rows(vec![RowRecord {
                client_group_id: "g1".into(),
                table: "issue".into(),
                row_key: "1".into(),
                version: ReplicaVersion::new("1"),
            }])
            .await
            .unwrap();

        store.purge_group("g1").await.unwrap();

        assert!(store.load_instance("g1").await.unwrap().is_none());
        assert!(store.list_queries("g1").await.unwrap().is_empty());
        assert!(store.list_desires("g1").await.unwrap().is_empty());
        assert!(store.list_rows("g1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn try_lock_group_is_exclusive() {
        let store = MemoryCvrStore::new();
        assert!(store.try_lock_group("g1").await.unwrap());
        assert!(!store.try_lock_group("g1").await.unwrap());
        store.unlock_group("g1").await.unwrap();
        assert!(store.try_lock_group("g1").await.unwrap());
    }
}
