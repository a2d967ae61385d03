//! The [`CvrBackend`] trait ties the CVR store's operations (`spec.md`
//! §4.9) to a concrete durable implementation. [`PgCvrStore`] is the
//! production backend, backed by `sqlx::PgPool` with `FOR UPDATE`-style row
//! locking; [`super::memory::MemoryCvrStore`] is an in-process test double,
//! grounded on the same trait-plus-in-memory-fake shape the teacher corpus
//! uses for `readyset::consensus::{Authority, LocalAuthority}` in
//! `replicators/tests/tests.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use zero_core::errors::ZeroResult;

use super::model::{CvrInstance, DesireRecord, QueryRecord, RowRecord};

#[async_trait]
pub trait CvrBackend: Send + Sync {
    async fn load_instance(&self, client_group_id: &str) -> ZeroResult<Option<CvrInstance>>;
    async fn touch_instance(&self, client_group_id: &str, now: DateTime<Utc>) -> ZeroResult<()>;

    async fn upsert_query(&self, record: QueryRecord) -> ZeroResult<()>;
    async fn remove_query(&self, client_group_id: &str, query_hash: &str) -> ZeroResult<()>;
    async fn list_queries(&self, client_group_id: &str) -> ZeroResult<Vec<QueryRecord>>;

    async fn set_desire(&self, desire: DesireRecord) -> ZeroResult<()>;
    async fn remove_desire(&self, client_group_id: &str, client_id: &str, query_hash: &str) -> ZeroResult<()>;
    async fn remove_client(&self, client_group_id: &str, client_id: &str) -> ZeroResult<()>;
    async fn list_desires(&self, client_group_id: &str) -> ZeroResult<Vec<DesireRecord>>;

    async fn upsert_rows(&self, rows: Vec<RowRecord>) -> ZeroResult<()>;
    async fn remove_rows(&self, client_group_id: &str, keys: Vec<(String, String)>) -> ZeroResult<()>;
    async fn list_rows(&self, client_group_id: &str) -> ZeroResult<Vec<RowRecord>>;

    /// `SKIP LOCKED`-equivalent claim: `true` if this caller now holds the
    /// group's purge/persist lock, `false` if another actor already does
    /// (`spec.md` §4.9 "purger acquires locks with a `skip-locked`
    /// semantics so in-progress syncers exclude themselves").
    async fn try_lock_group(&self, client_group_id: &str) -> ZeroResult<bool>;
    async fn unlock_group(&self, client_group_id: &str) -> ZeroResult<()>;

    /// Client groups whose `lastActive` precedes `threshold`, up to `limit`,
    /// excluding any group currently locked by another actor.
    async fn purge_candidates(&self, threshold: DateTime<Utc>, limit: u64) -> ZeroResult<Vec<String>>;
    /// The total count of purge-eligible groups, unbounded by `limit` — the
    /// adaptive-pacing signal of `spec.md` §4.9.
    async fn purgeable_count(&self, threshold: DateTime<Utc>) -> ZeroResult<u64>;

    /// Deletes every record for `client_group_id`, bottom-up:
    /// `desires -> queries -> clients -> instances -> rows -> rowsVersion`
    /// (`spec.md` §4.9).
    async fn purge_group(&self, client_group_id: &str) -> ZeroResult<()>;
}

/// Production CVR backend. Runtime-built `sqlx::query`/`query_as` calls
/// rather than the compile-time `query!` macro, matching the enrichment
/// pack's `ouroboros-postgres` connection/transaction modules (no
/// `DATABASE_URL` is available to check queries against at build time for
/// either codebase).
pub struct PgCvrStore {
    pool: sqlx::PgPool,
}

impl PgCvrStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        PgCvrStore { pool }
    }
}

#[async_trait]
impl CvrBackend for PgCvrStore {
    async fn load_instance(&self, client_group_id: &str) -> ZeroResult<Option<CvrInstance>> {
        let row: Option<(String, DateTime<Utc>, String)> = sqlx::query_as(
            "SELECT client_group_id, last_active, rows_version FROM instances WHERE client_group_id = $1",
        )
        .bind(client_group_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(row.map(|(client_group_id, last_active, rows_version)| CvrInstance {
            client_group_id,
            last_active,
            rows_version: zero_core::ReplicaVersion::new(rows_version),
        }))
    }

    async fn touch_instance(&self, client_group_id: &str, now: DateTime<Utc>) -> ZeroResult<()> {
        sqlx::query(
            "INSERT INTO instances (client_group_id, last_active, rows_version) VALUES ($1, $2, '')
             ON CONFLICT (client_group_id) DO UPDATE SET last_active = EXCLUDED.last_active",
        )
        .bind(client_group_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn upsert_query(&self, record: QueryRecord) -> ZeroResult<()> {
        sqlx::query(
            "INSERT INTO queries (client_group_id, query_hash, ast_json, ttl_ms, last_use)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (client_group_id, query_hash)
             DO UPDATE SET ttl_ms = EXCLUDED.ttl_ms, last_use = EXCLUDED.last_use",
        )
        .bind(&record.client_group_id)
        .bind(&record.query_hash)
        .bind(&record.ast_json)
        .bind(record.ttl_ms as i64)
        .bind(record.last_use)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn remove_query(&self, client_group_id: &str, query_hash: &str) -> ZeroResult<()> {
        sqlx::query("DELETE FROM queries WHERE client_group_id = $1 AND query_hash = $2")
            .bind(client_group_id)
            .bind(query_hash)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    async fn list_queries(&self, client_group_id: &str) -> ZeroResult<Vec<QueryRecord>> {
        let rows: Vec<(String, String, String, i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT client_group_id, query_hash, ast_json, ttl_ms, last_use FROM queries WHERE client_group_id = $1",
        )
        .bind(client_group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(rows
            .into_iter()
            .map(|(client_group_id, query_hash, ast_json, ttl_ms, last_use)| QueryRecord {
                client_group_id,
                query_hash,
                ast_json,
                ttl_ms: ttl_ms as u64,
                last_use,
            })
            .collect())
    }

    async fn set_desire(&self, desire: DesireRecord) -> ZeroResult<()> {
        sqlx::query(
            "INSERT INTO desires (client_group_id, client_id, query_hash) VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING",
        )
        .bind(&desire.client_group_id)
        .bind(&desire.client_id)
        .bind(&desire.query_hash)
        .execute(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(())
    }

    async fn remove_desire(&self, client_group_id: &str, client_id: &str, query_hash: &str) -> ZeroResult<()> {
        sqlx::query("DELETE FROM desires WHERE client_group_id = $1 AND client_id = $2 AND query_hash = $3")
            .bind(client_group_id)
            .bind(client_id)
            .bind(query_hash)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    async fn remove_client(&self, client_group_id: &str, client_id: &str) -> ZeroResult<()> {
        sqlx::query("DELETE FROM desires WHERE client_group_id = $1 AND client_id = $2")
            .bind(client_group_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        sqlx::query("DELETE FROM clients WHERE client_group_id = $1 AND client_id = $2")
            .bind(client_group_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    async fn list_desires(&self, client_group_id: &str) -> ZeroResult<Vec<DesireRecord>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT client_group_id, client_id, query_hash FROM desires WHERE client_group_id = $1")
                .bind(client_group_id)
                .fetch_all(&self.pool)
                .await
                .map_err(pg_err)?;
        Ok(rows
            .into_iter()
            .map(|(client_group_id, client_id, query_hash)| DesireRecord { client_group_id, client_id, query_hash })
            .collect())
    }

    async fn upsert_rows(&self, rows: Vec<RowRecord>) -> ZeroResult<()> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        for row in rows {
            sqlx::query(
                "INSERT INTO rows (client_group_id, table_name, row_key, version) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (client_group_id, table_name, row_key) DO UPDATE SET version = EXCLUDED.version",
            )
            .bind(&row.client_group_id)
            .bind(&row.table)
            .bind(&row.row_key)
            .bind(row.version.as_str())
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
        }
        tx.commit().await.map_err(pg_err)?;
        Ok(())
    }

    async fn remove_rows(&self, client_group_id: &str, keys: Vec<(String, String)>) -> ZeroResult<()> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        for (table, row_key) in keys {
            sqlx::query("DELETE FROM rows WHERE client_group_id = $1 AND table_name = $2 AND row_key = $3")
                .bind(client_group_id)
                .bind(&table)
                .bind(&row_key)
                .execute(&mut *tx)
                .await
                .map_err(pg_err)?;
        }
        tx.commit().await.map_err(pg_err)?;
        Ok(())
    }

    async fn list_rows(&self, client_group_id: &str) -> ZeroResult<Vec<RowRecord>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT client_group_id, table_name, row_key, version FROM rows WHERE client_group_id = $1",
        )
        .bind(client_group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(rows
            .into_iter()
            .map(|(client_group_id, table, row_key, version)| RowRecord {
                client_group_id,
                table,
                row_key,
                version: zero_core::ReplicaVersion::new(version),
            })
            .collect())
    }

    async fn try_lock_group(&self, client_group_id: &str) -> ZeroResult<bool> {
        let (locked,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(client_group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(locked)
    }

    async fn unlock_group(&self, client_group_id: &str) -> ZeroResult<()> {
        sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(client_group_id)
            .execute(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(())
    }

    async fn purge_candidates(&self, threshold: DateTime<Utc>, limit: u64) -> ZeroResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT client_group_id FROM instances WHERE last_active < $1
             ORDER BY last_active ASC LIMIT $2
             FOR UPDATE SKIP LOCKED",
        )
        .bind(threshold)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(pg_err)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn purgeable_count(&self, threshold: DateTime<Utc>) -> ZeroResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM instances WHERE last_active < $1")
            .bind(threshold)
            .fetch_one(&self.pool)
            .await
            .map_err(pg_err)?;
        Ok(count as u64)
    }

    async fn purge_group(&self, client_group_id: &str) -> ZeroResult<()> {
        let mut tx = self.pool.begin().await.map_err(pg_err)?;
        for table in ["desires", "queries", "clients", "rows"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE client_group_id = $1"))
                .bind(client_group_id)
                .execute(&mut *tx)
                .await
                .map_err(pg_err)?;
        }
        sqlx::query("DELETE FROM instances WHERE client_group_id = $1")
            .bind(client_group_id)
            .execute(&mut *tx)
            .await
            .map_err(pg_err)?;
        tx.commit().await.map_err(pg_err)?;
        Ok(())
    }
}

fn pg_err(e: sqlx::Error) -> zero_core::ZeroError {
    zero_core::ZeroError::Io(e.to_string())
}
