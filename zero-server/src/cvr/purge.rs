//! The adaptive purger (`spec.md` §4.9): periodically sweeps client groups
//! whose `lastActive` watermark has fallen behind `ttl`, skipping any group
//! currently locked by a live syncer, and cascades the delete through
//! `desires -> queries -> clients -> instances -> rows -> rowsVersion`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use zero_core::errors::ZeroResult;

use super::backend::CvrBackend;
use super::pacing::PurgePacing;

pub struct PurgeConfig {
    pub ttl: Duration,
    pub initial_batch_size: u64,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        PurgeConfig {
            ttl: Duration::from_secs(7 * 24 * 3600),
            initial_batch_size: 50,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(300),
        }
    }
}

/// One purge round against a `lastActive < threshold` cutoff: claim up to
/// `pacing.batch_size()` eligible groups (skipping locked ones), purge each,
/// and report how many remain eligible so the caller can
/// [`PurgePacing::adapt`] before the next round.
pub async fn purge_round(
    backend: &dyn CvrBackend,
    pacing: &PurgePacing,
    threshold: chrono::DateTime<Utc>,
) -> ZeroResult<u64> {
    if pacing.disabled() {
        return Ok(0);
    }
    let candidates = backend.purge_candidates(threshold, pacing.batch_size()).await?;
    for client_group_id in &candidates {
        if !backend.try_lock_group(client_group_id).await? {
            continue;
        }
        let rows = backend.list_rows(client_group_id).await.unwrap_or_default().len() as u64;
        let result = backend.purge_group(client_group_id).await;
        backend.unlock_group(client_group_id).await?;
        match result {
            Ok(()) => {
                debug!(client_group_id, "purged expired cvr");
                zero_metrics::record_cvr_purge_round(rows, 1);
            }
            Err(err) => warn!(client_group_id, %err, "failed to purge cvr"),
        }
    }
    backend.purgeable_count(threshold).await
}

/// Runs [`purge_round`] forever, sleeping [`PurgePacing::interval`] between
/// rounds, with the threshold recomputed as `now - ttl` each time.
pub async fn run_purge_loop(backend: Arc<dyn CvrBackend>, config: PurgeConfig) {
    let mut pacing = PurgePacing::new(config.initial_batch_size, config.initial_interval, config.max_interval);
    if pacing.disabled() {
        info!("cvr purger disabled (initialBatchSize = 0)");
    }
    loop {
        let threshold = Utc::now() - chrono::Duration::from_std(config.ttl).unwrap_or_default();
        let outcome = purge_round(backend.as_ref(), &pacing, threshold).await;
        match outcome {
            Ok(remaining) => pacing.adapt(remaining),
            Err(err) => {
                warn!(%err, "cvr purge round failed");
                pacing.adapt(1);
            }
        }
        zero_metrics::record_cvr_purge_pacing(pacing.batch_size(), pacing.interval().as_millis() as u64);
        tokio::time::sleep(pacing.interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cvr::memory::MemoryCvrStore;

    #[tokio::test]
    async fn purge_round_removes_only_expired_unlocked_groups() {
        let store = MemoryCvrStore::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        let fresh = Utc::now();
        store.touch_instance("stale", old).await.unwrap();
        store.touch_instance("active", fresh).await.unwrap();

        let pacing = PurgePacing::new(10, Duration::from_secs(1), Duration::from_secs(60));
        let remaining = purge_round(&store, &pacing, Utc::now()).await.unwrap();

        assert_eq!(remaining, 0);
        assert!(store.load_instance("stale").await.unwrap().is_none());
        assert!(store.load_instance("active").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn disabled_pacing_never_purges() {
        let store = MemoryCvrStore::new();
        store.touch_instance("stale", Utc::now() - chrono::Duration::hours(2)).await.unwrap();
        let pacing = PurgePacing::new(0, Duration::from_secs(1), Duration::from_secs(60));

        let remaining = purge_round(&store, &pacing, Utc::now()).await.unwrap();

        assert_eq!(remaining, 0);
        assert!(store.load_instance("stale").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn locked_group_is_skipped_and_still_reported_remaining() {
        let store = MemoryCvrStore::new();
        let old = Utc::now() - chrono::Duration::hours(2);
        store.touch_instance("held", old).await.unwrap();
        store.try_lock_group("held").await.unwrap();

        let pacing = PurgePacing::new(10, Duration::from_secs(1), Duration::from_secs(60));
        let remaining = purge_round(&store, &pacing, Utc::now()).await.unwrap();

        assert_eq!(remaining, 1);
        assert!(store.load_instance("held").await.unwrap().is_some());
    }
}
