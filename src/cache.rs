//! Time-bounded result cache wrapped around [`crate::pipeline::reconcile`].
//!
//! Entries are keyed by the identity of the data sources. Population is not
//! single-flight: two concurrent misses both recompute and the later insert
//! overwrites an equivalent value.

use moka::sync::Cache;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::pipeline::Reconciled;

const MAX_SOURCES: u64 = 16;

#[derive(Clone)]
pub struct ReconcileCache {
    inner: Cache<String, Arc<Reconciled>>,
}

impl ReconcileCache {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_SOURCES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Reconciled>> {
        self.inner.get(key)
    }

    pub fn get_or_try_reconcile<F, E>(&self, key: &str, compute: F) -> Result<Arc<Reconciled>, E>
    where
        F: FnOnce() -> Result<Reconciled, E>,
    {
        if let Some(cached) = self.get(key) {
            debug!("Reconciliation cache hit for {}", key);
            return Ok(cached);
        }

        let reconciled = Arc::new(compute()?);
        self.inner.insert(key.to_string(), reconciled.clone());
        Ok(reconciled)
    }

    pub async fn get_or_try_reconcile_async<F, Fut, E>(
        &self,
        key: &str,
        compute: F,
    ) -> Result<Arc<Reconciled>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Reconciled, E>>,
    {
        if let Some(cached) = self.get(key) {
            debug!("Reconciliation cache hit for {}", key);
            return Ok(cached);
        }

        let reconciled = Arc::new(compute().await?);
        self.inner.insert(key.to_string(), reconciled.clone());
        Ok(reconciled)
    }

    /// Drops one source's entry so its next access recomputes.
    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    /// Manual refresh: every cached reconciliation is discarded.
    pub fn refresh(&self) {
        info!("Reconciliation cache cleared");
        self.inner.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReconcileError;
    use crate::pipeline::reconcile_sources;
    use crate::pipeline::tests::raw_sources;
    use crate::processor::CleaningSettings;
    use std::cell::Cell;

    fn compute(calls: &Cell<usize>) -> Result<Reconciled, ReconcileError> {
        calls.set(calls.get() + 1);
        reconcile_sources(&raw_sources(), &CleaningSettings::default())
    }

    #[test]
    fn test_hit_skips_recomputation() {
        let cache = ReconcileCache::with_ttl(Duration::from_secs(300));
        let calls = Cell::new(0);

        let first = cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();
        let second = cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();

        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_refresh_forces_recomputation() {
        let cache = ReconcileCache::with_ttl(Duration::from_secs(300));
        let calls = Cell::new(0);

        cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();
        cache.refresh();
        cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();

        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        let cache = ReconcileCache::with_ttl(Duration::from_millis(50));
        let calls = Cell::new(0);

        cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();
        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get("csv:sales").is_none());

        cache.get_or_try_reconcile("csv:sales", || compute(&calls)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = ReconcileCache::with_ttl(Duration::from_secs(300));

        let result = cache.get_or_try_reconcile("csv:broken", || {
            Err::<Reconciled, _>(ReconcileError::unavailable("transactions", "file not found"))
        });
        assert!(result.is_err());
        assert!(cache.get("csv:broken").is_none());
    }

    #[tokio::test]
    async fn test_async_population() {
        let cache = ReconcileCache::with_ttl(Duration::from_secs(300));

        let reconciled = cache
            .get_or_try_reconcile_async("csv:sales", || async {
                reconcile_sources(&raw_sources(), &CleaningSettings::default())
            })
            .await
            .unwrap();

        assert_eq!(reconciled.revenue.len(), 5);
        assert!(cache.get("csv:sales").is_some());
    }
}
