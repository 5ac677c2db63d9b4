//! Per-request operation locks.
//!
//! Serializes the multi-step operations (upload, analysis job, delivery,
//! operator recovery) for one request id within this process. Each step's
//! repository write is already atomic; the lock keeps two steps from
//! interleaving, e.g. two concurrent resends both emailing the customer.

use std::sync::Arc;

use dashmap::DashMap;
use payaudit_core::RequestId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<RequestId, Arc<Mutex<()>>>;

/// Keyed async mutex over request ids.
///
/// An entry lives only while some task holds or waits on it; the last
/// [`RequestGuard`] to drop removes it.
#[derive(Debug, Clone, Default)]
pub struct RequestLocks {
    inner: Arc<LockMap>,
}

/// Exclusive access to one request id. Released on drop.
#[derive(Debug)]
pub struct RequestGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: RequestId,
    map: Arc<LockMap>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.guard.take();
        // The map holds one reference; any other is a waiter that cloned the
        // mutex under the same shard lock, so the entry must stay.
        self.map
            .remove_if(&self.id, |_, m| Arc::strong_count(m) == 1);
    }
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: RequestId) -> RequestGuard {
        let mutex = self
            .inner
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        RequestGuard {
            guard: Some(guard),
            id,
            map: Arc::clone(&self.inner),
        }
    }

    /// Number of ids currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_id_is_exclusive() {
        let locks = RequestLocks::new();
        let id = RequestId::new();
        let guard = locks.lock(id).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = RequestLocks::new();
        let _a = locks.lock(RequestId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(RequestId::new())).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn entry_removed_when_last_guard_drops() {
        let locks = RequestLocks::new();
        let held = locks.lock(RequestId::new()).await;
        drop(locks.lock(RequestId::new()).await);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_a_waiter_remains() {
        let locks = RequestLocks::new();
        let id = RequestId::new();
        let first = locks.lock(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.lock(id).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
