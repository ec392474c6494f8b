//! In-memory transfer batch store with sliding TTL.
//!
//! Batches live only in process memory; an abandoned batch must not pin
//! memory forever, so every entry carries an expiry deadline that slides
//! forward on each save. Expiry is enforced lazily on lookup and
//! physically by a periodic background sweep.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::batch::TransferBatch;

struct StoreEntry {
    batch: Arc<Mutex<TransferBatch>>,
    expires_at: Instant,
}

/// Concurrent map of transfer batches keyed by id.
///
/// Lookup, save and sweep may run from independent request contexts
/// without external locking; the time check and removal of an expired
/// entry happen under the map's own per-entry atomicity. The returned
/// per-batch mutex is what serializes state transitions against one id.
pub struct BatchStore {
    entries: DashMap<Uuid, StoreEntry>,
    sliding_ttl: Duration,
}

impl BatchStore {
    /// Creates a store whose entries expire `sliding_ttl` after their
    /// last save. A zero TTL expires entries at the instant they are
    /// saved, which is useful for exercising expiry paths.
    pub fn new(sliding_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            sliding_ttl,
        }
    }

    /// Saves a batch and returns the shared handle to it.
    pub fn insert(&self, batch: TransferBatch, now: Instant) -> Arc<Mutex<TransferBatch>> {
        let id = batch.id();
        let handle = Arc::new(Mutex::new(batch));
        self.entries.insert(
            id,
            StoreEntry {
                batch: Arc::clone(&handle),
                expires_at: now + self.sliding_ttl,
            },
        );
        handle
    }

    /// Looks up a live batch.
    ///
    /// An entry whose deadline has passed is treated as absent and
    /// removed as a side effect, whether or not a sweep got to it first.
    pub fn get(&self, id: &Uuid, now: Instant) -> Option<Arc<Mutex<TransferBatch>>> {
        if self
            .entries
            .remove_if(id, |_, entry| now >= entry.expires_at)
            .is_some()
        {
            return None;
        }

        let entry = self.entries.get(id)?;
        if now >= entry.expires_at {
            return None;
        }
        Some(Arc::clone(&entry.batch))
    }

    /// Slides the expiry deadline of a batch forward to `now + ttl`.
    ///
    /// Called after every successful mutation so active batches stay
    /// alive while abandoned ones age out.
    pub fn touch(&self, id: &Uuid, now: Instant) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.expires_at = now + self.sliding_ttl;
        }
    }

    /// Physically removes every expired entry, returning the count.
    ///
    /// This bounds memory growth from batches that are never looked up
    /// again after being abandoned.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = now < entry.expires_at;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sliding_ttl(&self) -> Duration {
        self.sliding_ttl
    }
}

/// Spawns the periodic expiry sweep for the lifetime of the process.
///
/// Runs until `cancel` fires; cancellation exits promptly without
/// surfacing anything to the caller. Intervals below one second are
/// clamped up to one second.
pub fn spawn_expiry_sweeper(
    store: Arc<BatchStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so the first
        // sweep happens one full interval after start.
        ticker.tick().await;

        tracing::info!(interval_secs = interval.as_secs(), "batch expiry sweeper started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("batch expiry sweeper stopped");
                    break;
                }

                _ = ticker.tick() => {
                    let removed = store.sweep_expired(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, "removed expired transfer batches");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch() -> TransferBatch {
        TransferBatch::create("docs", 1, Utc::now()).unwrap()
    }

    #[test]
    fn inserted_batch_is_found_within_ttl() {
        let store = BatchStore::new(Duration::from_secs(60));
        let now = Instant::now();
        let b = batch();
        let id = b.id();
        store.insert(b, now);

        assert!(store.get(&id, now).is_some());
        assert!(store.get(&id, now + Duration::from_secs(59)).is_some());
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = BatchStore::new(Duration::from_secs(60));
        assert!(store.get(&Uuid::new_v4(), Instant::now()).is_none());
    }

    #[test]
    fn entry_expires_at_deadline() {
        let store = BatchStore::new(Duration::from_secs(60));
        let now = Instant::now();
        let b = batch();
        let id = b.id();
        store.insert(b, now);

        assert!(store.get(&id, now + Duration::from_secs(60)).is_none());
        // Lazy expiry removed the entry for good.
        assert!(store.get(&id, now).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let store = BatchStore::new(Duration::ZERO);
        let now = Instant::now();
        let b = batch();
        let id = b.id();
        store.insert(b, now);

        assert!(store.get(&id, now).is_none());
    }

    #[test]
    fn touch_slides_the_deadline() {
        let store = BatchStore::new(Duration::from_secs(60));
        let now = Instant::now();
        let b = batch();
        let id = b.id();
        store.insert(b, now);

        store.touch(&id, now + Duration::from_secs(50));
        assert!(store.get(&id, now + Duration::from_secs(100)).is_some());
        assert!(store.get(&id, now + Duration::from_secs(110)).is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = BatchStore::new(Duration::from_secs(60));
        let now = Instant::now();

        let old = batch();
        let old_id = old.id();
        store.insert(old, now);

        let fresh = batch();
        let fresh_id = fresh.id();
        store.insert(fresh, now + Duration::from_secs(30));

        let removed = store.sweep_expired(now + Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh_id, now + Duration::from_secs(60)).is_some());
        assert!(store.get(&old_id, now + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn handle_is_shared_between_get_calls() {
        let store = BatchStore::new(Duration::from_secs(60));
        let now = Instant::now();
        let b = batch();
        let id = b.id();
        let inserted = store.insert(b, now);

        let fetched = store.get(&id, now).unwrap();
        assert!(Arc::ptr_eq(&inserted, &fetched));
    }

    #[test]
    fn concurrent_access_from_multiple_threads() {
        use std::thread;

        let store = Arc::new(BatchStore::new(Duration::from_secs(60)));
        let now = Instant::now();

        let mut ids = Vec::new();
        for _ in 0..8 {
            let b = batch();
            ids.push(b.id());
            store.insert(b, now);
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    assert!(store.get(&id, now).is_some());
                    store.touch(&id, now);
                }
            }));
        }
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    store.sweep_expired(now);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_abandoned_batches() {
        let store = Arc::new(BatchStore::new(Duration::ZERO));
        store.insert(batch(), Instant::now());
        assert_eq!(store.len(), 1);

        let cancel = CancellationToken::new();
        let handle =
            spawn_expiry_sweeper(Arc::clone(&store), Duration::from_secs(1), cancel.clone());

        // Virtual time: sleeping past the interval drives the first sweep.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancellation() {
        let store = Arc::new(BatchStore::new(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let handle = spawn_expiry_sweeper(
            Arc::clone(&store),
            Duration::from_secs(60),
            cancel.clone(),
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
