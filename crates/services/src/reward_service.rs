use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use edu_core::model::{REWARD_STORAGE_KEY, RewardCounter};
use storage::repository::{KeyValueStore, StorageError};
use tokio::sync::{Mutex, watch};

/// Star counter backed by durable key-value storage.
///
/// The counter is loaded lazily on first access. Storage failures never
/// reach the caller: the in-memory value stays authoritative and the
/// failure is logged (a warning the first time, debug afterwards).
pub struct RewardStore {
    kv: Arc<dyn KeyValueStore>,
    counter: Mutex<Option<RewardCounter>>,
    warned: AtomicBool,
    tx: watch::Sender<i64>,
}

impl RewardStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (tx, _rx) = watch::channel(0);
        Self {
            kv,
            counter: Mutex::new(None),
            warned: AtomicBool::new(false),
            tx,
        }
    }

    /// Current total, loading it from storage on first call.
    pub async fn read(&self) -> i64 {
        let mut guard = self.counter.lock().await;
        self.load_locked(&mut guard).await.value()
    }

    /// Add `amount` stars and persist the new total before returning it.
    pub async fn add(&self, amount: i64) -> i64 {
        let mut guard = self.counter.lock().await;
        let mut counter = self.load_locked(&mut guard).await;
        let total = counter.add(amount);
        *guard = Some(counter);
        self.tx.send_replace(total);

        if let Err(err) = self.kv.set(REWARD_STORAGE_KEY, &counter.to_persisted()).await {
            self.report_persistence_failure("write", &err);
        }
        tracing::debug!(amount, total, "stars updated");
        total
    }

    /// Last known total without touching storage; zero before the first load.
    #[must_use]
    pub fn current(&self) -> i64 {
        *self.tx.borrow()
    }

    /// Receiver that observes every change to the total.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.tx.subscribe()
    }

    async fn load_locked(&self, slot: &mut Option<RewardCounter>) -> RewardCounter {
        if let Some(counter) = slot {
            return *counter;
        }

        let raw = match self.kv.get(REWARD_STORAGE_KEY).await {
            Ok(raw) => raw,
            Err(err) => {
                self.report_persistence_failure("read", &err);
                None
            }
        };
        let counter = match raw.as_deref() {
            None => RewardCounter::default(),
            Some(raw) => RewardCounter::from_persisted(raw).unwrap_or_else(|| {
                tracing::warn!(value = raw, "ignoring malformed persisted star count");
                RewardCounter::default()
            }),
        };

        *slot = Some(counter);
        self.tx.send_replace(counter.value());
        counter
    }

    fn report_persistence_failure(&self, op: &'static str, err: &StorageError) {
        if self.warned.swap(true, Ordering::Relaxed) {
            tracing::debug!(op, error = %err, "star counter persistence failed");
        } else {
            tracing::warn!(
                op,
                error = %err,
                "star counter persistence failed; keeping in-memory value"
            );
        }
    }
}
