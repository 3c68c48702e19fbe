use std::sync::Arc;
use std::time::Duration;

use edu_core::model::NotifyOptions;
use storage::repository::{ProgressSource, Storage};

use crate::Clock;
use crate::error::AppServicesError;
use crate::notification_service::NotificationQueue;
use crate::progress_service::ProgressAggregator;
use crate::reward_service::RewardStore;
use crate::timer::Timer;

/// Assembles the app-facing stores from their collaborators.
#[derive(Clone)]
pub struct AppServices {
    rewards: Arc<RewardStore>,
    notifications: NotificationQueue,
    progress: Arc<ProgressAggregator>,
}

impl AppServices {
    #[must_use]
    pub fn new(
        storage: &Storage,
        source: Arc<dyn ProgressSource>,
        timer: Arc<dyn Timer>,
        clock: Clock,
        toast_duration: Duration,
    ) -> Self {
        Self {
            rewards: Arc::new(RewardStore::new(Arc::clone(&storage.kv))),
            notifications: NotificationQueue::with_default_duration(timer, toast_duration),
            progress: Arc::new(ProgressAggregator::new(clock, source)),
        }
    }

    /// Build services whose durable state lives in `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        source: Arc<dyn ProgressSource>,
        timer: Arc<dyn Timer>,
        clock: Clock,
        toast_duration: Duration,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::new(&storage, source, timer, clock, toast_duration))
    }

    /// Add stars and celebrate with a success toast.
    ///
    /// Non-positive amounts update the total silently.
    pub async fn award_stars(&self, amount: i64) -> i64 {
        let total = self.rewards.add(amount).await;
        if amount > 0 {
            let noun = if amount == 1 { "star" } else { "stars" };
            self.notifications.notify(
                NotifyOptions::success(format!("You earned {amount} {noun}!"))
                    .with_description(format!("You now have {total} in total.")),
            );
        }
        total
    }

    #[must_use]
    pub fn rewards(&self) -> Arc<RewardStore> {
        Arc::clone(&self.rewards)
    }

    #[must_use]
    pub fn notifications(&self) -> NotificationQueue {
        self.notifications.clone()
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressAggregator> {
        Arc::clone(&self.progress)
    }
}
