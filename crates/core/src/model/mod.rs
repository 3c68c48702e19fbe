mod backend_settings;
mod badge;
mod ids;
mod notification;
mod progress;
mod reward;

pub use backend_settings::{BackendSettings, BackendSettingsDraft, BackendSettingsError};
pub use badge::{Badge, BadgeError};
pub use ids::{BadgeId, NotificationId, StudentId, StudentIdError};
pub use notification::{
    DEFAULT_NOTIFICATION_DURATION, NOTIFICATION_REMOVE_DELAY, Notification, NotifyOptions,
    Severity,
};
pub use progress::{ProgressEntry, ProgressEntryError, ProgressSnapshot};
pub use reward::{REWARD_STORAGE_KEY, RewardCounter};
