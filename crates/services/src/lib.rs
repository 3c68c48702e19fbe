#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod notification_service;
pub mod progress_service;
pub mod reward_service;
pub mod supabase;
pub mod timer;

pub use edu_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressError, SupabaseError};
pub use notification_service::NotificationQueue;
pub use progress_service::{ProgressAggregator, ProgressView};
pub use reward_service::RewardStore;
pub use supabase::SupabaseProgressSource;
pub use timer::{ManualTimer, Timer, TimerId, TimerTask, TokioTimer};
