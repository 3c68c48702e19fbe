use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::NotificationId;

/// How long a notification stays visible when no duration is given.
pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(5_000);

/// Grace interval between a notification turning invisible and its removal.
pub const NOTIFICATION_REMOVE_DELAY: Duration = Duration::from_millis(300);

/// Visual intent of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Default,
    Destructive,
    Success,
}

/// Input to `NotificationQueue::notify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOptions {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    /// Visible time in milliseconds. Zero or negative skips the visible
    /// phase entirely; `None` falls back to the queue's default.
    pub duration_ms: Option<i64>,
}

impl NotifyOptions {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            severity: Severity::Default,
            duration_ms: None,
        }
    }

    #[must_use]
    pub fn success(title: impl Into<String>) -> Self {
        Self::new(title).with_severity(Severity::Success)
    }

    #[must_use]
    pub fn destructive(title: impl Into<String>) -> Self {
        Self::new(title).with_severity(Severity::Destructive)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Resolves the visible duration; `Duration::ZERO` means "no visible phase".
    #[must_use]
    pub fn resolved_duration(&self, default: Duration) -> Duration {
        match self.duration_ms {
            None => default,
            Some(ms) => u64::try_from(ms).map_or(Duration::ZERO, Duration::from_millis),
        }
    }
}

/// A transient, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    id: NotificationId,
    title: String,
    description: Option<String>,
    severity: Severity,
    duration: Duration,
    visible: bool,
}

impl Notification {
    #[must_use]
    pub fn new(id: NotificationId, options: NotifyOptions, duration: Duration) -> Self {
        let description = options
            .description
            .map(|val| val.trim().to_string())
            .filter(|val| !val.is_empty());
        Self {
            id,
            title: options.title,
            description,
            severity: options.severity,
            duration,
            visible: !duration.is_zero(),
        }
    }

    #[must_use]
    pub fn id(&self) -> NotificationId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Hides the notification. Returns `false` if it was already hidden.
    pub fn hide(&mut self) -> bool {
        std::mem::replace(&mut self.visible, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_duration_handles_non_positive() {
        let default = DEFAULT_NOTIFICATION_DURATION;
        assert_eq!(NotifyOptions::new("a").resolved_duration(default), default);
        assert_eq!(
            NotifyOptions::new("a")
                .with_duration_ms(1_500)
                .resolved_duration(default),
            Duration::from_millis(1_500)
        );
        assert_eq!(
            NotifyOptions::new("a")
                .with_duration_ms(0)
                .resolved_duration(default),
            Duration::ZERO
        );
        assert_eq!(
            NotifyOptions::new("a")
                .with_duration_ms(-20)
                .resolved_duration(default),
            Duration::ZERO
        );
    }

    #[test]
    fn zero_duration_starts_hidden() {
        let n = Notification::new(
            NotificationId::generate(),
            NotifyOptions::new("x"),
            Duration::ZERO,
        );
        assert!(!n.is_visible());
    }

    #[test]
    fn hide_reports_transition_once() {
        let mut n = Notification::new(
            NotificationId::generate(),
            NotifyOptions::success("Saved").with_description("  "),
            DEFAULT_NOTIFICATION_DURATION,
        );
        assert_eq!(n.severity(), Severity::Success);
        assert_eq!(n.description(), None);
        assert!(n.hide());
        assert!(!n.hide());
    }
}
