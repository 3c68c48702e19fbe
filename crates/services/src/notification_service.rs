use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use edu_core::model::{
    DEFAULT_NOTIFICATION_DURATION, NOTIFICATION_REMOVE_DELAY, Notification, NotificationId,
    NotifyOptions,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::timer::{Timer, TimerId};

#[derive(Default)]
struct QueueState {
    items: Vec<Notification>,
    dismiss_timers: HashMap<NotificationId, TimerId>,
    remove_timers: HashMap<NotificationId, TimerId>,
}

struct QueueInner {
    this: Weak<QueueInner>,
    state: Mutex<QueueState>,
    timer: Arc<dyn Timer>,
    default_duration: Duration,
    tx: watch::Sender<Vec<Notification>>,
}

/// Ordered queue of toasts with timer-driven hide and removal.
///
/// Each notification owns at most one pending hide timer and one pending
/// removal timer; neither is shared with other notifications.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self::with_default_duration(timer, DEFAULT_NOTIFICATION_DURATION)
    }

    #[must_use]
    pub fn with_default_duration(timer: Arc<dyn Timer>, default_duration: Duration) -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self {
            inner: Arc::new_cyclic(|this| QueueInner {
                this: this.clone(),
                state: Mutex::new(QueueState::default()),
                timer,
                default_duration,
                tx,
            }),
        }
    }

    /// Append a notification and return its id immediately.
    ///
    /// A non-positive duration inserts it already hidden; only the removal
    /// timer is scheduled in that case.
    pub fn notify(&self, options: NotifyOptions) -> NotificationId {
        let id = NotificationId::generate();
        let duration = options.resolved_duration(self.inner.default_duration);
        let notification = Notification::new(id, options, duration);
        let visible = notification.is_visible();

        let mut state = self.inner.state.lock();
        state.items.push(notification);
        if visible {
            let weak = self.inner.this.clone();
            let timer_id = self.inner.timer.schedule(
                duration,
                Box::new(move || QueueInner::with_upgraded(&weak, |inner| inner.auto_dismiss(id))),
            );
            state.dismiss_timers.insert(id, timer_id);
        } else {
            self.inner.schedule_removal(&mut state, id);
        }
        self.inner.publish(&state);
        tracing::debug!(%id, ?duration, "notification queued");
        id
    }

    /// Hide a visible notification and schedule its removal.
    ///
    /// Hidden or unknown ids are ignored.
    pub fn dismiss(&self, id: NotificationId) {
        let mut state = self.inner.state.lock();
        if let Some(timer_id) = state.dismiss_timers.remove(&id) {
            self.inner.timer.cancel(timer_id);
        }
        if self.inner.hide_locked(&mut state, id) {
            self.inner.publish(&state);
        }
    }

    /// Hide every visible notification.
    pub fn dismiss_all(&self) {
        let mut state = self.inner.state.lock();
        let visible: Vec<NotificationId> = state
            .items
            .iter()
            .filter(|n| n.is_visible())
            .map(Notification::id)
            .collect();
        if visible.is_empty() {
            return;
        }
        for id in visible {
            if let Some(timer_id) = state.dismiss_timers.remove(&id) {
                self.inner.timer.cancel(timer_id);
            }
            self.inner.hide_locked(&mut state, id);
        }
        self.inner.publish(&state);
    }

    /// Snapshot of the queue in display order.
    #[must_use]
    pub fn list(&self) -> Vec<Notification> {
        self.inner.state.lock().items.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.tx.subscribe()
    }

    /// Cancel every pending timer and empty the queue.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        for (_, timer_id) in state.dismiss_timers.drain() {
            self.inner.timer.cancel(timer_id);
        }
        for (_, timer_id) in state.remove_timers.drain() {
            self.inner.timer.cancel(timer_id);
        }
        state.items.clear();
        self.inner.publish(&state);
    }
}

impl QueueInner {
    fn with_upgraded(weak: &Weak<Self>, f: impl FnOnce(&Self)) {
        if let Some(inner) = weak.upgrade() {
            f(&inner);
        }
    }

    fn auto_dismiss(&self, id: NotificationId) {
        let mut state = self.state.lock();
        state.dismiss_timers.remove(&id);
        if self.hide_locked(&mut state, id) {
            tracing::debug!(%id, "notification auto-dismissed");
            self.publish(&state);
        }
    }

    fn remove(&self, id: NotificationId) {
        let mut state = self.state.lock();
        state.remove_timers.remove(&id);
        let before = state.items.len();
        state.items.retain(|n| n.id() != id);
        if state.items.len() != before {
            tracing::debug!(%id, "notification removed");
            self.publish(&state);
        }
    }

    /// Returns `true` if the notification went from visible to hidden.
    fn hide_locked(&self, state: &mut QueueState, id: NotificationId) -> bool {
        let hidden = state
            .items
            .iter_mut()
            .find(|n| n.id() == id)
            .is_some_and(Notification::hide);
        if hidden {
            self.schedule_removal(state, id);
        }
        hidden
    }

    fn schedule_removal(&self, state: &mut QueueState, id: NotificationId) {
        if state.remove_timers.contains_key(&id) {
            return;
        }
        let weak = self.this.clone();
        let timer_id = self.timer.schedule(
            NOTIFICATION_REMOVE_DELAY,
            Box::new(move || Self::with_upgraded(&weak, |inner| inner.remove(id))),
        );
        state.remove_timers.insert(id, timer_id);
    }

    fn publish(&self, state: &QueueState) {
        self.tx.send_replace(state.items.clone());
    }
}
