//! Deferred-callback scheduling used by the notification queue.
//!
//! `TokioTimer` runs tasks on a tokio runtime; `ManualTimer` only fires
//! when a test advances it, so lifecycles can be checked without sleeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// A deferred unit of work.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by `Timer::schedule`, used to cancel the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Schedule/cancel capability.
pub trait Timer: Send + Sync {
    /// Run `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Cancel a pending task. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: TimerId);
}

/// Timer backed by `tokio::time::sleep` on a runtime handle.
pub struct TokioTimer {
    handle: Handle,
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
}

impl TokioTimer {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of tasks that have neither fired nor been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let tasks = Arc::clone(&self.tasks);

        // Hold the map lock while spawning so the task cannot observe the
        // map before its own entry exists.
        let mut guard = self.tasks.lock();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let still_pending = tasks.lock().remove(&id).is_some();
            if still_pending {
                task();
            }
        });
        guard.insert(id, join.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(handle) = self.tasks.lock().remove(&id) {
            handle.abort();
        }
    }
}

struct PendingTask {
    id: TimerId,
    due: Duration,
    task: TimerTask,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    pending: Vec<PendingTask>,
}

/// Virtual-time timer for tests.
#[derive(Clone, Default)]
pub struct ManualTimer {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().now
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Advance virtual time, firing due tasks in deadline order.
    ///
    /// Tasks scheduled by a firing task run in the same call if they fall
    /// inside the window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        loop {
            let next = {
                let mut state = self.state.lock();
                let due_idx = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.id))
                    .map(|(idx, _)| idx);
                match due_idx {
                    Some(idx) => {
                        let pending = state.pending.swap_remove(idx);
                        state.now = pending.due;
                        Some(pending.task)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Timer for ManualTimer {
    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerId {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due = state.now + delay;
        state.pending.push(PendingTask { id, due, task });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.state.lock().pending.retain(|p| p.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn manual_timer_fires_in_deadline_order() {
        let timer = ManualTimer::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (label, ms) in [("late", 300_u64), ("early", 100)] {
            let log = Arc::clone(&log);
            timer.schedule(
                Duration::from_millis(ms),
                Box::new(move || log.lock().push(label)),
            );
        }

        timer.advance(Duration::from_millis(99));
        assert!(log.lock().is_empty());
        timer.advance(Duration::from_millis(201));
        assert_eq!(*log.lock(), vec!["early", "late"]);
        assert_eq!(timer.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn manual_timer_runs_nested_schedules_within_window() {
        let timer = ManualTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let inner_timer = timer.clone();
        let inner_fired = Arc::clone(&fired);
        timer.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                inner_timer.schedule(Duration::from_millis(10), counter_task(&inner_fired));
            }),
        );

        timer.advance(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn manual_timer_cancel_drops_task() {
        let timer = ManualTimer::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let id = timer.schedule(Duration::from_millis(5), counter_task(&fired));
        timer.cancel(id);
        timer.cancel(id);
        timer.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_fires_and_cancels() {
        let timer = TokioTimer::new(Handle::current());
        let fired = Arc::new(AtomicUsize::new(0));
        timer.schedule(Duration::from_millis(50), counter_task(&fired));
        let cancelled = timer.schedule(Duration::from_millis(50), counter_task(&fired));
        timer.cancel(cancelled);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(timer.pending(), 0);
    }
}
