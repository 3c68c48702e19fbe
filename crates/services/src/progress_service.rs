use std::sync::Arc;

use edu_core::model::{ProgressSnapshot, StudentId};
use parking_lot::Mutex;
use storage::repository::ProgressSource;
use tokio::sync::watch;

use crate::Clock;
use crate::error::ProgressError;

/// What a dashboard needs to render remote progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressView {
    /// Last successfully fetched snapshot, possibly for an earlier student.
    pub snapshot: Option<Arc<ProgressSnapshot>>,
    /// Student of the most recent request.
    pub requested: Option<StudentId>,
    /// A request for `requested` is outstanding.
    pub loading: bool,
    /// Failure of the most recent request, cleared by the next success.
    pub last_error: Option<String>,
}

impl ProgressView {
    /// True when the view shows data but the latest refresh failed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.snapshot.is_some() && self.last_error.is_some()
    }
}

#[derive(Default)]
struct AggregatorState {
    latest_seq: u64,
    view: ProgressView,
}

/// Clears `loading` when a request future is dropped before it resolves,
/// provided no newer request has started since.
struct PendingRequest<'a> {
    aggregator: &'a ProgressAggregator,
    seq: u64,
    armed: bool,
}

impl PendingRequest<'_> {
    fn settle(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.aggregator.state.lock();
        if state.latest_seq == self.seq && state.view.loading {
            state.view.loading = false;
            self.aggregator.tx.send_replace(state.view.clone());
            tracing::debug!(seq = self.seq, "progress request abandoned before completion");
        }
    }
}

/// Fetches per-student badges and progress and keeps the latest snapshot.
///
/// Requests are numbered; a response may only publish if its number is
/// still the latest when it resolves. Older responses are returned to
/// their caller but never reach the shared view.
pub struct ProgressAggregator {
    clock: Clock,
    source: Arc<dyn ProgressSource>,
    state: Mutex<AggregatorState>,
    tx: watch::Sender<ProgressView>,
}

impl ProgressAggregator {
    #[must_use]
    pub fn new(clock: Clock, source: Arc<dyn ProgressSource>) -> Self {
        let (tx, _rx) = watch::channel(ProgressView::default());
        Self {
            clock,
            source,
            state: Mutex::new(AggregatorState::default()),
            tx,
        }
    }

    /// Fetch badges and subject progress for `student_id` concurrently.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Validation` for a blank id (before any remote
    /// call) and `ProgressError::Fetch` if either remote read fails. The
    /// previously published snapshot is kept on failure.
    pub async fn fetch_snapshot(
        &self,
        student_id: &str,
    ) -> Result<Arc<ProgressSnapshot>, ProgressError> {
        let student_id = StudentId::new(student_id)?;
        self.fetch_validated(student_id).await
    }

    /// Re-fetch the most recently requested student.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::NoStudentSelected` if nothing was requested yet,
    /// otherwise the same errors as `fetch_snapshot`.
    pub async fn refresh(&self) -> Result<Arc<ProgressSnapshot>, ProgressError> {
        let requested = self.state.lock().view.requested.clone();
        let student_id = requested.ok_or(ProgressError::NoStudentSelected)?;
        self.fetch_validated(student_id).await
    }

    async fn fetch_validated(
        &self,
        student_id: StudentId,
    ) -> Result<Arc<ProgressSnapshot>, ProgressError> {
        let seq = {
            let mut state = self.state.lock();
            state.latest_seq += 1;
            state.view.requested = Some(student_id.clone());
            state.view.loading = true;
            self.tx.send_replace(state.view.clone());
            state.latest_seq
        };
        tracing::debug!(%student_id, seq, "fetching progress snapshot");
        let pending = PendingRequest {
            aggregator: self,
            seq,
            armed: true,
        };

        let result = tokio::try_join!(
            self.source.get_badges(&student_id),
            self.source.get_subject_progress(&student_id),
        );
        pending.settle();

        let mut state = self.state.lock();
        let is_latest = state.latest_seq == seq;
        match result {
            Ok((badges, progress)) => {
                let snapshot = Arc::new(ProgressSnapshot::new(
                    student_id,
                    badges,
                    progress,
                    self.clock.now(),
                ));
                if is_latest {
                    state.view.snapshot = Some(Arc::clone(&snapshot));
                    state.view.loading = false;
                    state.view.last_error = None;
                    self.tx.send_replace(state.view.clone());
                    tracing::info!(
                        student_id = %snapshot.student_id(),
                        badges = snapshot.badges().len(),
                        subjects = snapshot.subject_progress().len(),
                        "progress snapshot updated"
                    );
                } else {
                    tracing::debug!(
                        student_id = %snapshot.student_id(),
                        seq,
                        latest = state.latest_seq,
                        "discarding superseded progress response"
                    );
                }
                Ok(snapshot)
            }
            Err(source) => {
                if is_latest {
                    state.view.loading = false;
                    state.view.last_error = Some(source.to_string());
                    self.tx.send_replace(state.view.clone());
                    tracing::warn!(%student_id, error = %source, "progress refresh failed");
                } else {
                    tracing::debug!(%student_id, seq, "ignoring failure of superseded request");
                }
                Err(ProgressError::Fetch { student_id, source })
            }
        }
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<ProgressSnapshot>> {
        self.state.lock().view.snapshot.clone()
    }

    #[must_use]
    pub fn view(&self) -> ProgressView {
        self.state.lock().view.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.tx.subscribe()
    }
}
