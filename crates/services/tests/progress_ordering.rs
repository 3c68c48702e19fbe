use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use edu_core::model::{Badge, ProgressEntry, StudentId};
use edu_core::time::{fixed_clock, fixed_now};
use services::{ProgressAggregator, ProgressError};
use storage::repository::{InMemoryProgressSource, ProgressSource, StorageError};
use tokio::sync::{Notify, Semaphore};
use tokio::time::timeout;

/// Wraps the in-memory source and parks reads for gated students until the
/// test opens their gate. Waiters are released in arrival order.
struct GatedSource {
    inner: InMemoryProgressSource,
    gates: HashMap<StudentId, Arc<Semaphore>>,
    started: Arc<Notify>,
}

impl GatedSource {
    fn new(inner: InMemoryProgressSource, gated: &[&StudentId]) -> Self {
        let gates = gated
            .iter()
            .map(|id| ((*id).clone(), Arc::new(Semaphore::new(0))))
            .collect();
        Self {
            inner,
            gates,
            started: Arc::new(Notify::new()),
        }
    }

    /// Release one request (its badge and progress reads).
    fn open(&self, id: &StudentId) {
        self.gates[id].add_permits(2);
    }

    async fn wait_gate(&self, student_id: &StudentId) {
        if let Some(gate) = self.gates.get(student_id) {
            gate.acquire().await.expect("gate closed").forget();
        }
    }
}

#[async_trait]
impl ProgressSource for GatedSource {
    async fn get_badges(&self, student_id: &StudentId) -> Result<Vec<Badge>, StorageError> {
        self.started.notify_one();
        self.wait_gate(student_id).await;
        self.inner.get_badges(student_id).await
    }

    async fn get_subject_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        self.wait_gate(student_id).await;
        self.inner.get_subject_progress(student_id).await
    }
}

/// Answers every read with empty rows after a fixed delay.
struct SlowSource {
    delay: Duration,
}

#[async_trait]
impl ProgressSource for SlowSource {
    async fn get_badges(&self, _student_id: &StudentId) -> Result<Vec<Badge>, StorageError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn get_subject_progress(
        &self,
        _student_id: &StudentId,
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

fn slow_aggregator() -> Arc<ProgressAggregator> {
    Arc::new(ProgressAggregator::new(
        fixed_clock(),
        Arc::new(SlowSource {
            delay: Duration::from_secs(60),
        }),
    ))
}

fn student(id: &str) -> StudentId {
    StudentId::new(id).unwrap()
}

fn seeded() -> InMemoryProgressSource {
    let source = InMemoryProgressSource::new();
    source.set_badges(
        &student("A"),
        vec![Badge::new("a1", "Alpha", fixed_now()).unwrap()],
    );
    source.set_badges(
        &student("B"),
        vec![Badge::new("b1", "Beta", fixed_now()).unwrap()],
    );
    source
}

#[tokio::test]
async fn slow_older_response_does_not_clobber_newer_request() {
    let a = student("A");
    let source = Arc::new(GatedSource::new(seeded(), &[&a]));
    let aggregator = Arc::new(ProgressAggregator::new(
        fixed_clock(),
        Arc::clone(&source) as Arc<dyn ProgressSource>,
    ));

    let slow = {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move { aggregator.fetch_snapshot("A").await })
    };
    source.started.notified().await;

    let fast = aggregator.fetch_snapshot("B").await.unwrap();
    assert_eq!(fast.student_id().as_str(), "B");
    assert_eq!(aggregator.latest().unwrap().student_id().as_str(), "B");

    source.open(&a);
    let stale = slow.await.unwrap().unwrap();
    assert_eq!(stale.student_id().as_str(), "A");

    let view = aggregator.view();
    assert_eq!(view.snapshot.unwrap().student_id().as_str(), "B");
    assert_eq!(view.requested, Some(student("B")));
    assert!(!view.loading);
}

#[tokio::test]
async fn superseded_response_arriving_first_is_not_published() {
    let a = student("A");
    let inner = seeded();
    let source = Arc::new(GatedSource::new(inner.clone(), &[&a]));
    let aggregator = Arc::new(ProgressAggregator::new(
        fixed_clock(),
        Arc::clone(&source) as Arc<dyn ProgressSource>,
    ));

    let first = {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move { aggregator.fetch_snapshot("A").await })
    };
    source.started.notified().await;

    let second = {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move { aggregator.fetch_snapshot("A").await })
    };
    source.started.notified().await;

    source.open(&a);
    let early = first.await.unwrap().unwrap();
    assert_eq!(early.badges().len(), 1);
    assert!(aggregator.latest().is_none());
    assert!(aggregator.view().loading);

    inner.set_badges(&a, Vec::new());
    source.open(&a);
    second.await.unwrap().unwrap();

    let latest = aggregator.latest().unwrap();
    assert!(latest.badges().is_empty());
    assert!(!aggregator.view().loading);
}

#[tokio::test]
async fn stale_failure_does_not_mark_view_as_failed() {
    let a = student("A");
    let inner = seeded();
    inner.set_failing(&a, true);
    let source = Arc::new(GatedSource::new(inner, &[&a]));
    let aggregator = Arc::new(ProgressAggregator::new(
        fixed_clock(),
        Arc::clone(&source) as Arc<dyn ProgressSource>,
    ));

    let slow = {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move { aggregator.fetch_snapshot("A").await })
    };
    source.started.notified().await;

    aggregator.fetch_snapshot("B").await.unwrap();
    source.open(&a);
    let err = slow.await.unwrap().unwrap_err();
    assert!(matches!(err, ProgressError::Fetch { .. }));

    let view = aggregator.view();
    assert!(view.last_error.is_none());
    assert_eq!(view.snapshot.unwrap().student_id().as_str(), "B");
}

#[tokio::test(start_paused = true)]
async fn caller_timeout_clears_loading() {
    let aggregator = slow_aggregator();

    let result = timeout(Duration::from_secs(1), aggregator.fetch_snapshot("x")).await;
    assert!(result.is_err());

    let view = aggregator.view();
    assert!(!view.loading);
    assert_eq!(view.requested, Some(student("x")));
    assert!(view.snapshot.is_none());
    assert!(view.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn abandoning_older_request_keeps_newer_one_loading() {
    let aggregator = slow_aggregator();

    let mut older = Box::pin(aggregator.fetch_snapshot("A"));
    assert!(timeout(Duration::from_secs(1), &mut older).await.is_err());

    let newer = {
        let aggregator = Arc::clone(&aggregator);
        tokio::spawn(async move { aggregator.fetch_snapshot("B").await })
    };
    while aggregator.view().requested != Some(student("B")) {
        tokio::task::yield_now().await;
    }

    drop(older);
    let view = aggregator.view();
    assert!(view.loading);
    assert_eq!(view.requested, Some(student("B")));

    let snapshot = newer.await.unwrap().unwrap();
    assert_eq!(snapshot.student_id().as_str(), "B");
    assert!(!aggregator.view().loading);
}
