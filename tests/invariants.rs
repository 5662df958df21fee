//! Cross-cutting invariants and round-trip laws (I1-I7, L1-L3).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ignition::{Coordinator, CoordinatorOptions, ExecutionMode, Recording, Signal};

#[tokio::test]
async fn i1_body_runs_at_most_once_under_concurrent_wait_all() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = Arc::clone(&calls);
    let signal = Signal::new("db", move |_| {
        let c = Arc::clone(&c);
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(())
        }
    });

    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
    let coordinator = Arc::new(Coordinator::new(vec![signal], options).unwrap());

    let a = Arc::clone(&coordinator);
    let b = Arc::clone(&coordinator);
    let c = Arc::clone(&coordinator);
    let (ra, rb, rc) = tokio::join!(
        tokio::spawn(async move { a.wait_all().await }),
        tokio::spawn(async move { b.wait_all().await }),
        tokio::spawn(async move { c.wait_all().await }),
    );
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();
    rc.unwrap().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn i2_results_contain_exactly_one_entry_per_signal_outside_fail_fast() {
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
    let coordinator = Coordinator::new(
        vec![
            Signal::new("a", |_| async { Ok(()) }),
            Signal::new("b", |_| async { Err("boom".into()) }),
        ],
        options,
    )
    .unwrap();

    let result = coordinator.wait_all().await.unwrap();
    assert_eq!(result.results.len(), 2);
}

#[tokio::test]
async fn l2_wait_all_is_idempotent() {
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
    let coordinator = Coordinator::new(vec![Signal::new("a", |_| async { Ok(()) })], options).unwrap();

    let first = coordinator.wait_all().await.unwrap();
    let second = coordinator.wait_all().await.unwrap();

    assert_eq!(first.total_duration, second.total_duration);
    assert_eq!(first.results[0].status, second.results[0].status);
    assert_eq!(first.results[0].exception, second.results[0].exception);
}

#[tokio::test]
async fn l3_coordinator_completed_observer_event_fires_exactly_once() {
    use ignition::{IgnitionResult, SignalObserver};

    struct CountingObserver(Arc<AtomicU32>);
    impl SignalObserver for CountingObserver {
        fn on_coordinator_completed(&self, _result: &IgnitionResult) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let count = Arc::new(AtomicU32::new(0));
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
    let coordinator = Arc::new(
        Coordinator::with_observer(
            vec![Signal::new("a", |_| async { Ok(()) })],
            options,
            Arc::new(CountingObserver(Arc::clone(&count))),
        )
        .unwrap(),
    );

    let a = Arc::clone(&coordinator);
    let b = Arc::clone(&coordinator);
    let (ra, rb) =
        tokio::join!(tokio::spawn(async move { a.wait_all().await }), tokio::spawn(async move { b.wait_all().await }));
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn l1_recording_round_trips_through_json_modulo_unknown_fields() {
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
    let coordinator = Coordinator::new(
        vec![Signal::new("a", |_| async { Ok(()) }), Signal::new("b", |_| async { Err("boom".into()) })],
        options,
    )
    .unwrap();
    coordinator.wait_all().await.unwrap();

    let recording = coordinator.record(None).unwrap();
    let json = recording.to_json();
    let parsed = Recording::from_json(&json).unwrap();

    assert_eq!(parsed.signals.len(), recording.signals.len());
    assert_eq!(parsed.summary.succeeded_count, recording.summary.succeeded_count);
    assert_eq!(parsed.summary.failed_count, recording.summary.failed_count);
    assert_eq!(parsed.final_state, recording.final_state);
}

#[tokio::test]
async fn i7_cancellation_is_synchronously_observable_by_children_before_next_wait() {
    use ignition::{CancellationReason, CancellationScope};

    let root = CancellationScope::root("ignition");
    let child = root.create_child("signal:db");
    let grandchild = child.create_child("signal:db:probe");

    root.cancel(CancellationReason::ExternalCancellation, None);

    assert!(child.is_cancelled());
    assert!(grandchild.is_cancelled());
}
