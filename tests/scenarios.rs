//! End-to-end ignition scenarios.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ignition::{
    BuiltinPolicy, Coordinator, CoordinatorOptions, CoordinatorState, ExecutionMode, GraphBuilder, Signal,
    SignalStatus, StagePolicy,
};

fn immediate(name: &str) -> Signal {
    Signal::new(name, |_| async { Ok(()) })
}

fn sleeping(name: &str, millis: u64) -> Signal {
    let millis = millis;
    Signal::new(name, move |_| async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    })
}

#[tokio::test]
async fn scenario_1_parallel_success_two_signals() {
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel)
        .global_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let coordinator = Coordinator::new(vec![immediate("s1"), sleeping("s2", 20)], options).unwrap();

    let result = coordinator.wait_all().await.unwrap();
    assert_eq!(coordinator.state(), CoordinatorState::Completed);
    assert_eq!(result.results.len(), 2);
    assert!(result.results.iter().all(|r| r.status == SignalStatus::Succeeded));
    assert!(result.total_duration >= Duration::from_millis(20));
    assert!(result.total_duration < Duration::from_secs(1));
}

#[tokio::test]
async fn scenario_2_sequential_fail_fast_stops_before_later() {
    let later_invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&later_invoked);

    let bad = Signal::new("bad", |_| async { Err("InvalidOperation".into()) });
    let later = Signal::new("later", move |_| {
        let flag = Arc::clone(&flag);
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }
    });

    let options =
        CoordinatorOptions::builder(ExecutionMode::Sequential).policy(BuiltinPolicy::FailFast).build().unwrap();
    let coordinator = Coordinator::new(vec![bad, later], options).unwrap();

    let err = coordinator.wait_all().await.unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].name, "bad");
    assert_eq!(err.failures[0].exception.as_deref(), Some("InvalidOperation"));
    assert!(!later_invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn scenario_3_per_signal_timeout_does_not_fail_whole_ignition() {
    let slow = Signal::new("t-out", |_| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    })
    .with_timeout(Duration::from_millis(50));
    let fast = immediate("fast");

    let options = CoordinatorOptions::builder(ExecutionMode::Parallel)
        .cancel_individual_on_timeout(true)
        .build()
        .unwrap();
    let coordinator = Coordinator::new(vec![slow, fast], options).unwrap();

    let result = coordinator.wait_all().await.unwrap();
    let t_out = result.results.iter().find(|r| r.name == "t-out").unwrap();
    let fast = result.results.iter().find(|r| r.name == "fast").unwrap();

    assert_eq!(t_out.status, SignalStatus::TimedOut);
    assert_eq!(fast.status, SignalStatus::Succeeded);
    assert!(!result.timed_out, "only the per-signal handle should have timed out, not the whole ignition");
}

#[tokio::test]
async fn scenario_4_dag_diamond_respects_topo_order() {
    let mut builder = GraphBuilder::new();
    builder.add_signal(immediate("s1")).unwrap();
    builder.add_signal(immediate("s2")).unwrap();
    builder.add_signal(immediate("s3")).unwrap();
    builder.add_signal(immediate("s4")).unwrap();
    builder.depends_on("s2", &["s1"]).unwrap();
    builder.depends_on("s3", &["s1"]).unwrap();
    builder.depends_on("s4", &["s2", "s3"]).unwrap();
    let graph = builder.build().unwrap();

    let order: Vec<&str> = graph.signals().iter().map(Signal::name).collect();
    assert_eq!(order.first(), Some(&"s1"));
    assert_eq!(order.last(), Some(&"s4"));

    let options = CoordinatorOptions::builder(ExecutionMode::DependencyAware).graph(graph).build().unwrap();
    let coordinator = Coordinator::new(Vec::new(), options).unwrap();
    let result = coordinator.wait_all().await.unwrap();

    assert_eq!(result.results.len(), 4);
    assert!(result.results.iter().all(|r| r.status == SignalStatus::Succeeded));

    let by_name = |name: &str| result.results.iter().find(|r| r.name == name).unwrap();
    assert!(by_name("s2").started_at.unwrap() >= by_name("s1").completed_at.unwrap());
    assert!(by_name("s3").started_at.unwrap() >= by_name("s1").completed_at.unwrap());
    assert!(by_name("s4").started_at.unwrap() >= by_name("s2").completed_at.unwrap());
    assert!(by_name("s4").started_at.unwrap() >= by_name("s3").completed_at.unwrap());
}

#[tokio::test]
async fn scenario_5_dag_failure_cascade_skips_without_running_body() {
    let s2_invoked = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&s2_invoked);

    let mut builder = GraphBuilder::new();
    builder.add_signal(Signal::new("s1", |_| async { Err("boom".into()) })).unwrap();
    builder
        .add_signal(Signal::new("s2", move |_| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        }))
        .unwrap();
    builder.add_signal(immediate("s3")).unwrap();
    builder.depends_on("s2", &["s1"]).unwrap();
    builder.depends_on("s3", &["s2"]).unwrap();
    let graph = builder.build().unwrap();

    let options = CoordinatorOptions::builder(ExecutionMode::DependencyAware).graph(graph).build().unwrap();
    let coordinator = Coordinator::new(Vec::new(), options).unwrap();
    let result = coordinator.wait_all().await.unwrap();

    let s2 = result.results.iter().find(|r| r.name == "s2").unwrap();
    let s3 = result.results.iter().find(|r| r.name == "s3").unwrap();
    assert_eq!(s2.status, SignalStatus::Skipped);
    assert_eq!(s2.failed_dependencies, vec!["s1".to_string()]);
    assert_eq!(s3.status, SignalStatus::Skipped);
    assert_eq!(s3.failed_dependencies, vec!["s2".to_string()]);
    assert!(!s2_invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn scenario_6_staged_early_promotion_overlaps_stages() {
    let stage1_started_before_slow_finished = Arc::new(AtomicBool::new(false));
    let slow_finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stage1_started_before_slow_finished);
    let slow_flag = Arc::clone(&slow_finished);

    let quick_a = immediate("quick-a").with_stage(0);
    let quick_b = immediate("quick-b").with_stage(0);
    let slow = sleeping("slow", 200).with_stage(0);
    let stage1 = Signal::new("stage1-signal", move |_| {
        let flag = Arc::clone(&flag);
        let slow_flag = Arc::clone(&slow_flag);
        async move {
            flag.store(!slow_flag.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        }
    })
    .with_stage(1);

    let options = CoordinatorOptions::builder(ExecutionMode::Staged)
        .stage_policy(StagePolicy::EarlyPromotion)
        .early_promotion_threshold(0.66)
        .build()
        .unwrap();
    let coordinator = Coordinator::new(vec![quick_a, quick_b, slow, stage1], options).unwrap();
    let result = coordinator.wait_all().await.unwrap();

    assert!(result.results.iter().all(|r| r.status == SignalStatus::Succeeded));
    let stage0 = result.stage_results.as_ref().unwrap().iter().find(|s| s.stage_number == 0).unwrap();
    assert!(stage0.promoted);
    assert!(stage1_started_before_slow_finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn boundary_b1_zero_signals_fires_both_ignition_hooks() {
    use ignition::LifecycleHooks;

    let before = Arc::new(AtomicU32::new(0));
    let after = Arc::new(AtomicU32::new(0));
    let b = Arc::clone(&before);
    let a = Arc::clone(&after);

    let hooks = LifecycleHooks::new()
        .on_before_ignition(move || {
            b.fetch_add(1, Ordering::SeqCst);
        })
        .on_after_ignition(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

    let options = CoordinatorOptions::builder(ExecutionMode::Parallel).lifecycle_hooks(hooks).build().unwrap();
    let coordinator = Coordinator::new(Vec::new(), options).unwrap();
    let result = coordinator.wait_all().await.unwrap();

    assert_eq!(coordinator.state(), CoordinatorState::Completed);
    assert!(result.results.is_empty());
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn boundary_b2_zero_global_timeout_is_an_immediate_cutoff() {
    let slow = sleeping("slow", 50);
    let options =
        CoordinatorOptions::builder(ExecutionMode::Parallel).global_timeout(Duration::ZERO).build().unwrap();
    let coordinator = Coordinator::new(vec![slow], options).unwrap();

    let result = coordinator.wait_all().await.unwrap();
    assert!(result.timed_out);
}

#[tokio::test]
async fn global_timeout_classifies_in_flight_signal_as_timed_out_not_cancelled() {
    let slow = sleeping("slow", 200);
    let options = CoordinatorOptions::builder(ExecutionMode::Parallel)
        .global_timeout(Duration::from_millis(20))
        .cancel_on_global_timeout(true)
        .build()
        .unwrap();
    let coordinator = Coordinator::new(vec![slow], options).unwrap();

    let result = coordinator.wait_all().await.unwrap();
    assert!(result.timed_out);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].status, SignalStatus::TimedOut);
}

#[tokio::test]
async fn boundary_b3_max_parallelism_one_is_observably_sequential() {
    let concurrent = Arc::new(std::sync::atomic::AtomicI32::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicI32::new(0));

    let make = |name: &'static str| {
        let concurrent = Arc::clone(&concurrent);
        let peak = Arc::clone(&peak);
        Signal::new(name, move |_| {
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            async move {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    let options =
        CoordinatorOptions::builder(ExecutionMode::Parallel).max_degree_of_parallelism(1).build().unwrap();
    let coordinator = Coordinator::new(vec![make("a"), make("b"), make("c")], options).unwrap();
    let result = coordinator.wait_all().await.unwrap();

    assert_eq!(result.results.len(), 3);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn boundary_b4_body_error_before_yielding_is_failed() {
    let signal = Signal::new("bad", |_| async { Err("thrown immediately".into()) });
    let options = CoordinatorOptions::builder(ExecutionMode::Sequential).build().unwrap();
    let coordinator = Coordinator::new(vec![signal], options).unwrap();

    let result = coordinator.wait_all().await.unwrap();
    let bad = &result.results[0];
    assert_eq!(bad.status, SignalStatus::Failed);
    assert_eq!(bad.exception.as_deref(), Some("thrown immediately"));
}

#[test]
fn boundary_b5_self_loop_and_two_cycle_are_configuration_errors() {
    let mut self_loop = GraphBuilder::new();
    self_loop.add_signal(immediate("a")).unwrap();
    self_loop.depends_on("a", &["a"]).unwrap();
    assert!(self_loop.build().is_err());

    let mut two_cycle = GraphBuilder::new();
    two_cycle.add_signal(immediate("a")).unwrap();
    two_cycle.add_signal(immediate("b")).unwrap();
    two_cycle.depends_on("a", &["b"]).unwrap();
    two_cycle.depends_on("b", &["a"]).unwrap();
    assert!(two_cycle.build().is_err());
}
