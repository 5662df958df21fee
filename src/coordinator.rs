//! The coordinator: owns one ignition's signals, drives the configured
//! executor, and materializes a single, idempotently-shared [`IgnitionResult`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::{mpsc, OnceCell};

use crate::cancellation::{CancellationReason, CancellationScope};
use crate::error::{CoordinatorError, CoordinatorResult, IgnitionError};
use crate::executor::{dependency_aware, parallel, sequential, staged, ExecCtx, ExecutionMode, ExecutionOutcome};
use crate::factory::{IgnitionContext, SignalFactory};
use crate::observer::{CompositeObserver, SignalObserver};
use crate::options::CoordinatorOptions;
use crate::result::IgnitionResult;
use crate::signal::{Signal, SignalResult, SignalStatus};

/// Coordinator lifecycle state. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    NotStarted,
    Running,
    Completed,
    Failed,
    TimedOut,
}

/// Drives a fixed set of signals to a terminal state exactly once.
///
/// A `Coordinator` is single-use: the first call to [`wait_all`](Self::wait_all)
/// performs the ignition; every later call (concurrent or sequential)
/// shares that same drive and returns its cached outcome.
pub struct Coordinator {
    options: Arc<CoordinatorOptions>,
    signals: Vec<Signal>,
    observer: Arc<dyn SignalObserver>,
    state: Mutex<CoordinatorState>,
    outcome: OnceCell<Result<IgnitionResult, IgnitionError>>,
}

impl Coordinator {
    /// Creates a coordinator with a no-op observer.
    pub fn new(signals: Vec<Signal>, options: CoordinatorOptions) -> CoordinatorResult<Self> {
        Self::with_observer(signals, options, Arc::new(CompositeObserver::new()))
    }

    pub fn with_observer(
        signals: Vec<Signal>,
        options: CoordinatorOptions,
        observer: Arc<dyn SignalObserver>,
    ) -> CoordinatorResult<Self> {
        let options = Arc::new(options);
        let effective = effective_signals(&signals, &options);
        let mut seen = HashSet::with_capacity(effective.len());
        for signal in &effective {
            if !seen.insert(signal.name().to_string()) {
                return Err(CoordinatorError::DuplicateSignal(signal.name().to_string()));
            }
        }

        Ok(Self {
            options,
            signals,
            observer,
            state: Mutex::new(CoordinatorState::NotStarted),
            outcome: OnceCell::new(),
        })
    }

    pub fn state(&self) -> CoordinatorState {
        *self.state.lock().unwrap()
    }

    /// Drives the ignition to completion (first caller) or returns the
    /// already-materialized outcome (every other caller, concurrent or
    /// not). Raises the aggregate [`IgnitionError`] when the configured
    /// policy denied continuation (FailFast-style).
    pub async fn wait_all(&self) -> Result<IgnitionResult, IgnitionError> {
        self.outcome.get_or_init(|| self.drive()).await.clone()
    }

    /// The last materialized result, if the ignition has completed
    /// without raising an aggregate error.
    ///
    /// After a FailFast-style aggregate, this mirrors `wait_all`'s
    /// termination and returns `None` — callers that need the
    /// partially-collected results should inspect the `IgnitionError`
    /// itself, which carries every non-`Succeeded` outcome collected
    /// before the policy stopped.
    pub fn get_result(&self) -> Option<IgnitionResult> {
        self.outcome.get().and_then(|r| r.as_ref().ok().cloned())
    }

    /// Exports the last materialized result as a [`crate::recording::Recording`].
    /// Returns `None` before the first `wait_all` or after a FailFast-style
    /// aggregate (mirrors `get_result`).
    #[cfg(feature = "recording")]
    pub fn record(&self, metadata: Option<serde_json::Value>) -> Option<crate::recording::Recording> {
        let result = self.get_result()?;
        let recording_id = chrono::Utc::now().format("ignition-%Y%m%dT%H%M%S%.9f").to_string();
        Some(crate::recording::Recording::from_ignition(
            &result,
            &self.options,
            self.state(),
            recording_id,
            chrono::Utc::now(),
            &self.dependency_map(),
            metadata,
        ))
    }

    #[cfg(feature = "recording")]
    fn dependency_map(&self) -> HashMap<String, Vec<String>> {
        match &self.options.graph {
            Some(graph) => graph
                .signals()
                .iter()
                .map(|s| (s.name().to_string(), graph.get_dependencies(s.name()).into_iter().map(str::to_string).collect()))
                .collect(),
            None => HashMap::new(),
        }
    }

    async fn drive(&self) -> Result<IgnitionResult, IgnitionError> {
        *self.state.lock().unwrap() = CoordinatorState::Running;
        if let Some(hooks) = &self.options.lifecycle_hooks {
            hooks.fire_before_ignition();
        }

        let root_scope = CancellationScope::root("ignition");
        let ignition_start = Instant::now();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let ctx = ExecCtx {
            options: Arc::clone(&self.options),
            root_scope: root_scope.clone(),
            ignition_start,
            observer: Arc::clone(&self.observer),
            result_tx,
        };

        let signals = effective_signals(&self.signals, &self.options);
        let exec_ctx = ctx.clone();
        let options = Arc::clone(&self.options);
        let mut exec_handle = tokio::spawn(async move { run_with_mode(exec_ctx, signals, &options).await });

        let (outcome, global_timed_out) = match self.options.global_timeout {
            None => (exec_handle.await.expect("executor task panicked"), false),
            Some(timeout) => {
                tokio::select! {
                    biased;
                    outcome = &mut exec_handle => (outcome.expect("executor task panicked"), false),
                    () = tokio::time::sleep(timeout) => {
                        self.observer.on_global_timeout_reached();
                        if self.options.cancel_on_global_timeout {
                            root_scope.cancel(CancellationReason::GlobalTimeout, None);
                            (exec_handle.await.expect("executor task panicked"), true)
                        } else {
                            let mut partial = Vec::new();
                            while let Ok(result) = result_rx.try_recv() {
                                partial.push(result);
                            }
                            (ExecutionOutcome { results: partial, timed_out: true, stage_results: None, policy_stopped: false }, true)
                        }
                    }
                }
            }
        };

        let total_duration = ctx.elapsed();
        let timed_out = global_timed_out || outcome.timed_out;
        let ignition_result = IgnitionResult {
            total_duration,
            results: outcome.results,
            timed_out,
            stage_results: outcome.stage_results,
        };

        if let Some(sink) = &self.options.metrics {
            sink.record_ignition(total_duration, timed_out);
        }
        self.observer.on_coordinator_completed(&ignition_result);
        if let Some(hooks) = &self.options.lifecycle_hooks {
            hooks.fire_after_ignition(&ignition_result);
        }

        let final_state = if ignition_result.results.iter().any(|r| r.status == SignalStatus::Failed) {
            CoordinatorState::Failed
        } else if timed_out || ignition_result.results.iter().any(|r| r.status == SignalStatus::TimedOut) {
            CoordinatorState::TimedOut
        } else {
            CoordinatorState::Completed
        };
        *self.state.lock().unwrap() = final_state;

        if outcome.policy_stopped {
            let failures: Vec<SignalResult> =
                ignition_result.results.into_iter().filter(|r| r.status != SignalStatus::Succeeded).collect();
            Err(IgnitionError::new(failures))
        } else {
            Ok(ignition_result)
        }
    }
}

fn effective_signals(signals: &[Signal], options: &CoordinatorOptions) -> Vec<Signal> {
    match (&options.graph, options.execution_mode) {
        (Some(graph), ExecutionMode::DependencyAware) => graph.signals().to_vec(),
        _ => signals.to_vec(),
    }
}

async fn run_with_mode(ctx: ExecCtx, signals: Vec<Signal>, options: &CoordinatorOptions) -> ExecutionOutcome {
    match options.execution_mode {
        ExecutionMode::Parallel => parallel::run(ctx, signals).await,
        ExecutionMode::Sequential => sequential::run(ctx, signals).await,
        ExecutionMode::Staged => staged::run(ctx, signals).await,
        ExecutionMode::DependencyAware => {
            let graph = options.graph.as_ref().expect("validated at CoordinatorOptions::build time");
            dependency_aware::run(ctx, graph).await
        }
    }
}

/// Collects signals and deferred [`SignalFactory`]s into a [`Coordinator`],
/// resolving factories against an [`IgnitionContext`] at `build` time.
pub struct CoordinatorBuilder {
    signals: Vec<Signal>,
    factories: Vec<SignalFactory>,
    options: CoordinatorOptions,
    observer: Arc<dyn SignalObserver>,
}

impl CoordinatorBuilder {
    pub fn new(options: CoordinatorOptions) -> Self {
        Self { signals: Vec::new(), factories: Vec::new(), options, observer: Arc::new(CompositeObserver::new()) }
    }

    #[must_use]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signals.push(signal);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: SignalFactory) -> Self {
        self.factories.push(factory);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl SignalObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Materializes every registered factory against `context`, then
    /// constructs the coordinator.
    pub fn build(self, context: &IgnitionContext) -> CoordinatorResult<Coordinator> {
        let mut signals = self.signals;
        signals.extend(self.factories.iter().map(|factory| factory.create(context)));
        Coordinator::with_observer(signals, self.options, self.observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BuiltinPolicy;
    use std::time::Duration;

    fn ok(name: &str) -> Signal {
        Signal::new(name, |_| async { Ok(()) })
    }

    fn failing(name: &str) -> Signal {
        Signal::new(name, |_| async { Err("boom".into()) })
    }

    #[tokio::test]
    async fn zero_signals_completes_immediately() {
        let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
        let coordinator = Coordinator::new(Vec::new(), options).unwrap();
        let result = coordinator.wait_all().await.unwrap();
        assert!(result.results.is_empty());
        assert_eq!(coordinator.state(), CoordinatorState::Completed);
    }

    #[tokio::test]
    async fn wait_all_is_idempotent_across_concurrent_callers() {
        let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
        let coordinator = Arc::new(Coordinator::new(vec![ok("s1"), ok("s2")], options).unwrap());

        let a = Arc::clone(&coordinator);
        let b = Arc::clone(&coordinator);
        let (ra, rb) = tokio::join!(tokio::spawn(async move { a.wait_all().await }), tokio::spawn(async move { b.wait_all().await }));

        let ra = ra.unwrap().unwrap();
        let rb = rb.unwrap().unwrap();
        assert_eq!(ra.total_duration, rb.total_duration);
        assert_eq!(ra.results.len(), 2);
    }

    #[tokio::test]
    async fn fail_fast_raises_aggregate_and_skips_result() {
        let options = CoordinatorOptions::builder(ExecutionMode::Sequential).policy(BuiltinPolicy::FailFast).build().unwrap();
        let coordinator = Coordinator::new(vec![failing("bad"), ok("later")], options).unwrap();

        let err = coordinator.wait_all().await.unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].name, "bad");
        assert!(coordinator.get_result().is_none());
    }

    #[tokio::test]
    async fn global_timeout_without_cancel_returns_partial_results() {
        let fast = ok("fast");
        let slow = Signal::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });

        let options = CoordinatorOptions::builder(ExecutionMode::Parallel)
            .global_timeout(Duration::from_millis(20))
            .build()
            .unwrap();
        let coordinator = Coordinator::new(vec![fast, slow], options).unwrap();

        let result = coordinator.wait_all().await.unwrap();
        assert!(result.timed_out);
        assert!(result.results.len() <= 1);
    }

    #[cfg(feature = "recording")]
    #[tokio::test]
    async fn records_after_successful_ignition() {
        let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
        let coordinator = Coordinator::new(vec![ok("db")], options).unwrap();
        coordinator.wait_all().await.unwrap();

        let recording = coordinator.record(None).expect("recording available after success");
        assert_eq!(recording.signals.len(), 1);
        assert_eq!(recording.final_state, "Completed");
    }

    #[cfg(feature = "recording")]
    #[test]
    fn record_before_ignition_is_none() {
        let options = CoordinatorOptions::builder(ExecutionMode::Parallel).build().unwrap();
        let coordinator = Coordinator::new(vec![ok("db")], options).unwrap();
        assert!(coordinator.record(None).is_none());
    }
}
