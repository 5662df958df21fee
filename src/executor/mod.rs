//! The four execution strategies that drive a set of signals to a
//! terminal state: [`Parallel`](parallel), [`Sequential`](sequential),
//! [`DependencyAware`](dependency_aware), and [`Staged`](staged).

pub mod dependency_aware;
pub mod parallel;
pub mod sequential;
pub mod staged;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cancellation::{CancellationReason, CancellationScope};
use crate::error::CoordinatorError;
use crate::graph::Graph;
use crate::observer::SignalObserver;
use crate::options::CoordinatorOptions;
use crate::policy::{Policy, PolicyContext};
use crate::signal::{Signal, SignalResult, SignalStatus};

/// Selects which executor drives a coordinator's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Parallel,
    Sequential,
    DependencyAware,
    Staged,
}

/// Inter-stage progression rule for [`Staged`](staged) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Stage must complete with zero failures to advance.
    AllMustSucceed,
    /// Advance regardless of failures.
    BestEffort,
    /// First failure halts the stage; remaining stages are skipped.
    FailFast,
    /// Begin the next stage once `earlyPromotionThreshold` of the current
    /// stage has succeeded, while the rest of the stage keeps running.
    EarlyPromotion,
}

/// What an executor run produced for the coordinator to publish.
pub struct ExecutionOutcome {
    pub results: Vec<SignalResult>,
    pub timed_out: bool,
    pub stage_results: Option<Vec<crate::result::StageResult>>,
    /// Set when a FailFast-style policy denied continuation; the
    /// coordinator turns this into an `IgnitionError`.
    pub policy_stopped: bool,
}

/// Shared, cheaply-`Clone`-able execution context threaded through every
/// executor. Owning (rather than borrowing) its fields lets `run_one` be
/// spawned as an independent `'static` task per signal.
#[derive(Clone)]
pub(crate) struct ExecCtx {
    pub options: Arc<CoordinatorOptions>,
    pub root_scope: CancellationScope,
    pub ignition_start: Instant,
    pub observer: Arc<dyn SignalObserver>,
    /// Every `run_one` publishes its result here as soon as it has one, so
    /// the coordinator can assemble a partial result if a global timeout
    /// without `cancelOnGlobalTimeout` fires before the executor's own
    /// future resolves.
    pub result_tx: tokio::sync::mpsc::UnboundedSender<SignalResult>,
}

impl ExecCtx {
    pub fn elapsed(&self) -> Duration {
        self.ignition_start.elapsed()
    }
}

/// Classifies a signal's raw wait outcome into a `SignalStatus`, given the
/// scope it ran under and whether a per-signal timeout fired first.
pub(crate) fn classify(
    name: &str,
    wait: crate::signal::WaitOutcome,
    signal_scope: &CancellationScope,
    timed_out_flag: bool,
    started_at: Duration,
    completed_at: Duration,
) -> SignalResult {
    use crate::signal::WaitOutcome;

    let duration = completed_at.saturating_sub(started_at);

    if signal_scope.is_cancelled() {
        let reason = signal_scope.cancellation_reason();
        return match reason {
            CancellationReason::PerSignalTimeout | CancellationReason::GlobalTimeout => {
                SignalResult::timed_out(name, duration, reason, started_at, completed_at)
            }
            _ => SignalResult::cancelled(
                name,
                duration,
                reason,
                signal_scope.triggering_signal_name(),
                started_at,
                completed_at,
            ),
        };
    }

    match wait {
        WaitOutcome::Body(Ok(())) => SignalResult::succeeded(name, duration, started_at, completed_at),
        WaitOutcome::Body(Err(e)) => SignalResult::failed(name, duration, e.to_string(), started_at, completed_at),
        WaitOutcome::ObserverCancelled if timed_out_flag => {
            SignalResult::timed_out(name, duration, CancellationReason::PerSignalTimeout, started_at, completed_at)
        }
        WaitOutcome::ObserverCancelled => {
            SignalResult::cancelled(name, duration, CancellationReason::ExternalCancellation, None, started_at, completed_at)
        }
    }
}

/// Runs `signal` to completion under `ctx.root_scope` (or its own explicit
/// scope), honoring the configured `TimeoutStrategy`, firing lifecycle
/// hooks and observer events, and recording metrics.
pub(crate) async fn run_one(ctx: ExecCtx, signal: Signal) -> SignalResult {
    if let Some(hooks) = &ctx.options.lifecycle_hooks {
        hooks.fire_before_signal(signal.name());
    }
    ctx.observer.on_signal_started(signal.name());
    let started_at = ctx.elapsed();

    let signal_scope = signal
        .explicit_scope()
        .cloned()
        .unwrap_or_else(|| ctx.root_scope.create_child(format!("signal:{}", signal.name())));

    let (timeout, cancel_immediately) = ctx.options.timeout_strategy.get_timeout(&signal, &ctx.options);

    let (wait_outcome, timed_out_flag) = match timeout {
        None => (signal.wait(signal_scope.clone()).await, false),
        Some(timeout) => {
            tokio::select! {
                biased;
                outcome = signal.wait(signal_scope.clone()) => (outcome, false),
                () = tokio::time::sleep(timeout) => {
                    if cancel_immediately {
                        signal_scope.cancel(CancellationReason::PerSignalTimeout, None);
                        // Let the in-flight wait observe the cancellation so the
                        // scope's own triggering metadata is consistent.
                        (signal.wait(signal_scope.clone()).await, true)
                    } else {
                        (crate::signal::WaitOutcome::ObserverCancelled, true)
                    }
                }
            }
        }
    };

    let completed_at = ctx.elapsed();

    let result = classify(signal.name(), wait_outcome, &signal_scope, timed_out_flag, started_at, completed_at);

    if result.status == SignalStatus::Failed && signal.cancel_scope_on_failure() {
        if let Some(scope) = signal.explicit_scope() {
            scope.cancel(CancellationReason::DependencyFailed, Some(signal.name().to_string()));
        }
    }

    if let Some(sink) = &ctx.options.metrics {
        sink.record_signal(&result.name, result.status, result.duration);
    }
    ctx.observer.on_signal_completed(&result);
    if let Some(hooks) = &ctx.options.lifecycle_hooks {
        hooks.fire_after_signal(&result);
    }
    let _ = ctx.result_tx.send(result.clone());
    result
}

/// Evaluates the configured policy after a signal result and reports
/// whether the ignition should keep going.
pub(crate) fn should_continue(
    options: &CoordinatorOptions,
    result: &SignalResult,
    completed_signals: usize,
    total_signal_count: usize,
    elapsed_time: Duration,
    execution_mode: ExecutionMode,
    global_timeout_elapsed: bool,
) -> bool {
    let context = PolicyContext {
        signal_result: result.clone(),
        completed_signals,
        total_signal_count,
        elapsed_time,
        execution_mode,
        global_timeout_elapsed,
    };
    options.policy.should_continue(&context)
}

pub(crate) fn require_graph(options: &CoordinatorOptions) -> Result<&Graph, CoordinatorError> {
    options.graph.as_ref().ok_or(CoordinatorError::GraphlessDependencyAware)
}

pub(crate) type Semaphore = Arc<tokio::sync::Semaphore>;

pub(crate) fn make_semaphore(options: &CoordinatorOptions) -> Option<Semaphore> {
    options.max_degree_of_parallelism.map(|n| Arc::new(tokio::sync::Semaphore::new(n.get())))
}

/// Runs `signal` after acquiring a permit from `semaphore`, if present.
pub(crate) async fn run_one_gated(ctx: ExecCtx, signal: Signal, semaphore: Option<Semaphore>) -> SignalResult {
    let _permit = match &semaphore {
        Some(sem) => Some(Arc::clone(sem).acquire_owned().await.expect("semaphore never closed")),
        None => None,
    };
    run_one(ctx, signal).await
}
