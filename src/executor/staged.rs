//! Stage-ordered waves with pluggable inter-stage progression.
//!
//! Stages run as independent tasks gated by a `Notify`: stage `i+1`'s
//! task blocks on its gate until stage `i` either finishes (the three
//! non-`EarlyPromotion` policies) or crosses its success threshold
//! (`EarlyPromotion`, which releases the gate while the rest of stage `i`
//! keeps running). A stage-boundary policy that halts progression sets a
//! single shared flag that every later, not-yet-started stage checks
//! before running, turning it into an all-`Skipped` `StageResult` instead.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::cancellation::CancellationReason;
use crate::result::StageResult;
use crate::signal::{Signal, SignalResult, SignalStatus};

use super::{make_semaphore, run_one_gated, should_continue, ExecCtx, ExecutionMode, ExecutionOutcome, Semaphore, StagePolicy};

pub(crate) async fn run(ctx: ExecCtx, signals: Vec<Signal>) -> ExecutionOutcome {
    let total = signals.len();
    let mut grouped: BTreeMap<usize, Vec<Signal>> = BTreeMap::new();
    for signal in signals {
        grouped.entry(signal.stage()).or_default().push(signal);
    }

    let stage_count = grouped.len();
    if stage_count == 0 {
        return ExecutionOutcome { results: Vec::new(), timed_out: false, stage_results: Some(Vec::new()), policy_stopped: false };
    }

    let gates: Vec<Arc<Notify>> = (0..stage_count).map(|_| Arc::new(Notify::new())).collect();
    let halted = Arc::new(AtomicBool::new(false));
    let policy_stopped = Arc::new(AtomicBool::new(false));
    let completed_counter = Arc::new(AtomicUsize::new(0));
    let semaphore = make_semaphore(&ctx.options);

    let mut handles = Vec::with_capacity(stage_count);
    for (idx, (stage_number, stage_signals)) in grouped.into_iter().enumerate() {
        let gate = Arc::clone(&gates[idx]);
        let next_gate = gates.get(idx + 1).cloned();
        let halted = Arc::clone(&halted);
        let policy_stopped = Arc::clone(&policy_stopped);
        let completed_counter = Arc::clone(&completed_counter);
        let has_next = idx + 1 < stage_count;
        let stage_ctx = ctx.clone();
        let stage_semaphore = semaphore.clone();

        handles.push(tokio::spawn(async move {
            if idx > 0 {
                gate.notified().await;
            }
            run_one_stage(
                stage_ctx,
                stage_number,
                stage_signals,
                stage_semaphore,
                halted,
                next_gate,
                has_next,
                policy_stopped,
                completed_counter,
                total,
            )
            .await
        }));
    }

    let mut stage_results = Vec::with_capacity(stage_count);
    let mut results = Vec::with_capacity(total);
    for handle in handles {
        let stage_result = handle.await.expect("stage task panicked");
        results.extend(stage_result.results.iter().cloned());
        stage_results.push(stage_result);
    }

    let timed_out = results.iter().any(|r| r.status == SignalStatus::TimedOut);
    ExecutionOutcome {
        results,
        timed_out,
        stage_results: Some(stage_results),
        policy_stopped: policy_stopped.load(Ordering::Acquire),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_one_stage(
    ctx: ExecCtx,
    stage_number: usize,
    stage_signals: Vec<Signal>,
    semaphore: Option<Semaphore>,
    halted: Arc<AtomicBool>,
    next_gate: Option<Arc<Notify>>,
    has_next: bool,
    policy_stopped: Arc<AtomicBool>,
    completed_counter: Arc<AtomicUsize>,
    total_signal_count: usize,
) -> StageResult {
    let stage_len = stage_signals.len();
    let started_at = ctx.elapsed();

    if halted.load(Ordering::Acquire) {
        let results: Vec<SignalResult> =
            stage_signals.iter().map(|s| SignalResult::skipped(s.name(), Vec::new(), started_at)).collect();
        if let Some(gate) = &next_gate {
            gate.notify_one();
        }
        return StageResult::tally(stage_number, Duration::ZERO, results, false);
    }

    let stage_policy = ctx.options.stage_policy;
    let threshold = ctx.options.early_promotion_threshold;

    let mut set = JoinSet::new();
    for signal in stage_signals {
        set.spawn(run_one_gated(ctx.clone(), signal, semaphore.clone()));
    }

    let mut results = Vec::with_capacity(stage_len);
    let mut succeeded = 0usize;
    let mut promoted = false;

    while let Some(joined) = set.join_next().await {
        let result = joined.expect("signal task panicked");
        if result.status == SignalStatus::Succeeded {
            succeeded += 1;
        }

        let completed_signals = completed_counter.fetch_add(1, Ordering::AcqRel) + 1;
        if !policy_stopped.load(Ordering::Acquire) {
            let elapsed = ctx.elapsed();
            let keep_going = should_continue(
                &ctx.options,
                &result,
                completed_signals,
                total_signal_count,
                elapsed,
                ExecutionMode::Staged,
                false,
            );
            if !keep_going {
                policy_stopped.store(true, Ordering::Release);
                ctx.root_scope.cancel(CancellationReason::BundleCancelled, Some(result.name.clone()));
            }
        }

        results.push(result);

        if has_next && !promoted && stage_policy == StagePolicy::EarlyPromotion {
            let fraction = succeeded as f64 / stage_len as f64;
            if fraction >= threshold {
                promoted = true;
                if let Some(gate) = &next_gate {
                    gate.notify_one();
                }
            }
        }
    }

    let failed = results.iter().filter(|r| r.status == SignalStatus::Failed).count();

    if !promoted {
        let halt_next = match stage_policy {
            StagePolicy::AllMustSucceed => succeeded != results.len(),
            StagePolicy::FailFast => failed > 0,
            StagePolicy::BestEffort | StagePolicy::EarlyPromotion => false,
        };
        if halt_next {
            halted.store(true, Ordering::Release);
        }
        if let Some(gate) = &next_gate {
            gate.notify_one();
        }
    }

    let duration = ctx.elapsed().saturating_sub(started_at);
    StageResult::tally(stage_number, duration, results, promoted)
}
