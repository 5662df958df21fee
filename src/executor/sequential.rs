//! Strict insertion-order execution: one signal at a time.

use crate::signal::{Signal, SignalResult, SignalStatus};

use super::{run_one, should_continue, ExecCtx, ExecutionMode, ExecutionOutcome};

/// Runs `signals` one at a time in the given order.
///
/// When the policy denies continuation, iteration stops and the signals
/// that never started are left out of `results` entirely — matching the
/// FailFast-style contract where the coordinator throws an aggregate over
/// only the signals that actually ran. When the root scope is found
/// already cancelled before a signal starts (a global timeout with
/// `cancelOnGlobalTimeout=true`, most commonly), every remaining signal is
/// instead recorded as `Skipped` so callers can see what was pending.
pub(crate) async fn run(ctx: ExecCtx, signals: Vec<Signal>) -> ExecutionOutcome {
    let total = signals.len();
    let mut results = Vec::with_capacity(total);
    let mut policy_stopped = false;

    let mut remaining = signals.into_iter();
    while let Some(signal) = remaining.next() {
        if ctx.root_scope.is_cancelled() {
            let at = ctx.elapsed();
            results.push(SignalResult::skipped(signal.name(), Vec::new(), at));
            for leftover in remaining {
                results.push(SignalResult::skipped(leftover.name(), Vec::new(), at));
            }
            break;
        }

        let result = run_one(ctx.clone(), signal).await;
        let elapsed = ctx.elapsed();
        let keep_going = should_continue(
            &ctx.options,
            &result,
            results.len() + 1,
            total,
            elapsed,
            ExecutionMode::Sequential,
            false,
        );
        results.push(result);

        if !keep_going {
            policy_stopped = true;
            break;
        }
    }

    let timed_out = results.iter().any(|r| r.status == SignalStatus::TimedOut);
    ExecutionOutcome { results, timed_out, stage_results: None, policy_stopped }
}
