//! Concurrent fan-out of every signal under the root scope.

use tokio::task::JoinSet;

use crate::cancellation::CancellationReason;
use crate::signal::{Signal, SignalStatus};

use super::{make_semaphore, run_one_gated, should_continue, ExecCtx, ExecutionMode, ExecutionOutcome};

pub(crate) async fn run(ctx: ExecCtx, signals: Vec<Signal>) -> ExecutionOutcome {
    let total = signals.len();
    let semaphore = make_semaphore(&ctx.options);

    let mut set = JoinSet::new();
    for signal in signals {
        let task_ctx = ctx.clone();
        let task_semaphore = semaphore.clone();
        set.spawn(run_one_gated(task_ctx, signal, task_semaphore));
    }

    let mut results = Vec::with_capacity(total);
    let mut policy_stopped = false;

    while let Some(joined) = set.join_next().await {
        let result = joined.expect("signal task panicked");
        let elapsed = ctx.elapsed();
        let keep_going = should_continue(
            &ctx.options,
            &result,
            results.len() + 1,
            total,
            elapsed,
            ExecutionMode::Parallel,
            false,
        );
        results.push(result);

        if !keep_going && !policy_stopped {
            policy_stopped = true;
            let last = results.last().expect("just pushed");
            ctx.root_scope.cancel(CancellationReason::BundleCancelled, Some(last.name.clone()));
        }
    }

    let timed_out = results.iter().any(|r| r.status == SignalStatus::TimedOut);

    ExecutionOutcome { results, timed_out, stage_results: None, policy_stopped }
}
