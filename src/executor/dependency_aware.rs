//! Ready-queue scheduling over a signal dependency graph.
//!
//! A node becomes ready when every dependency has reached a terminal
//! state. A failed or timed-out node does not merely block its direct
//! children: every transitive dependent is finalized immediately as
//! `Skipped` (or `Cancelled`, under `cancelDependentsOnFailure`) without
//! ever running its body, and that finalization itself cascades further
//! down the graph the same way a real completion would.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::cancellation::CancellationReason;
use crate::graph::Graph;
use crate::signal::{Signal, SignalResult, SignalStatus};

use super::{make_semaphore, run_one_gated, should_continue, ExecCtx, ExecutionMode, ExecutionOutcome, Semaphore};

pub(crate) async fn run(ctx: ExecCtx, graph: &Graph) -> ExecutionOutcome {
    let total = graph.signals().len();
    if total == 0 {
        return ExecutionOutcome { results: Vec::new(), timed_out: false, stage_results: None, policy_stopped: false };
    }

    let by_name: HashMap<&str, &Signal> = graph.signals().iter().map(|s| (s.name(), s)).collect();
    let mut in_degree: HashMap<String, usize> =
        graph.signals().iter().map(|s| (s.name().to_string(), graph.get_dependencies(s.name()).len())).collect();
    let mut failed_ancestors: HashMap<String, Vec<String>> = HashMap::new();
    let mut finalized: HashMap<String, SignalResult> = HashMap::new();
    let mut spawned: HashSet<String> = HashSet::new();
    let mut policy_stopped = false;

    let semaphore = make_semaphore(&ctx.options);
    let mut set: JoinSet<SignalResult> = JoinSet::new();
    let mut pending: VecDeque<String> = VecDeque::new();

    for name in in_degree.iter().filter(|(_, &deg)| deg == 0).map(|(n, _)| n.clone()).collect::<Vec<_>>() {
        spawn(&ctx, &semaphore, &mut set, by_name[name.as_str()].clone());
        spawned.insert(name);
    }

    loop {
        drain_ready(
            &mut pending,
            graph,
            &ctx,
            &semaphore,
            &mut set,
            &by_name,
            &mut in_degree,
            &mut failed_ancestors,
            &mut finalized,
            &mut spawned,
            policy_stopped,
            ctx.options.cancel_dependents_on_failure,
        );

        if set.is_empty() {
            break;
        }

        let result = set.join_next().await.expect("set not empty").expect("signal task panicked");
        let elapsed = ctx.elapsed();

        if !policy_stopped {
            let keep_going = should_continue(
                &ctx.options,
                &result,
                finalized.len() + 1,
                total,
                elapsed,
                ExecutionMode::DependencyAware,
                false,
            );
            if !keep_going {
                policy_stopped = true;
                ctx.root_scope.cancel(CancellationReason::BundleCancelled, Some(result.name.clone()));
            }
        }

        if result.status == SignalStatus::Failed || result.status == SignalStatus::TimedOut {
            for dependent in graph.get_dependents(&result.name) {
                if !finalized.contains_key(dependent) {
                    failed_ancestors.entry(dependent.to_string()).or_default().push(result.name.clone());
                }
            }
        }

        pending.push_back(result.name.clone());
        finalized.insert(result.name.clone(), result);
    }

    let results: Vec<SignalResult> =
        graph.signals().iter().map(|s| finalized.remove(s.name()).expect("every signal finalized")).collect();

    let timed_out = results.iter().any(|r| r.status == SignalStatus::TimedOut);
    ExecutionOutcome { results, timed_out, stage_results: None, policy_stopped }
}

#[allow(clippy::too_many_arguments)]
fn drain_ready(
    pending: &mut VecDeque<String>,
    graph: &Graph,
    ctx: &ExecCtx,
    semaphore: &Option<Semaphore>,
    set: &mut JoinSet<SignalResult>,
    by_name: &HashMap<&str, &Signal>,
    in_degree: &mut HashMap<String, usize>,
    failed_ancestors: &mut HashMap<String, Vec<String>>,
    finalized: &mut HashMap<String, SignalResult>,
    spawned: &mut HashSet<String>,
    policy_stopped: bool,
    cancel_dependents_on_failure: bool,
) {
    while let Some(name) = pending.pop_front() {
        let at = ctx.elapsed();
        for dependent in graph.get_dependents(&name) {
            if spawned.contains(dependent) || finalized.contains_key(dependent) {
                continue;
            }
            let degree = in_degree.get_mut(dependent).expect("known node");
            *degree -= 1;
            if *degree > 0 {
                continue;
            }

            if let Some(ancestors) = failed_ancestors.remove(dependent) {
                let result = finalize_cascaded(dependent, ancestors, cancel_dependents_on_failure, at);
                let cascades_further = matches!(result.status, SignalStatus::Skipped | SignalStatus::Cancelled);
                finalized.insert(dependent.to_string(), result);
                if cascades_further {
                    for grandchild in graph.get_dependents(dependent) {
                        failed_ancestors.entry(grandchild.to_string()).or_default().push(dependent.to_string());
                    }
                }
                pending.push_back(dependent.to_string());
            } else if policy_stopped {
                finalized.insert(dependent.to_string(), SignalResult::skipped(dependent, Vec::new(), at));
                pending.push_back(dependent.to_string());
            } else {
                spawn(ctx, semaphore, set, by_name[dependent].clone());
                spawned.insert(dependent.to_string());
            }
        }
    }
}

fn finalize_cascaded(name: &str, ancestors: Vec<String>, cancel_dependents: bool, at: Duration) -> SignalResult {
    if cancel_dependents {
        let cancelled_by = ancestors.first().cloned();
        let mut result =
            SignalResult::cancelled(name, Duration::ZERO, CancellationReason::DependencyFailed, cancelled_by, at, at);
        result.failed_dependencies = ancestors;
        result
    } else {
        SignalResult::skipped(name, ancestors, at)
    }
}

fn spawn(ctx: &ExecCtx, semaphore: &Option<Semaphore>, set: &mut JoinSet<SignalResult>, signal: Signal) {
    set.spawn(run_one_gated(ctx.clone(), signal, semaphore.clone()));
}
