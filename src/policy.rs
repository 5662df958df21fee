//! Continuation policy: decides whether the ignition keeps going after
//! each signal reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use crate::executor::ExecutionMode;
use crate::signal::{SignalResult, SignalStatus};

/// Immutable snapshot passed to a policy after each signal completes.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub signal_result: SignalResult,
    pub completed_signals: usize,
    pub total_signal_count: usize,
    pub elapsed_time: Duration,
    pub execution_mode: ExecutionMode,
    pub global_timeout_elapsed: bool,
}

/// A pure predicate deciding whether the ignition continues.
pub trait Policy: Send + Sync {
    /// Returns `true` to continue driving remaining signals, `false` to
    /// stop (the coordinator then cancels the root scope with reason
    /// `BundleCancelled`).
    fn should_continue(&self, context: &PolicyContext) -> bool;
}

/// Built-in policy variants, resolved when no `customPolicy` predicate is
/// supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinPolicy {
    /// Continue iff the just-completed signal succeeded.
    FailFast,
    /// Always continue.
    BestEffort,
    /// Continue iff the outcome is not `Failed` (timeouts are tolerated).
    ContinueOnTimeout,
}

impl Policy for BuiltinPolicy {
    fn should_continue(&self, context: &PolicyContext) -> bool {
        match self {
            BuiltinPolicy::FailFast => context.signal_result.status == SignalStatus::Succeeded,
            BuiltinPolicy::BestEffort => true,
            BuiltinPolicy::ContinueOnTimeout => context.signal_result.status != SignalStatus::Failed,
        }
    }
}

/// A custom, user-supplied predicate. Takes precedence over `BuiltinPolicy`
/// when both are configured.
#[derive(Clone)]
pub struct CustomPolicy {
    predicate: Arc<dyn Fn(&PolicyContext) -> bool + Send + Sync>,
}

impl CustomPolicy {
    pub fn new(predicate: impl Fn(&PolicyContext) -> bool + Send + Sync + 'static) -> Self {
        Self { predicate: Arc::new(predicate) }
    }
}

impl Policy for CustomPolicy {
    fn should_continue(&self, context: &PolicyContext) -> bool {
        (self.predicate)(context)
    }
}

/// The resolved policy a coordinator actually drives with: either a
/// built-in variant or a custom predicate (which always wins).
#[derive(Clone)]
pub enum ResolvedPolicy {
    Builtin(BuiltinPolicy),
    Custom(CustomPolicy),
}

impl Default for ResolvedPolicy {
    fn default() -> Self {
        ResolvedPolicy::Builtin(BuiltinPolicy::BestEffort)
    }
}

impl Policy for ResolvedPolicy {
    fn should_continue(&self, context: &PolicyContext) -> bool {
        match self {
            ResolvedPolicy::Builtin(p) => p.should_continue(context),
            ResolvedPolicy::Custom(p) => p.should_continue(context),
        }
    }
}
