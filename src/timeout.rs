//! Per-signal timeout resolution.

use std::sync::Arc;
use std::time::Duration;

use crate::options::CoordinatorOptions;
use crate::signal::Signal;

/// Resolves the effective timeout for a signal and whether expiry should
/// hard-cancel its execution scope.
pub trait TimeoutStrategy: Send + Sync {
    /// Returns `(effective_timeout, cancel_immediately)`.
    fn get_timeout(&self, signal: &Signal, options: &CoordinatorOptions) -> (Option<Duration>, bool);
}

/// `signal.declared_timeout()` paired with `options.cancel_individual_on_timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTimeoutStrategy;

impl TimeoutStrategy for DefaultTimeoutStrategy {
    fn get_timeout(&self, signal: &Signal, options: &CoordinatorOptions) -> (Option<Duration>, bool) {
        (signal.declared_timeout(), options.cancel_individual_on_timeout)
    }
}

pub(crate) fn default_strategy() -> Arc<dyn TimeoutStrategy> {
    Arc::new(DefaultTimeoutStrategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionMode;

    #[test]
    fn default_strategy_uses_signal_declared_timeout() {
        let signal = Signal::new("db", |_| async { Ok(()) }).with_timeout(Duration::from_secs(2));
        let options = CoordinatorOptions::builder(ExecutionMode::Parallel)
            .cancel_individual_on_timeout(true)
            .build()
            .unwrap();

        let (timeout, cancel_immediately) = DefaultTimeoutStrategy.get_timeout(&signal, &options);
        assert_eq!(timeout, Some(Duration::from_secs(2)));
        assert!(cancel_immediately);
    }
}
