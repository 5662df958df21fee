//! Coordinator configuration: the `Options` table from the external
//! interface contract, validated eagerly at `build()` time.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::executor::{ExecutionMode, StagePolicy};
use crate::graph::Graph;
use crate::lifecycle::LifecycleHooks;
use crate::metrics::IgnitionMetricsSink;
use crate::policy::{BuiltinPolicy, CustomPolicy, ResolvedPolicy};
use crate::timeout::{self, TimeoutStrategy};

/// Immutable, validated coordinator configuration.
///
/// Build one with [`CoordinatorOptions::builder`]; invalid values
/// (negative timeout, zero parallelism, out-of-range threshold) are
/// rejected at `build()`, not discovered mid-ignition.
impl std::fmt::Debug for CoordinatorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorOptions")
            .field("execution_mode", &self.execution_mode)
            .field("stage_policy", &self.stage_policy)
            .field("early_promotion_threshold", &self.early_promotion_threshold)
            .field("global_timeout", &self.global_timeout)
            .field("cancel_on_global_timeout", &self.cancel_on_global_timeout)
            .field("cancel_individual_on_timeout", &self.cancel_individual_on_timeout)
            .field("cancel_dependents_on_failure", &self.cancel_dependents_on_failure)
            .field("max_degree_of_parallelism", &self.max_degree_of_parallelism)
            .field("lifecycle_hooks", &self.lifecycle_hooks.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("graph", &self.graph)
            .finish()
    }
}

pub struct CoordinatorOptions {
    pub execution_mode: ExecutionMode,
    pub policy: ResolvedPolicy,
    pub stage_policy: StagePolicy,
    pub early_promotion_threshold: f64,
    pub global_timeout: Option<Duration>,
    pub cancel_on_global_timeout: bool,
    pub cancel_individual_on_timeout: bool,
    pub cancel_dependents_on_failure: bool,
    pub max_degree_of_parallelism: Option<NonZeroUsize>,
    pub timeout_strategy: Arc<dyn TimeoutStrategy>,
    pub lifecycle_hooks: Option<Arc<LifecycleHooks>>,
    pub metrics: Option<Arc<dyn IgnitionMetricsSink>>,
    pub graph: Option<Graph>,
}

impl CoordinatorOptions {
    pub fn builder(execution_mode: ExecutionMode) -> CoordinatorOptionsBuilder {
        CoordinatorOptionsBuilder::new(execution_mode)
    }
}

/// Builder for [`CoordinatorOptions`]. Mirrors the option table of the
/// external interface contract one field at a time.
pub struct CoordinatorOptionsBuilder {
    execution_mode: ExecutionMode,
    policy: BuiltinPolicy,
    custom_policy: Option<CustomPolicy>,
    stage_policy: StagePolicy,
    early_promotion_threshold: f64,
    global_timeout: Option<Duration>,
    cancel_on_global_timeout: bool,
    cancel_individual_on_timeout: bool,
    cancel_dependents_on_failure: bool,
    max_degree_of_parallelism: Option<usize>,
    timeout_strategy: Option<Arc<dyn TimeoutStrategy>>,
    lifecycle_hooks: Option<LifecycleHooks>,
    metrics: Option<Arc<dyn IgnitionMetricsSink>>,
    graph: Option<Graph>,
}

impl CoordinatorOptionsBuilder {
    pub fn new(execution_mode: ExecutionMode) -> Self {
        Self {
            execution_mode,
            policy: BuiltinPolicy::BestEffort,
            custom_policy: None,
            stage_policy: StagePolicy::BestEffort,
            early_promotion_threshold: 1.0,
            global_timeout: None,
            cancel_on_global_timeout: false,
            cancel_individual_on_timeout: false,
            cancel_dependents_on_failure: false,
            max_degree_of_parallelism: None,
            timeout_strategy: None,
            lifecycle_hooks: None,
            metrics: None,
            graph: None,
        }
    }

    #[must_use]
    pub fn policy(mut self, policy: BuiltinPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn custom_policy(mut self, predicate: CustomPolicy) -> Self {
        self.custom_policy = Some(predicate);
        self
    }

    #[must_use]
    pub fn stage_policy(mut self, stage_policy: StagePolicy) -> Self {
        self.stage_policy = stage_policy;
        self
    }

    #[must_use]
    pub fn early_promotion_threshold(mut self, threshold: f64) -> Self {
        self.early_promotion_threshold = threshold;
        self
    }

    #[must_use]
    pub fn global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel_on_global_timeout(mut self, value: bool) -> Self {
        self.cancel_on_global_timeout = value;
        self
    }

    #[must_use]
    pub fn cancel_individual_on_timeout(mut self, value: bool) -> Self {
        self.cancel_individual_on_timeout = value;
        self
    }

    #[must_use]
    pub fn cancel_dependents_on_failure(mut self, value: bool) -> Self {
        self.cancel_dependents_on_failure = value;
        self
    }

    #[must_use]
    pub fn max_degree_of_parallelism(mut self, n: usize) -> Self {
        self.max_degree_of_parallelism = Some(n);
        self
    }

    #[must_use]
    pub fn timeout_strategy(mut self, strategy: Arc<dyn TimeoutStrategy>) -> Self {
        self.timeout_strategy = Some(strategy);
        self
    }

    #[must_use]
    pub fn lifecycle_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.lifecycle_hooks = Some(hooks);
        self
    }

    #[must_use]
    pub fn metrics(mut self, sink: Arc<dyn IgnitionMetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub fn graph(mut self, graph: Graph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> CoordinatorResult<CoordinatorOptions> {
        if let Some(n) = self.max_degree_of_parallelism {
            if n == 0 {
                return Err(CoordinatorError::InvalidOption(
                    "max_degree_of_parallelism must be positive".into(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.early_promotion_threshold) {
            return Err(CoordinatorError::InvalidOption(
                "early_promotion_threshold must be in [0, 1]".into(),
            ));
        }

        if self.execution_mode == ExecutionMode::DependencyAware && self.graph.is_none() {
            return Err(CoordinatorError::GraphlessDependencyAware);
        }

        let policy = match self.custom_policy {
            Some(custom) => ResolvedPolicy::Custom(custom),
            None => ResolvedPolicy::Builtin(self.policy),
        };

        Ok(CoordinatorOptions {
            execution_mode: self.execution_mode,
            policy,
            stage_policy: self.stage_policy,
            early_promotion_threshold: self.early_promotion_threshold,
            global_timeout: self.global_timeout,
            cancel_on_global_timeout: self.cancel_on_global_timeout,
            cancel_individual_on_timeout: self.cancel_individual_on_timeout,
            cancel_dependents_on_failure: self.cancel_dependents_on_failure,
            max_degree_of_parallelism: self.max_degree_of_parallelism.map(|n| NonZeroUsize::new(n).unwrap()),
            timeout_strategy: self.timeout_strategy.unwrap_or_else(timeout::default_strategy),
            lifecycle_hooks: self.lifecycle_hooks.map(Arc::new),
            metrics: self.metrics,
            graph: self.graph,
        })
    }
}
