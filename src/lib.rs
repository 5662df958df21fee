//! Async startup-readiness coordinator.
//!
//! Drives a set of declared readiness [`Signal`]s to a terminal state
//! under a configurable execution mode, timeout layering, and
//! continuation policy, then publishes a deterministic [`IgnitionResult`]
//! that health checks and lifecycle managers can consume before a
//! service accepts traffic.

pub mod cancellation;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod factory;
pub mod graph;
pub mod lifecycle;
pub mod metrics;
pub mod observer;
pub mod options;
pub mod policy;
pub mod result;
pub mod signal;
pub mod timeout;

#[cfg(feature = "recording")]
pub mod recording;
#[cfg(feature = "recording")]
pub mod replay;
#[cfg(feature = "recording")]
pub mod timeline;

pub use cancellation::{CancellationReason, CancellationScope};
pub use coordinator::{Coordinator, CoordinatorBuilder, CoordinatorState};
pub use error::{CoordinatorError, CoordinatorResult, IgnitionError};
pub use executor::{ExecutionMode, StagePolicy};
pub use factory::{IgnitionContext, SignalFactory};
pub use graph::{DependencyAttr, Graph, GraphBuilder};
pub use lifecycle::LifecycleHooks;
pub use metrics::{IgnitionMetricsSink, MetricsCollector, TimingStats};
pub use observer::{CompositeObserver, LoggingObserver, SignalObserver};
pub use options::{CoordinatorOptions, CoordinatorOptionsBuilder};
pub use policy::{BuiltinPolicy, CustomPolicy, Policy, PolicyContext, ResolvedPolicy};
pub use result::{HealthClassification, IgnitionResult, StageResult};
pub use signal::{Signal, SignalError, SignalResult, SignalStatus};
pub use timeout::{DefaultTimeoutStrategy, TimeoutStrategy};

#[cfg(feature = "recording")]
pub use recording::{Recording, RecordingConfiguration, RecordingSummary, RecordedSignal};
#[cfg(feature = "recording")]
pub use replay::{Replayer, ValidationIssue, ValidationLevel};
#[cfg(feature = "recording")]
pub use timeline::{Timeline, TimelineBoundary, TimelineEvent};
