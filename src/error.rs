//! Error types for the startup readiness coordinator.

use std::fmt;

use crate::signal::SignalResult;

/// Configuration-time errors.
///
/// Represents the various error conditions that can occur while building
/// signals, graphs, and options for the coordinator, before any signal
/// body has run.
///
/// # Examples
///
/// ```rust
/// use ignition::CoordinatorError;
///
/// let duplicate = CoordinatorError::DuplicateSignal("db".into());
/// let cycle = CoordinatorError::CycleDetected(vec!["a".into(), "b".into(), "a".into()]);
///
/// println!("Error: {}", duplicate);
/// println!("Error: {}", cycle);
/// ```
#[derive(Debug, Clone)]
pub enum CoordinatorError {
    /// A signal name was registered more than once.
    DuplicateSignal(String),
    /// `GraphBuilder::build` found a cycle (names one node on the cycle).
    CycleDetected(Vec<String>),
    /// A dependency referenced a signal that was never added.
    MissingDependency { signal: String, target: String },
    /// An option was set to an invalid value (negative timeout, zero
    /// parallelism, out-of-range threshold, ...).
    InvalidOption(String),
    /// `DependencyAware` mode was selected without a `Graph`.
    GraphlessDependencyAware,
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorError::DuplicateSignal(name) => {
                write!(f, "signal already registered: {name}")
            }
            CoordinatorError::CycleDetected(path) => {
                write!(f, "dependency cycle detected: {}", path.join(" -> "))
            }
            CoordinatorError::MissingDependency { signal, target } => {
                write!(f, "signal '{signal}' depends on unknown signal '{target}'")
            }
            CoordinatorError::InvalidOption(msg) => write!(f, "invalid option: {msg}"),
            CoordinatorError::GraphlessDependencyAware => {
                write!(f, "DependencyAware execution mode requires a Graph")
            }
        }
    }
}

impl std::error::Error for CoordinatorError {}

/// Result type for configuration-time operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Aggregate error raised by `Coordinator::wait_all` under FailFast-style
/// policies.
///
/// Carries every `SignalResult` collected up to and including the one that
/// caused the policy to deny continuation, in completion order.
#[derive(Debug, Clone)]
pub struct IgnitionError {
    /// All non-`Succeeded` results collected before the policy stopped
    /// the ignition.
    pub failures: Vec<SignalResult>,
}

impl IgnitionError {
    pub(crate) fn new(failures: Vec<SignalResult>) -> Self {
        Self { failures }
    }
}

impl fmt::Display for IgnitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ignition stopped after {} failing signal(s): ", self.failures.len())?;
        let names: Vec<&str> = self.failures.iter().map(|r| r.name.as_str()).collect();
        write!(f, "{}", names.join(", "))
    }
}

impl std::error::Error for IgnitionError {}
