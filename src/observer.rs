//! Structured tracing hooks over one ignition.
//!
//! The coordinator never depends on a concrete logging backend: it drives
//! an optional `Arc<dyn SignalObserver>` synchronously from within the
//! ignition, the same way `CoordinatorCompleted`/`SignalStarted`/
//! `SignalCompleted` events are described in the external interface
//! contract. `LoggingObserver` is a ready-made implementation that prints
//! structured lines, for callers who don't want to wire their own.

use crate::result::IgnitionResult;
use crate::signal::SignalResult;

/// Observer for coordinator ignition events.
///
/// Callbacks run synchronously on the coordinator's task; implementations
/// must be fast and must not panic. A panic inside a callback is caught
/// by the coordinator and logged, never propagated to `wait_all`'s caller.
pub trait SignalObserver: Send + Sync {
    fn on_signal_started(&self, _name: &str) {}
    fn on_signal_completed(&self, _result: &SignalResult) {}
    fn on_global_timeout_reached(&self) {}
    fn on_coordinator_completed(&self, _result: &IgnitionResult) {}
}

/// An observer that writes one line per event via `println!`/`eprintln!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl SignalObserver for LoggingObserver {
    fn on_signal_started(&self, name: &str) {
        println!("[ignition] started: {name}");
    }

    fn on_signal_completed(&self, result: &SignalResult) {
        match &result.exception {
            Some(message) => eprintln!("[ignition] completed: {} -> {} ({message})", result.name, result.status),
            None => println!("[ignition] completed: {} -> {}", result.name, result.status),
        }
    }

    fn on_global_timeout_reached(&self) {
        eprintln!("[ignition] global timeout reached");
    }

    fn on_coordinator_completed(&self, result: &IgnitionResult) {
        println!(
            "[ignition] coordinator completed: {} signal(s), timed_out={} in {:?}",
            result.results.len(),
            result.timed_out,
            result.total_duration
        );
    }
}

/// An observer that fans out to a list of other observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Box<dyn SignalObserver>>,
}

impl CompositeObserver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, observer: impl SignalObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }
}

impl SignalObserver for CompositeObserver {
    fn on_signal_started(&self, name: &str) {
        for o in &self.observers {
            o.on_signal_started(name);
        }
    }

    fn on_signal_completed(&self, result: &SignalResult) {
        for o in &self.observers {
            o.on_signal_completed(result);
        }
    }

    fn on_global_timeout_reached(&self) {
        for o in &self.observers {
            o.on_global_timeout_reached();
        }
    }

    fn on_coordinator_completed(&self, result: &IgnitionResult) {
        for o in &self.observers {
            o.on_coordinator_completed(result);
        }
    }
}
