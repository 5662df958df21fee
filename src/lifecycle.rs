//! Optional, DI-supplied lifecycle hooks around one ignition.
//!
//! Hook order is `before_ignition → (before_signal → body → after_signal)*
//! → after_ignition`. Exceptions (panics) from hooks are caught and
//! logged; they never alter coordinator state or propagate to the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::result::IgnitionResult;
use crate::signal::SignalResult;

type BeforeIgnitionHook = Box<dyn Fn() + Send + Sync>;
type AfterIgnitionHook = Box<dyn Fn(&IgnitionResult) + Send + Sync>;
type BeforeSignalHook = Box<dyn Fn(&str) + Send + Sync>;
type AfterSignalHook = Box<dyn Fn(&SignalResult) + Send + Sync>;

/// A bundle of optional lifecycle callbacks.
#[derive(Default)]
pub struct LifecycleHooks {
    before_ignition: Option<BeforeIgnitionHook>,
    after_ignition: Option<AfterIgnitionHook>,
    before_signal: Option<BeforeSignalHook>,
    after_signal: Option<AfterSignalHook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_before_ignition(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.before_ignition = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_after_ignition(mut self, hook: impl Fn(&IgnitionResult) + Send + Sync + 'static) -> Self {
        self.after_ignition = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_before_signal(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.before_signal = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_after_signal(mut self, hook: impl Fn(&SignalResult) + Send + Sync + 'static) -> Self {
        self.after_signal = Some(Box::new(hook));
        self
    }

    pub(crate) fn fire_before_ignition(&self) {
        if let Some(hook) = &self.before_ignition {
            swallow(|| hook());
        }
    }

    pub(crate) fn fire_after_ignition(&self, result: &IgnitionResult) {
        if let Some(hook) = &self.after_ignition {
            swallow(|| hook(result));
        }
    }

    pub(crate) fn fire_before_signal(&self, name: &str) {
        if let Some(hook) = &self.before_signal {
            swallow(|| hook(name));
        }
    }

    pub(crate) fn fire_after_signal(&self, result: &SignalResult) {
        if let Some(hook) = &self.after_signal {
            swallow(|| hook(result));
        }
    }
}

fn swallow(f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        eprintln!("[ignition] lifecycle hook panicked; suppressed");
    }
}
