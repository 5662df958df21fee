//! Hierarchical cancellation for the readiness coordinator.
//!
//! A [`CancellationScope`] is a named node in a tree. Cancelling a scope
//! cancels every transitive child; cancelling a child never reaches its
//! parent. This is the propagation primitive the executors use to
//! implement global timeouts, per-signal timeouts, bundle cancellation
//! (policy says stop) and external cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Why a [`CancellationScope`] was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationReason {
    /// Nothing has cancelled this scope.
    None,
    /// The ignition's global timeout elapsed.
    GlobalTimeout,
    /// A per-signal timeout elapsed and `cancel_immediately` was set.
    PerSignalTimeout,
    /// An ancestor scope was cancelled.
    ScopeCancelled,
    /// The continuation policy returned `false`.
    BundleCancelled,
    /// A dependency failed and `cancel_dependents_on_failure` was set.
    DependencyFailed,
    /// The caller-supplied cancel handle fired.
    ExternalCancellation,
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancellationReason::None => "None",
            CancellationReason::GlobalTimeout => "GlobalTimeout",
            CancellationReason::PerSignalTimeout => "PerSignalTimeout",
            CancellationReason::ScopeCancelled => "ScopeCancelled",
            CancellationReason::BundleCancelled => "BundleCancelled",
            CancellationReason::DependencyFailed => "DependencyFailed",
            CancellationReason::ExternalCancellation => "ExternalCancellation",
        };
        write!(f, "{s}")
    }
}

struct CancelState {
    reason: CancellationReason,
    triggering_signal_name: Option<String>,
}

struct ScopeInner {
    name: String,
    cancelled: AtomicBool,
    state: Mutex<CancelState>,
    notify: Notify,
    parent: Option<CancellationScope>,
    children: Mutex<Vec<CancellationScope>>,
}

/// A node in the cancellation tree.
///
/// Cloning a `CancellationScope` is cheap (it is `Arc`-backed) and all
/// clones observe the same cancellation state.
#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

impl CancellationScope {
    /// Creates a new root scope. `name` must not be empty.
    pub fn root(name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "CancellationScope name must not be empty");
        Self {
            inner: Arc::new(ScopeInner {
                name,
                cancelled: AtomicBool::new(false),
                state: Mutex::new(CancelState {
                    reason: CancellationReason::None,
                    triggering_signal_name: None,
                }),
                notify: Notify::new(),
                parent: None,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Creates a named child of this scope.
    ///
    /// A child created after its parent was already cancelled is born
    /// cancelled with the parent's reason.
    pub fn create_child(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "CancellationScope name must not be empty");
        let child = Self {
            inner: Arc::new(ScopeInner {
                name,
                cancelled: AtomicBool::new(false),
                state: Mutex::new(CancelState {
                    reason: CancellationReason::None,
                    triggering_signal_name: None,
                }),
                notify: Notify::new(),
                parent: Some(self.clone()),
                children: Mutex::new(Vec::new()),
            }),
        };

        if self.is_cancelled() {
            let (reason, triggering) = self.cancellation_info();
            child.cancel_with(reason, triggering);
        } else {
            self.inner.children.lock().unwrap().push(child.clone());
        }

        child
    }

    /// This scope's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// This scope's parent, if any.
    pub fn parent(&self) -> Option<CancellationScope> {
        self.inner.parent.clone()
    }

    /// Whether this scope (or any ancestor) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The reason this scope was cancelled, or `None` if it has not been.
    pub fn cancellation_reason(&self) -> CancellationReason {
        self.inner.state.lock().unwrap().reason
    }

    /// The name of the signal that triggered cancellation, if any
    /// (populated for `BundleCancelled`/`DependencyFailed`/`PerSignalTimeout`).
    pub fn triggering_signal_name(&self) -> Option<String> {
        self.inner.state.lock().unwrap().triggering_signal_name.clone()
    }

    fn cancellation_info(&self) -> (CancellationReason, Option<String>) {
        let state = self.inner.state.lock().unwrap();
        (state.reason, state.triggering_signal_name.clone())
    }

    /// Cancels this scope and every transitive child. One-shot: the first
    /// call wins, subsequent calls are ignored.
    pub fn cancel(&self, reason: CancellationReason, triggering_signal_name: Option<String>) {
        self.cancel_with(reason, triggering_signal_name);
    }

    fn cancel_with(&self, reason: CancellationReason, triggering_signal_name: Option<String>) {
        let already_cancelled = self
            .inner
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err();
        if already_cancelled {
            return;
        }

        {
            let mut state = self.inner.state.lock().unwrap();
            state.reason = reason;
            state.triggering_signal_name = triggering_signal_name.clone();
        }
        self.inner.notify.notify_waiters();

        // Children inherit the same reason and triggering signal that caused
        // this cancellation, all the way down the tree, so a signal's own
        // scope always reports why the ignition actually stopped rather than
        // a generic wrapper.
        let children: Vec<CancellationScope> = {
            let mut children = self.inner.children.lock().unwrap();
            std::mem::take(&mut *children)
        };
        for child in children {
            child.cancel_with(reason, triggering_signal_name.clone());
        }
    }

    /// Resolves once this scope is cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
            if self.is_cancelled() {
                return;
            }
        }
    }
}

impl fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationScope")
            .field("name", &self.inner.name)
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.cancellation_reason())
            .finish()
    }
}
