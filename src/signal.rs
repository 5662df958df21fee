//! Readiness signals: the idempotent, at-most-once-executed unit the
//! coordinator drives to a terminal state.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::cancellation::{CancellationReason, CancellationScope};

/// Boxed error produced by a signal body.
pub type SignalError = Box<dyn std::error::Error + Send + Sync>;

/// A boxed, `Send` future, the common currency of this crate's async seams.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A signal body: a function from its execution scope to a terminating
/// computation. Implementations should observe `scope.cancelled()` at
/// their own I/O boundaries to exit promptly, but are not required to.
pub type SignalBody = Arc<dyn Fn(CancellationScope) -> BoxFuture<Result<(), SignalError>> + Send + Sync>;

/// Terminal classification of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalStatus {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
    Cancelled,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStatus::Succeeded => "Succeeded",
            SignalStatus::Failed => "Failed",
            SignalStatus::TimedOut => "TimedOut",
            SignalStatus::Skipped => "Skipped",
            SignalStatus::Cancelled => "Cancelled",
        };
        write!(f, "{s}")
    }
}

/// The outcome of driving one signal to a terminal state.
#[derive(Debug, Clone)]
pub struct SignalResult {
    pub name: String,
    pub status: SignalStatus,
    pub duration: Duration,
    /// Display of the error the body terminated with, if any.
    pub exception: Option<String>,
    /// Names of direct/transitive dependencies that caused this signal to
    /// be skipped or cancelled (DependencyAware mode only).
    pub failed_dependencies: Vec<String>,
    pub cancellation_reason: CancellationReason,
    pub cancelled_by_signal: Option<String>,
    /// Offset from ignition start.
    pub started_at: Option<Duration>,
    /// Offset from ignition start.
    pub completed_at: Option<Duration>,
}

impl SignalResult {
    pub fn succeeded(name: impl Into<String>, duration: Duration, started_at: Duration, completed_at: Duration) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::Succeeded,
            duration,
            exception: None,
            failed_dependencies: Vec::new(),
            cancellation_reason: CancellationReason::None,
            cancelled_by_signal: None,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
        }
    }

    pub fn failed(
        name: impl Into<String>,
        duration: Duration,
        exception: String,
        started_at: Duration,
        completed_at: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::Failed,
            duration,
            exception: Some(exception),
            failed_dependencies: Vec::new(),
            cancellation_reason: CancellationReason::None,
            cancelled_by_signal: None,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
        }
    }

    pub fn timed_out(
        name: impl Into<String>,
        duration: Duration,
        reason: CancellationReason,
        started_at: Duration,
        completed_at: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::TimedOut,
            duration,
            exception: None,
            failed_dependencies: Vec::new(),
            cancellation_reason: reason,
            cancelled_by_signal: None,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
        }
    }

    pub fn cancelled(
        name: impl Into<String>,
        duration: Duration,
        reason: CancellationReason,
        cancelled_by_signal: Option<String>,
        started_at: Duration,
        completed_at: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::Cancelled,
            duration,
            exception: None,
            failed_dependencies: Vec::new(),
            cancellation_reason: reason,
            cancelled_by_signal,
            started_at: Some(started_at),
            completed_at: Some(completed_at),
        }
    }

    pub fn skipped(name: impl Into<String>, failed_dependencies: Vec<String>, at: Duration) -> Self {
        Self {
            name: name.into(),
            status: SignalStatus::Skipped,
            duration: Duration::ZERO,
            exception: None,
            failed_dependencies,
            cancellation_reason: CancellationReason::None,
            cancelled_by_signal: None,
            started_at: Some(at),
            completed_at: Some(at),
        }
    }
}

/// A `SignalError`-compatible error that only carries display text, used to
/// let a memoized failure be observed by more than one waiter (the original
/// `SignalError` is a boxed trait object and is not `Clone`).
#[derive(Debug, Clone)]
pub struct DisplayError(pub String);

impl fmt::Display for DisplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for DisplayError {}

/// What a waiter observed when racing a signal's completion against its
/// own cancellation handle.
pub(crate) enum WaitOutcome {
    /// The body ran to completion (successfully or not) before the waiter's
    /// handle was cancelled.
    Body(Result<(), DisplayError>),
    /// The waiter's own handle was cancelled first. The body keeps running
    /// in the background and is not awaited further by this waiter.
    ObserverCancelled,
}

struct SignalMemo {
    started: AtomicBool,
    result: Mutex<Option<Result<(), DisplayError>>>,
    notify: Notify,
}

impl SignalMemo {
    fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            result: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    async fn completed(&self) -> Result<(), DisplayError> {
        loop {
            let notified = self.notify.notified();
            if let Some(r) = self.result.lock().unwrap().clone() {
                return r;
            }
            notified.await;
            if let Some(r) = self.result.lock().unwrap().clone() {
                return r;
            }
        }
    }
}

struct SignalInner {
    name: String,
    timeout: Option<Duration>,
    stage: usize,
    kind: Option<&'static str>,
    explicit_scope: Option<CancellationScope>,
    cancel_scope_on_failure: bool,
    body: SignalBody,
    memo: SignalMemo,
}

/// A named, idempotent readiness unit.
///
/// Cloning a `Signal` is cheap; all clones share the same memoized
/// completion (the body runs at most once).
#[derive(Clone)]
pub struct Signal {
    inner: Arc<SignalInner>,
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.inner.name)
            .field("stage", &self.inner.stage)
            .field("kind", &self.inner.kind)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl Signal {
    /// Creates a signal with no timeout, stage 0, and no explicit scope.
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(CancellationScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SignalError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(SignalInner {
                name: name.into(),
                timeout: None,
                stage: 0,
                kind: None,
                explicit_scope: None,
                cancel_scope_on_failure: false,
                body: Arc::new(move |scope| Box::pin(body(scope))),
                memo: SignalMemo::new(),
            }),
        }
    }

    /// Returns a copy of this signal with a declared timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let mut inner = (*self.inner).clone_shell();
        inner.timeout = Some(timeout);
        Self { inner: Arc::new(inner) }
    }

    /// Returns a copy of this signal assigned to the given stage
    /// (the `StagedSignal` variant of the spec).
    #[must_use]
    pub fn with_stage(self, stage: usize) -> Self {
        let mut inner = (*self.inner).clone_shell();
        inner.stage = stage;
        Self { inner: Arc::new(inner) }
    }

    /// Returns a copy of this signal bound to an explicit cancellation
    /// scope (the `ScopedSignal` variant of the spec). When
    /// `cancel_scope_on_failure` is true, a failing body cancels `scope`.
    #[must_use]
    pub fn with_scope(self, scope: CancellationScope, cancel_scope_on_failure: bool) -> Self {
        let mut inner = (*self.inner).clone_shell();
        inner.explicit_scope = Some(scope);
        inner.cancel_scope_on_failure = cancel_scope_on_failure;
        Self { inner: Arc::new(inner) }
    }

    /// Returns a copy of this signal tagged with a declarative "kind",
    /// used by `GraphBuilder::apply_attribute_dependencies` to resolve
    /// type-based (rather than name-based) dependency declarations.
    #[must_use]
    pub fn with_kind(self, kind: &'static str) -> Self {
        let mut inner = (*self.inner).clone_shell();
        inner.kind = Some(kind);
        Self { inner: Arc::new(inner) }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> Option<&'static str> {
        self.inner.kind
    }

    pub fn declared_timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn stage(&self) -> usize {
        self.inner.stage
    }

    pub fn explicit_scope(&self) -> Option<&CancellationScope> {
        self.inner.explicit_scope.as_ref()
    }

    pub fn cancel_scope_on_failure(&self) -> bool {
        self.inner.cancel_scope_on_failure
    }

    /// Drives the body to completion at most once, racing it against
    /// `waiter_scope`'s own cancellation.
    ///
    /// The first call to `wait` (across all clones of this signal) spawns
    /// the body against the scope it was called with; later calls observe
    /// the same memoized outcome. A later caller whose `waiter_scope` is
    /// cancelled before the body finishes gets `ObserverCancelled`
    /// immediately — the body is not interrupted by that.
    pub(crate) async fn wait(&self, waiter_scope: CancellationScope) -> WaitOutcome {
        self.ensure_started(waiter_scope.clone());

        tokio::select! {
            biased;
            result = self.inner.memo.completed() => WaitOutcome::Body(result),
            () = waiter_scope.cancelled() => WaitOutcome::ObserverCancelled,
        }
    }

    fn ensure_started(&self, execution_scope: CancellationScope) {
        if self
            .inner
            .memo
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                let result = (inner.body)(execution_scope).await.map_err(|e| DisplayError(e.to_string()));
                *inner.memo.result.lock().unwrap() = Some(result);
                inner.memo.notify.notify_waiters();
            });
        }
    }
}

impl SignalInner {
    /// A partial clone used by the `with_*` builder methods: everything
    /// except the memoization state, which must never be duplicated (that
    /// would defeat at-most-once execution for the *original* handle, but
    /// since `with_*` is only ever called before a signal is registered
    /// with a coordinator, a fresh memo is correct here).
    fn clone_shell(&self) -> SignalInner {
        SignalInner {
            name: self.name.clone(),
            timeout: self.timeout,
            stage: self.stage,
            kind: self.kind,
            explicit_scope: self.explicit_scope.clone(),
            cancel_scope_on_failure: self.cancel_scope_on_failure,
            body: Arc::clone(&self.body),
            memo: SignalMemo::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn body_runs_at_most_once_across_concurrent_waiters() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = Arc::clone(&calls);
        let signal = Signal::new("db", move |_scope| {
            let calls = Arc::clone(&calls2);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            }
        });

        let root = CancellationScope::root("ignition");
        let a = signal.clone();
        let ra = root.clone();
        let b = signal.clone();
        let rb = root.clone();

        let (oa, ob) = tokio::join!(
            tokio::spawn(async move { matches!(a.wait(ra).await, WaitOutcome::Body(Ok(()))) }),
            tokio::spawn(async move { matches!(b.wait(rb).await, WaitOutcome::Body(Ok(()))) }),
        );

        assert!(oa.unwrap());
        assert!(ob.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn observer_cancellation_does_not_stop_body() {
        let signal = Signal::new("slow", |_scope| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(())
        });

        let waiter_scope = CancellationScope::root("waiter");
        let waiter_scope2 = waiter_scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            waiter_scope2.cancel(CancellationReason::PerSignalTimeout, None);
        });

        let outcome = signal.wait(waiter_scope).await;
        assert!(matches!(outcome, WaitOutcome::ObserverCancelled));
    }

    #[tokio::test]
    async fn builder_methods_set_fields() {
        let signal = Signal::new("cache", |_| async { Ok(()) })
            .with_timeout(Duration::from_secs(1))
            .with_stage(2);
        assert_eq!(signal.declared_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(signal.stage(), 2);
    }
}
