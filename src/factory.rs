//! Deferred materialization of a [`Signal`] from an external context.
//!
//! A [`SignalFactory`] is a builder-time registration that closes over an
//! [`IgnitionContext`]; the coordinator injects the context at ignition
//! time and calls `create` exactly once, at or after the factory's stage
//! is reached.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::signal::Signal;

/// An opaque, downcast-on-demand context handed to every `SignalFactory`
/// at ignition time. Consumers populate it with whatever dependency
/// handles their probes need (a pool, a queue client, ...) — the
/// coordinator never interprets its contents.
#[derive(Clone, Default)]
pub struct IgnitionContext {
    values: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl IgnitionContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.values.insert(TypeId::of::<T>(), Arc::new(value));
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| Arc::clone(v).downcast::<T>().ok())
    }
}

/// Deferred materialization of a signal. `create` is called once, with
/// the coordinator's `IgnitionContext`, at or after `optional_stage` is
/// reached so that dependencies created by earlier stages are available.
pub struct SignalFactory {
    name: String,
    optional_timeout: Option<Duration>,
    optional_stage: Option<usize>,
    create: Arc<dyn Fn(&IgnitionContext) -> Signal + Send + Sync>,
}

impl SignalFactory {
    pub fn new(
        name: impl Into<String>,
        create: impl Fn(&IgnitionContext) -> Signal + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            optional_timeout: None,
            optional_stage: None,
            create: Arc::new(create),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.optional_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_stage(mut self, stage: usize) -> Self {
        self.optional_stage = Some(stage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Option<usize> {
        self.optional_stage
    }

    /// Materializes the signal, applying the factory's declared timeout
    /// and stage unless the produced signal already set its own.
    pub fn create(&self, context: &IgnitionContext) -> Signal {
        let mut signal = (self.create)(context);
        if signal.declared_timeout().is_none() {
            if let Some(timeout) = self.optional_timeout {
                signal = signal.with_timeout(timeout);
            }
        }
        if let Some(stage) = self.optional_stage {
            signal = signal.with_stage(stage);
        }
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pool(u32);

    #[tokio::test]
    async fn factory_resolves_from_context() {
        let context = IgnitionContext::new().with(Pool(42));
        let factory = SignalFactory::new("db", |ctx| {
            let pool = ctx.get::<Pool>().unwrap();
            Signal::new("db", move |_| {
                let value = pool.0;
                async move {
                    assert_eq!(value, 42);
                    Ok(())
                }
            })
        })
        .with_stage(1);

        let signal = factory.create(&context);
        assert_eq!(signal.stage(), 1);
    }
}
