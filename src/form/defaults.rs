use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

use super::controller::{FormController, FormResult, lock_mutex, write_lock};
use super::value::{FieldKey, ValueMap, merge_into};

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DefaultsError {
    #[error("default values producer failed: {0}")]
    Producer(String),
    #[error("default values are not a map")]
    NotAMap,
}

pub type DefaultsFuture = Pin<Box<dyn Future<Output = Result<ValueMap, DefaultsError>> + Send>>;

type ProducerFn = Box<dyn FnOnce() -> Result<ValueMap, DefaultsError> + Send>;
type DeferredFn = Box<dyn FnOnce() -> DefaultsFuture + Send>;

/// Initial values of a form, resolved exactly once per controller.
pub enum DefaultValues {
    Literal(ValueMap),
    Producer(ProducerFn),
    Deferred(DeferredFn),
}

impl DefaultValues {
    pub fn producer(
        producer: impl FnOnce() -> Result<ValueMap, DefaultsError> + Send + 'static,
    ) -> Self {
        Self::Producer(Box::new(producer))
    }

    pub fn deferred<F, Fut>(producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ValueMap, DefaultsError>> + Send + 'static,
    {
        Self::Deferred(Box::new(move || -> DefaultsFuture { Box::pin(producer()) }))
    }

    /// Accepts only map-shaped JSON; anything else yields an empty literal.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Literal(map),
            other => {
                tracing::warn!(kind = ?other, "default values are not a map, using empty defaults");
                Self::Literal(ValueMap::new())
            }
        }
    }
}

impl Default for DefaultValues {
    fn default() -> Self {
        Self::Literal(ValueMap::new())
    }
}

impl From<ValueMap> for DefaultValues {
    fn from(value: ValueMap) -> Self {
        Self::Literal(value)
    }
}

impl From<Value> for DefaultValues {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

impl Debug for DefaultValues {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DefaultValues::Literal(map) => f.debug_tuple("Literal").field(map).finish(),
            DefaultValues::Producer(_) => f.write_str("Producer(..)"),
            DefaultValues::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DefaultsPhase {
    Pending,
    Ready,
    Failed,
}

/// Write issued while defaults were still pending; replayed once they arrive.
#[derive(Clone, Debug)]
pub(super) enum PendingWrite {
    Field(FieldKey, Value),
    Merge(ValueMap),
}

impl PendingWrite {
    pub(super) fn apply(self, values: &mut ValueMap) {
        match self {
            PendingWrite::Field(key, value) => {
                values.insert(key.as_str().to_string(), value);
            }
            PendingWrite::Merge(partial) => merge_into(values, partial),
        }
    }
}

pub(super) enum Resolution {
    Ready(ValueMap),
    Failed,
    Deferred(DefaultsFuture),
}

pub(super) fn start(defaults: DefaultValues) -> Resolution {
    match defaults {
        DefaultValues::Literal(map) => Resolution::Ready(map),
        DefaultValues::Producer(producer) => match producer() {
            Ok(map) => Resolution::Ready(map),
            Err(error) => {
                tracing::warn!(%error, "default values producer failed, starting empty");
                Resolution::Failed
            }
        },
        DefaultValues::Deferred(producer) => Resolution::Deferred(producer()),
    }
}

impl FormController {
    /// Drives deferred default values to completion.
    ///
    /// Writes made while pending are replayed on top of the resolved defaults. Calling this
    /// on a form without deferred defaults, or a second time, returns the current phase.
    pub async fn resolve_defaults(&self) -> FormResult<DefaultsPhase> {
        let pending = lock_mutex(&self.deferred_defaults, "taking deferred defaults")?.take();
        let Some(pending) = pending else {
            return self.defaults_phase();
        };

        match pending.await {
            Ok(resolved) => {
                {
                    let mut state = write_lock(&self.state, "applying resolved defaults")?;
                    let mut values = resolved.clone();
                    for write in std::mem::take(&mut state.pending_writes) {
                        write.apply(&mut values);
                    }
                    // Quick forms keep `data` so the commit below notifies about the defaults.
                    if !self.options.quick {
                        state.data = resolved.clone();
                    }
                    state.defaults = resolved;
                    state.values = values;
                    state.phase = DefaultsPhase::Ready;
                }
                tracing::debug!(form = self.form_id()?.0, "deferred default values resolved");
                if self.options.quick {
                    self.commit_if_changed()?;
                }
                Ok(DefaultsPhase::Ready)
            }
            Err(error) => {
                tracing::warn!(
                    form = self.form_id()?.0,
                    %error,
                    "deferred default values failed, keeping current values"
                );
                let mut state = write_lock(&self.state, "recording failed defaults")?;
                state.pending_writes.clear();
                state.phase = DefaultsPhase::Failed;
                Ok(DefaultsPhase::Failed)
            }
        }
    }
}
