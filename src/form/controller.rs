use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::defaults::{self, DefaultValues, DefaultsFuture, DefaultsPhase, PendingWrite, Resolution};
use super::registry::FieldRegistry;
use super::validation::ValidationErrors;
use super::value::{FieldKey, ValueMap, merge_into};
use crate::i18n::{I18nManager, Locale};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SubmitState {
    Idle,
    Validating,
    Succeeded,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Horizontal,
    Vertical,
}

/// Label presentation hints forwarded to every field binder.
pub type LabelProps = ValueMap;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    /// Commit `values` into `data` on every change instead of on submit/reset.
    pub quick: bool,
    pub direction: Direction,
    pub disabled: bool,
    pub label_props: LabelProps,
    pub locale: Locale,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            quick: true,
            direction: Direction::Horizontal,
            disabled: false,
            label_props: LabelProps::new(),
            locale: Locale::System,
        }
    }
}

impl FormOptions {
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("form validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("failed to convert `{field}`: {message}")]
    Serialization { field: String, message: String },
}

impl FormError {
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            FormError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

pub type FormResult<T> = Result<T, FormError>;

pub(super) type ValuesListener = Arc<dyn Fn(&ValueMap) + Send + Sync>;

pub(super) struct FormState {
    pub(super) id: FormId,
    pub(super) defaults: ValueMap,
    pub(super) phase: DefaultsPhase,
    pub(super) values: ValueMap,
    pub(super) data: ValueMap,
    pub(super) validate_errors: Option<ValidationErrors>,
    pub(super) pending_writes: Vec<PendingWrite>,
    pub(super) validation_ticket: ValidationTicket,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
}

/// Owner of a form's values, committed data and validation errors.
///
/// Clones share the same state, so a controller can be handed to every scope and binder
/// of one form tree.
#[derive(Clone)]
pub struct FormController {
    pub(super) options: Arc<FormOptions>,
    pub(super) i18n: I18nManager,
    pub(super) state: Arc<RwLock<FormState>>,
    pub(super) registry: Arc<RwLock<FieldRegistry>>,
    pub(super) change_listeners: Arc<RwLock<Vec<ValuesListener>>>,
    pub(super) submit_listeners: Arc<RwLock<Vec<ValuesListener>>>,
    pub(super) deferred_defaults: Arc<Mutex<Option<DefaultsFuture>>>,
}

impl FormController {
    pub fn new(defaults: impl Into<DefaultValues>, options: FormOptions) -> Self {
        let (initial, phase, deferred) = match defaults::start(defaults.into()) {
            Resolution::Ready(map) => (map, DefaultsPhase::Ready, None),
            Resolution::Failed => (ValueMap::new(), DefaultsPhase::Failed, None),
            Resolution::Deferred(future) => (ValueMap::new(), DefaultsPhase::Pending, Some(future)),
        };
        let id = FormId::next();
        tracing::debug!(form = id.0, ?phase, quick = options.quick, "form created");

        Self {
            i18n: I18nManager::with_locale(options.locale.clone()),
            options: Arc::new(options),
            state: Arc::new(RwLock::new(FormState {
                id,
                defaults: initial.clone(),
                phase,
                values: initial.clone(),
                data: initial,
                validate_errors: None,
                pending_writes: Vec::new(),
                validation_ticket: ValidationTicket(0),
                submit_state: SubmitState::Idle,
                submit_count: 0,
            })),
            registry: Arc::new(RwLock::new(FieldRegistry::new())),
            change_listeners: Arc::new(RwLock::new(Vec::new())),
            submit_listeners: Arc::new(RwLock::new(Vec::new())),
            deferred_defaults: Arc::new(Mutex::new(deferred)),
        }
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn i18n(&self) -> &I18nManager {
        &self.i18n
    }

    pub fn is_quick(&self) -> bool {
        self.options.quick
    }

    /// Called with a copy of the committed values every time `data` changes.
    pub fn on_change(&self, listener: impl Fn(&ValueMap) + Send + Sync + 'static) -> FormResult<()> {
        write_lock(&self.change_listeners, "registering change listener")?.push(Arc::new(listener));
        Ok(())
    }

    /// Called with a copy of `values` after a submit passes validation.
    pub fn on_submit(&self, listener: impl Fn(&ValueMap) + Send + Sync + 'static) -> FormResult<()> {
        write_lock(&self.submit_listeners, "registering submit listener")?.push(Arc::new(listener));
        Ok(())
    }

    pub fn values(&self) -> FormResult<ValueMap> {
        Ok(read_lock(&self.state, "reading values")?.values.clone())
    }

    pub fn value(&self, field: &str) -> FormResult<Option<Value>> {
        Ok(read_lock(&self.state, "reading field value")?
            .values
            .get(field)
            .cloned())
    }

    /// Last committed values.
    pub fn data(&self) -> FormResult<ValueMap> {
        Ok(read_lock(&self.state, "reading committed data")?.data.clone())
    }

    pub fn result_data(&self) -> FormResult<ValueMap> {
        self.data()
    }

    pub fn default_values(&self) -> FormResult<ValueMap> {
        Ok(read_lock(&self.state, "reading default values")?.defaults.clone())
    }

    pub fn defaults_phase(&self) -> FormResult<DefaultsPhase> {
        Ok(read_lock(&self.state, "reading defaults phase")?.phase)
    }

    pub fn submit_state(&self) -> FormResult<SubmitState> {
        Ok(read_lock(&self.state, "reading submit state")?.submit_state)
    }

    pub fn submit_count(&self) -> FormResult<u32> {
        Ok(read_lock(&self.state, "reading submit count")?.submit_count)
    }

    pub fn set_value(&self, field: impl Into<FieldKey>, value: Value) -> FormResult<()> {
        let key = field.into();
        {
            let mut state = write_lock(&self.state, "writing field value")?;
            state.values.insert(key.as_str().to_string(), value.clone());
            if state.phase == DefaultsPhase::Pending {
                state.pending_writes.push(PendingWrite::Field(key.clone(), value));
            }
        }
        tracing::trace!(field = %key, "field value written");
        self.after_write()
    }

    pub fn set_values(&self, partial: ValueMap) -> FormResult<()> {
        let count = partial.len();
        {
            let mut state = write_lock(&self.state, "merging values")?;
            if state.phase == DefaultsPhase::Pending {
                state.pending_writes.push(PendingWrite::Merge(partial.clone()));
            }
            merge_into(&mut state.values, partial);
        }
        tracing::trace!(fields = count, "values merged");
        self.after_write()
    }

    /// Validates, then hands a copy of `values` to the submit listeners.
    ///
    /// In non-quick mode a successful submit also commits `values` into `data` and fires the
    /// change listeners.
    pub async fn submit(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
        }

        if let Err(error) = self.validate().await {
            let mut state = write_lock(&self.state, "handling submit validation failure")?;
            finish_submit(&mut state, SubmitState::Failed)?;
            return Err(error);
        }

        let values = read_lock(&self.state, "reading values for submit")?.values.clone();
        self.notify(&self.submit_listeners, &values)?;
        if !self.options.quick {
            write_lock(&self.state, "committing submitted values")?.data = values.clone();
            self.notify(&self.change_listeners, &values)?;
        }

        let mut state = write_lock(&self.state, "completing submit")?;
        finish_submit(&mut state, SubmitState::Succeeded)?;
        tracing::debug!(form = state.id.0, count = state.submit_count, "form submitted");
        Ok(())
    }

    /// Restores `values` to the resolved defaults. Quick forms commit and notify right away;
    /// other forms leave `data` alone until the next submit.
    pub fn reset(&self) -> FormResult<()> {
        let committed = {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.values = state.defaults.clone();
            state.pending_writes.clear();
            state.submit_state = SubmitState::Idle;
            if self.options.quick {
                state.data = state.defaults.clone();
                Some(state.data.clone())
            } else {
                None
            }
        };
        tracing::debug!(form = self.form_id()?.0, "form reset");
        if let Some(committed) = committed {
            self.notify(&self.change_listeners, &committed)?;
        }
        Ok(())
    }

    fn after_write(&self) -> FormResult<()> {
        if self.options.quick {
            self.commit_if_changed()?;
        }
        Ok(())
    }

    /// Commits `values` into `data` when they differ structurally.
    pub(super) fn commit_if_changed(&self) -> FormResult<bool> {
        let committed = {
            let mut state = write_lock(&self.state, "committing values")?;
            if state.values == state.data {
                return Ok(false);
            }
            state.data = state.values.clone();
            state.data.clone()
        };
        tracing::debug!(fields = committed.len(), "values committed");
        self.notify(&self.change_listeners, &committed)?;
        Ok(true)
    }

    fn notify(
        &self,
        listeners: &RwLock<Vec<ValuesListener>>,
        values: &ValueMap,
    ) -> FormResult<()> {
        let listeners = read_lock(listeners, "reading listeners")?.clone();
        for listener in listeners {
            listener(&values.clone());
        }
        Ok(())
    }
}

pub(super) fn transition_submit_state(
    state: &mut FormState,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    // Overlapping submits may finish in any order, so finished states may follow each other.
    let allowed = matches!(
        (current, next),
        (_, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Succeeded)
            | (SubmitState::Validating, SubmitState::Failed)
            | (SubmitState::Succeeded, SubmitState::Failed)
            | (SubmitState::Failed, SubmitState::Succeeded)
            | (_, SubmitState::Idle)
    );
    if !allowed {
        return Err(FormError::InvalidStateTransition {
            from: current,
            to: next,
        });
    }
    state.submit_state = next;
    Ok(())
}

// A reset while a submit is in flight wins over its outcome.
fn finish_submit(state: &mut FormState, next: SubmitState) -> FormResult<()> {
    if state.submit_state == SubmitState::Idle {
        return Ok(());
    }
    transition_submit_state(state, next)
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn lock_mutex<'a, T>(
    lock: &'a Mutex<T>,
    context: &'static str,
) -> FormResult<MutexGuard<'a, T>> {
    lock.lock().map_err(|_| FormError::StatePoisoned(context))
}
