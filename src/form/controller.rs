use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::model::{FieldKey, FieldKind, FieldLens, FieldValue, FormModel};
use super::subscription::{Listeners, Subscription};
use super::validation::{ConfigError, FormErrors, ValidationSchema};

static FORM_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FormId(pub u64);

impl FormId {
    pub fn next() -> Self {
        Self(FORM_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// Submit lifecycle: `Idle -> Validating -> (Blocked | Submitting) -> Idle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitState {
    Idle,
    Validating,
    Blocked,
    Submitting,
}

/// When value changes trigger the validation schema. Submit always validates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Revalidate on every value change; errors are never stale.
    #[default]
    OnChange,
    /// Revalidate when a field is touched.
    OnBlur,
    /// Only validate on submit or an explicit [`FormController::validate`].
    OnSubmit,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    pub validate_mode: ValidationMode,
}

impl FormOptions {
    /// Parses options from JSON; missing keys keep their defaults.
    pub fn from_json(source: &str) -> FormResult<Self> {
        serde_json::from_str(source).map_err(|error| FormError::InvalidOptions(error.to_string()))
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FormSnapshot<T> {
    pub form_id: FormId,
    pub values: T,
    pub touched: BTreeMap<FieldKey, bool>,
    pub errors: FormErrors,
    pub dirty: BTreeSet<FieldKey>,
    pub submit_state: SubmitState,
    pub is_submitting: bool,
    pub submit_count: u32,
    pub is_valid: bool,
    pub config_error: Option<ConfigError>,
}

impl<T> FormSnapshot<T> {
    pub fn is_touched(&self, name: &str) -> bool {
        self.touched.get(name).copied().unwrap_or(false)
    }

    pub fn error(&self, name: &str) -> Option<&str> {
        self.errors.get(name)
    }

    /// The error a presentation layer should show: only once the field is touched.
    pub fn visible_error(&self, name: &str) -> Option<&str> {
        self.is_touched(name).then(|| self.error(name)).flatten()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown form field `{0}`")]
    UnknownField(FieldKey),
    #[error("field `{field}` holds a {expected} value, got {found}")]
    TypeMismatch {
        field: FieldKey,
        expected: FieldKind,
        found: FieldKind,
    },
    #[error("form state lock poisoned while {0}")]
    StatePoisoned(&'static str),
    #[error("invalid submit state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: SubmitState, to: SubmitState },
    #[error("invalid form options: {0}")]
    InvalidOptions(String),
}

pub type FormResult<T> = Result<T, FormError>;

/// Error raised by a submit handler.
pub type SubmitCause = Box<dyn std::error::Error + Send + Sync>;

pub type SubmitFuture = Pin<Box<dyn Future<Output = Result<(), SubmitCause>> + Send + 'static>>;

pub(super) type SubmitHandlerFn<T> = Arc<dyn Fn(T) -> SubmitFuture + Send + Sync>;

/// Result of a [`FormController::submit`] call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SubmitOutcome {
    /// The handler ran and completed.
    Submitted,
    /// Another submit was in flight; nothing changed.
    Rejected,
    /// Validation failed; the handler was not called.
    ValidationFailed(FormErrors),
    /// The handler returned an error; the form is idle again.
    SubmitFailed { cause: String },
}

pub(super) struct FormState<T> {
    pub(super) id: FormId,
    pub(super) initial: T,
    pub(super) values: T,
    pub(super) touched: BTreeMap<FieldKey, bool>,
    pub(super) errors: FormErrors,
    pub(super) submit_state: SubmitState,
    pub(super) submit_count: u32,
    pub(super) config_error: Option<ConfigError>,
}

impl<T: FormModel> FormState<T> {
    pub(super) fn is_submitting(&self) -> bool {
        self.submit_state == SubmitState::Submitting
    }

    pub(super) fn is_dirty_field(&self, name: &str) -> bool {
        self.values.value(name) != self.initial.value(name)
    }

    pub(super) fn clear_touched(&mut self) {
        self.touched = self
            .values
            .field_keys()
            .into_iter()
            .map(|key| (key, false))
            .collect();
    }

    /// Stores the schema result for the current values.
    pub(super) fn apply_validation(
        &mut self,
        result: Result<FormErrors, ConfigError>,
    ) -> FormResult<()> {
        match result {
            Ok(errors) => {
                self.errors = errors;
                self.config_error = None;
                Ok(())
            }
            Err(error) => {
                warn!(form_id = self.id.0, %error, "validation schema does not fit form values");
                self.config_error = Some(error.clone());
                Err(error.into())
            }
        }
    }
}

/// Single authority for one form's values, validation and submission.
///
/// Cloning yields another handle onto the same form.
pub struct FormController<T>
where
    T: FormModel,
{
    pub(super) options: FormOptions,
    pub(super) state: Arc<RwLock<FormState<T>>>,
    pub(super) schema: Arc<dyn ValidationSchema<T>>,
    pub(super) on_submit: SubmitHandlerFn<T>,
    pub(super) listeners: Listeners<T>,
}

impl<T> Clone for FormController<T>
where
    T: FormModel,
{
    fn clone(&self) -> Self {
        Self {
            options: self.options,
            state: self.state.clone(),
            schema: self.schema.clone(),
            on_submit: self.on_submit.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<T> FormController<T>
where
    T: FormModel,
{
    pub fn new<S, F, Fut>(initial: T, schema: S, on_submit: F) -> Self
    where
        S: ValidationSchema<T> + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubmitCause>> + Send + 'static,
    {
        Self::with_options(initial, schema, on_submit, FormOptions::default())
    }

    /// A schema that does not fit `initial` does not fail construction; the
    /// fault is recorded in the snapshot and returned by the next operation
    /// that validates.
    pub fn with_options<S, F, Fut>(
        initial: T,
        schema: S,
        on_submit: F,
        options: FormOptions,
    ) -> Self
    where
        S: ValidationSchema<T> + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), SubmitCause>> + Send + 'static,
    {
        let mut state = FormState {
            id: FormId::next(),
            initial: initial.clone(),
            values: initial,
            touched: BTreeMap::new(),
            errors: FormErrors::new(),
            submit_state: SubmitState::Idle,
            submit_count: 0,
            config_error: None,
        };
        state.clear_touched();
        let _ = state.apply_validation(schema.validate(&state.values));
        debug!(form_id = state.id.0, fields = state.touched.len(), "form initialized");

        let on_submit: SubmitHandlerFn<T> =
            Arc::new(move |values: T| -> SubmitFuture { Box::pin(on_submit(values)) });
        Self {
            options,
            state: Arc::new(RwLock::new(state)),
            schema: Arc::new(schema),
            on_submit,
            listeners: Listeners::new(),
        }
    }

    pub fn options(&self) -> FormOptions {
        self.options
    }

    pub fn form_id(&self) -> FormResult<FormId> {
        Ok(read_lock(&self.state, "reading form id")?.id)
    }

    /// Updates one field. A schema fault leaves the form unchanged.
    pub fn set_field_value(&self, name: &str, value: impl Into<FieldValue>) -> FormResult<()> {
        let value = value.into();
        trace!(field = name, "setting field value");
        self.update_values("setting field value", |values| values.set_value(name, value))
    }

    pub fn set<L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        trace!(field = %lens.key(), "setting field through lens");
        self.update_values("setting field through lens", |values| {
            lens.set(values, value);
            Ok(())
        })
    }

    /// Replaces every value at once. The replacement must define exactly the
    /// form's fields; the first field in only one of the two is reported as
    /// [`FormError::UnknownField`].
    pub fn set_values(&self, values: T) -> FormResult<()> {
        self.update_values("replacing form values", |current| {
            let fields: BTreeSet<FieldKey> = current.field_keys().into_iter().collect();
            let replacement: BTreeSet<FieldKey> = values.field_keys().into_iter().collect();
            if let Some(key) = fields.symmetric_difference(&replacement).next() {
                return Err(FormError::UnknownField(key.clone()));
            }
            *current = values;
            Ok(())
        })
    }

    /// In [`ValidationMode::OnBlur`] a schema fault is returned after the
    /// touch has been recorded and observed.
    pub fn set_field_touched(&self, name: &str) -> FormResult<()> {
        let result = {
            let mut state = write_lock(&self.state, "touching field")?;
            let Some(touched) = state.touched.get_mut(name) else {
                return Err(FormError::UnknownField(FieldKey::owned(name)));
            };
            *touched = true;
            trace!(form_id = state.id.0, field = name, "field touched");

            if self.options.validate_mode == ValidationMode::OnBlur {
                let result = self.schema.validate(&state.values);
                state.apply_validation(result)
            } else {
                Ok(())
            }
        };
        self.notify();
        result
    }

    pub fn touch<L>(&self, lens: L) -> FormResult<()>
    where
        L: FieldLens<T>,
    {
        self.set_field_touched(lens.key().as_str())
    }

    /// Runs the schema against the current values and reports whether the form is valid.
    pub fn validate(&self) -> FormResult<bool> {
        let result = {
            let mut state = write_lock(&self.state, "validating form")?;
            let result = self.schema.validate(&state.values);
            state
                .apply_validation(result)
                .map(|()| state.errors.is_empty())
        };
        self.notify();
        result
    }

    /// Submits the form.
    ///
    /// Every field is marked touched and the values are validated; the handler
    /// only runs when validation passes. A second submit while the handler is
    /// pending returns [`SubmitOutcome::Rejected`] without touching the state.
    pub async fn submit(&self) -> FormResult<SubmitOutcome> {
        {
            let mut state = write_lock(&self.state, "preparing submit")?;
            if state.submit_state != SubmitState::Idle {
                debug!(form_id = state.id.0, "submit rejected, another submit is in flight");
                return Ok(SubmitOutcome::Rejected);
            }
            transition_submit_state(&mut state, SubmitState::Validating)?;
            state.submit_count = state.submit_count.saturating_add(1);
            for touched in state.touched.values_mut() {
                *touched = true;
            }
        }
        self.notify();

        let ready = {
            let mut state = write_lock(&self.state, "validating before submit")?;
            let result = self.schema.validate(&state.values);
            if let Err(error) = state.apply_validation(result) {
                transition_submit_state(&mut state, SubmitState::Idle)?;
                drop(state);
                self.notify();
                return Err(error);
            }
            if state.errors.is_empty() {
                transition_submit_state(&mut state, SubmitState::Submitting)?;
                debug!(form_id = state.id.0, "submitting form");
                Ok(state.values.clone())
            } else {
                transition_submit_state(&mut state, SubmitState::Blocked)?;
                debug!(
                    form_id = state.id.0,
                    errors = state.errors.len(),
                    "submit blocked by validation errors"
                );
                Err(state.errors.clone())
            }
        };
        self.notify();

        let values = match ready {
            Ok(values) => values,
            Err(errors) => {
                self.finish_submit("leaving blocked submit")?;
                return Ok(SubmitOutcome::ValidationFailed(errors));
            }
        };

        // Returns the form to Idle even if this future is dropped mid-handler.
        let guard = SubmitGuard {
            controller: self,
            armed: true,
        };
        let handler = self.on_submit.clone();
        let result = AssertUnwindSafe(async move { handler(values).await })
            .catch_unwind()
            .await;
        guard.complete()?;

        match result {
            Ok(Ok(())) => Ok(SubmitOutcome::Submitted),
            Ok(Err(cause)) => {
                warn!(%cause, "submit handler failed");
                Ok(SubmitOutcome::SubmitFailed {
                    cause: cause.to_string(),
                })
            }
            Err(panic) => {
                let message = if let Some(message) = panic.downcast_ref::<&'static str>() {
                    (*message).to_string()
                } else if let Some(message) = panic.downcast_ref::<String>() {
                    message.clone()
                } else {
                    "unknown panic".to_string()
                };
                warn!(panic = %message, "submit handler panicked");
                Ok(SubmitOutcome::SubmitFailed {
                    cause: format!("submit handler panicked: {message}"),
                })
            }
        }
    }

    /// Restores the initial values and clears touched state and the submit count.
    ///
    /// The submit state is left alone: only an in-flight submit moves it off
    /// [`SubmitState::Idle`], and that submit returns it there when it completes.
    pub fn reset(&self) -> FormResult<()> {
        let result = {
            let mut state = write_lock(&self.state, "resetting form")?;
            state.values = state.initial.clone();
            state.clear_touched();
            state.submit_count = 0;
            debug!(form_id = state.id.0, "form reset");
            let result = self.schema.validate(&state.values);
            state.apply_validation(result)
        };
        self.notify();
        result
    }

    /// Restores one field to its initial value and clears its touched flag.
    pub fn reset_field(&self, name: &str) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "resetting field")?;
            let Some(initial) = state.initial.value(name) else {
                return Err(FormError::UnknownField(FieldKey::owned(name)));
            };
            let mut next = state.values.clone();
            next.set_value(name, initial)?;
            if self.options.validate_mode == ValidationMode::OnChange {
                let result = self.schema.validate(&next);
                if let Err(error) = state.apply_validation(result) {
                    drop(state);
                    self.notify();
                    return Err(error);
                }
            }
            state.values = next;
            if let Some(touched) = state.touched.get_mut(name) {
                *touched = false;
            }
        }
        self.notify();
        Ok(())
    }

    pub fn snapshot(&self) -> FormResult<FormSnapshot<T>> {
        let state = read_lock(&self.state, "creating form snapshot")?;
        let dirty = state
            .touched
            .keys()
            .filter(|key| state.is_dirty_field(key.as_str()))
            .cloned()
            .collect();
        Ok(FormSnapshot {
            form_id: state.id,
            values: state.values.clone(),
            touched: state.touched.clone(),
            errors: state.errors.clone(),
            dirty,
            submit_state: state.submit_state,
            is_submitting: state.is_submitting(),
            submit_count: state.submit_count,
            is_valid: state.errors.is_empty() && state.config_error.is_none(),
            config_error: state.config_error.clone(),
        })
    }

    /// Registers a listener called with a fresh snapshot after every state change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&FormSnapshot<T>) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        self.listeners.add(Arc::new(listener))
    }

    pub(super) fn update_values(
        &self,
        context: &'static str,
        mutate: impl FnOnce(&mut T) -> FormResult<()>,
    ) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, context)?;
            let mut next = state.values.clone();
            mutate(&mut next)?;
            if self.options.validate_mode == ValidationMode::OnChange {
                let result = self.schema.validate(&next);
                if let Err(error) = state.apply_validation(result) {
                    drop(state);
                    self.notify();
                    return Err(error);
                }
            }
            state.values = next;
        }
        self.notify();
        Ok(())
    }

    pub(super) fn notify(&self) {
        if self.listeners.is_empty() {
            return;
        }
        match self.snapshot() {
            Ok(snapshot) => self.listeners.emit(&snapshot),
            Err(error) => warn!(%error, "skipping listener notification"),
        }
    }

    fn finish_submit(&self, context: &'static str) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, context)?;
            transition_submit_state(&mut state, SubmitState::Idle)?;
            debug!(form_id = state.id.0, "submit finished");
        }
        self.notify();
        Ok(())
    }
}

/// Holds a form in [`SubmitState::Submitting`] while its handler runs.
struct SubmitGuard<'a, T>
where
    T: FormModel,
{
    controller: &'a FormController<T>,
    armed: bool,
}

impl<T> SubmitGuard<'_, T>
where
    T: FormModel,
{
    fn complete(mut self) -> FormResult<()> {
        self.armed = false;
        self.controller.finish_submit("completing submit")
    }
}

impl<T> Drop for SubmitGuard<'_, T>
where
    T: FormModel,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("submit dropped while the handler was pending");
        if let Err(error) = self.controller.finish_submit("abandoning submit") {
            warn!(%error, "failed to return abandoned submit to idle");
        }
    }
}

pub(super) fn transition_submit_state<T>(
    state: &mut FormState<T>,
    next: SubmitState,
) -> FormResult<()> {
    let current = state.submit_state;
    if current == next {
        return Ok(());
    }

    let allowed = matches!(
        (current, next),
        (SubmitState::Idle, SubmitState::Validating)
            | (SubmitState::Validating, SubmitState::Blocked)
            | (SubmitState::Validating, SubmitState::Submitting)
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
