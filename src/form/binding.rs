use serde::Serialize;

use super::controller::{FormController, FormError, FormResult, read_lock};
use super::model::{FieldKey, FieldValue, FormModel};

/// Everything an input needs to render one field.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldProps {
    pub name: FieldKey,
    pub value: FieldValue,
    pub touched: bool,
    pub dirty: bool,
    /// Present only once the field is touched and failing.
    pub error: Option<String>,
}

/// A field bound to its form: change and blur entry points plus props.
#[derive(Clone)]
pub struct FieldBinding<T>
where
    T: FormModel,
{
    controller: FormController<T>,
    name: FieldKey,
}

impl<T> FieldBinding<T>
where
    T: FormModel,
{
    pub fn name(&self) -> &FieldKey {
        &self.name
    }

    pub fn props(&self) -> FormResult<FieldProps> {
        self.controller.field_props(self.name.as_str())
    }

    pub fn on_change(&self, value: impl Into<FieldValue>) -> FormResult<()> {
        self.controller.set_field_value(self.name.as_str(), value)
    }

    pub fn on_blur(&self) -> FormResult<()> {
        self.controller.set_field_touched(self.name.as_str())
    }

    pub fn error(&self) -> FormResult<Option<String>> {
        self.controller.error_for_display(self.name.as_str())
    }
}

impl<T> FormController<T>
where
    T: FormModel,
{
    pub fn field_props(&self, name: &str) -> FormResult<FieldProps> {
        let state = read_lock(&self.state, "reading field props")?;
        let Some(value) = state.values.value(name) else {
            return Err(FormError::UnknownField(FieldKey::owned(name)));
        };
        let touched = state.touched.get(name).copied().unwrap_or(false);
        let error = touched
            .then(|| state.errors.get(name).map(str::to_owned))
            .flatten();
        Ok(FieldProps {
            name: FieldKey::owned(name),
            value,
            touched,
            dirty: state.is_dirty_field(name),
            error,
        })
    }

    /// The field's error, hidden until the field has been touched.
    pub fn error_for_display(&self, name: &str) -> FormResult<Option<String>> {
        Ok(self.field_props(name)?.error)
    }

    /// Fails with [`FormError::UnknownField`] when `name` is not a form field.
    pub fn bind(&self, name: impl Into<FieldKey>) -> FormResult<FieldBinding<T>> {
        let name = name.into();
        if !read_lock(&self.state, "binding field")?
            .touched
            .contains_key(name.as_str())
        {
            return Err(FormError::UnknownField(name));
        }
        Ok(FieldBinding {
            controller: self.clone(),
            name,
        })
    }
}
