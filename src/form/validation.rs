use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{FieldKey, FieldKind, FieldValue, FormModel};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// The schema and the form's values do not describe the same fields.
#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize, Deserialize)]
pub enum ConfigError {
    #[error("validation schema requires field `{0}` which the form does not define")]
    MissingField(FieldKey),
    #[error("validation schema expects field `{field}` to hold a {expected} value, got {found}")]
    TypeMismatch {
        field: FieldKey,
        expected: FieldKind,
        found: FieldKind,
    },
}

/// Field name to message, for every field that currently fails validation.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<FieldKey, String>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<FieldKey>, message: impl Into<String>) -> Self {
        self.insert(name, message);
        self
    }

    pub fn insert(&mut self, name: impl Into<FieldKey>, message: impl Into<String>) {
        self.0.insert(name.into(), message.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &str)> {
        self.0.iter().map(|(key, message)| (key, message.as_str()))
    }
}

impl FromIterator<(FieldKey, String)> for FormErrors {
    fn from_iter<I: IntoIterator<Item = (FieldKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Maps form values to the errors of the fields that fail.
///
/// Must be pure and deterministic: the controller calls it on every change.
/// `Err` is reserved for a schema that does not fit the form's fields.
pub trait ValidationSchema<T>: Send + Sync {
    fn validate(&self, values: &T) -> Result<FormErrors, ConfigError>;
}

impl<T, F> ValidationSchema<T> for F
where
    F: Fn(&T) -> Result<FormErrors, ConfigError> + Send + Sync,
{
    fn validate(&self, values: &T) -> Result<FormErrors, ConfigError> {
        (self)(values)
    }
}

type CustomCheck = Arc<dyn Fn(&FieldValue) -> Option<String> + Send + Sync>;

#[derive(Clone)]
enum Check {
    Required,
    Email,
    MinLength(usize),
    MaxLength(usize),
    Matches(Regex),
    EqualsField(FieldKey),
    IsTrue,
    Custom(CustomCheck),
}

#[derive(Clone)]
struct Rule {
    check: Check,
    message: Option<String>,
}

/// Ordered rules for one field. The first failing rule supplies the message.
///
/// Format rules (`email`, `min_length`, `max_length`, `matches`) accept an
/// empty string; pair them with `required` to reject it.
#[derive(Clone)]
pub struct Rules {
    kind: FieldKind,
    rules: Vec<Rule>,
}

impl Rules {
    pub fn text() -> Self {
        Self {
            kind: FieldKind::Text,
            rules: Vec::new(),
        }
    }

    pub fn boolean() -> Self {
        Self {
            kind: FieldKind::Bool,
            rules: Vec::new(),
        }
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn required(self) -> Self {
        self.push(Check::Required)
    }

    pub fn email(self) -> Self {
        self.push(Check::Email)
    }

    pub fn min_length(self, min: usize) -> Self {
        self.push(Check::MinLength(min))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.push(Check::MaxLength(max))
    }

    pub fn matches(self, pattern: Regex) -> Self {
        self.push(Check::Matches(pattern))
    }

    /// Cross-field rule: the value must equal the value of `other`.
    pub fn equals_field(self, other: impl Into<FieldKey>) -> Self {
        self.push(Check::EqualsField(other.into()))
    }

    pub fn is_true(self) -> Self {
        self.push(Check::IsTrue)
    }

    /// `check` returns the message when the value is invalid.
    pub fn custom(
        self,
        check: impl Fn(&FieldValue) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.push(Check::Custom(Arc::new(check)))
    }

    /// Overrides the message of the rule added last.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        if let Some(rule) = self.rules.last_mut() {
            rule.message = Some(message.into());
        }
        self
    }

    fn push(mut self, check: Check) -> Self {
        self.rules.push(Rule {
            check,
            message: None,
        });
        self
    }

    fn check(
        &self,
        key: &FieldKey,
        value: &FieldValue,
        lookup: &dyn Fn(&str) -> Option<FieldValue>,
    ) -> Result<Option<String>, ConfigError> {
        if value.kind() != self.kind {
            return Err(ConfigError::TypeMismatch {
                field: key.clone(),
                expected: self.kind,
                found: value.kind(),
            });
        }

        for rule in &self.rules {
            if !passes(&rule.check, value, lookup)? {
                let message = rule
                    .message
                    .clone()
                    .unwrap_or_else(|| default_message(&rule.check, key));
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

impl fmt::Debug for Rules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rules")
            .field("kind", &self.kind)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn passes(
    check: &Check,
    value: &FieldValue,
    lookup: &dyn Fn(&str) -> Option<FieldValue>,
) -> Result<bool, ConfigError> {
    let text = value.as_text().unwrap_or_default();
    let passed = match check {
        Check::Required => match value {
            FieldValue::Text(text) => !text.is_empty(),
            FieldValue::Bool(_) => true,
        },
        Check::Email => text.is_empty() || EMAIL_PATTERN.is_match(text),
        Check::MinLength(min) => text.is_empty() || text.chars().count() >= *min,
        Check::MaxLength(max) => text.chars().count() <= *max,
        Check::Matches(pattern) => text.is_empty() || pattern.is_match(text),
        Check::EqualsField(other) => {
            let other_value =
                lookup(other.as_str()).ok_or_else(|| ConfigError::MissingField(other.clone()))?;
            &other_value == value
        }
        Check::IsTrue => value.as_bool() == Some(true),
        Check::Custom(check) => check(value).is_none(),
    };
    Ok(passed)
}

fn default_message(check: &Check, key: &FieldKey) -> String {
    match check {
        Check::Required => format!("{key} is a required field"),
        Check::Email => format!("{key} must be a valid email"),
        Check::MinLength(min) => format!("{key} must be at least {min} characters"),
        Check::MaxLength(max) => format!("{key} must be at most {max} characters"),
        Check::Matches(pattern) => {
            format!("{key} must match the following: \"{}\"", pattern.as_str())
        }
        Check::EqualsField(other) => format!("{key} must match {other}"),
        Check::IsTrue => format!("{key} field must be true"),
        Check::Custom(_) => format!("{key} is invalid"),
    }
}

/// Rule-based schema over named fields.
///
/// ```
/// use formstate::form::{Rules, Schema};
///
/// let schema = Schema::new()
///     .field(
///         "email",
///         Rules::text()
///             .email()
///             .message("Please enter a valid email address")
///             .required()
///             .message("Email field is required"),
///     )
///     .field("password", Rules::text().required().message("Password field is required"));
/// assert_eq!(schema.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<(FieldKey, Rules)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<FieldKey>, rules: Rules) -> Self {
        let name = name.into();
        self.fields.retain(|(key, _)| key != &name);
        self.fields.push((name, rules));
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.iter().map(|(key, _)| key)
    }
}

impl<T> ValidationSchema<T> for Schema
where
    T: FormModel,
{
    fn validate(&self, values: &T) -> Result<FormErrors, ConfigError> {
        let lookup = |name: &str| values.value(name);
        let mut errors = FormErrors::new();
        for (key, rules) in &self.fields {
            let value = values
                .value(key.as_str())
                .ok_or_else(|| ConfigError::MissingField(key.clone()))?;
            if let Some(message) = rules.check(key, &value, &lookup)? {
                errors.insert(key.clone(), message);
            }
        }
        Ok(errors)
    }
}
