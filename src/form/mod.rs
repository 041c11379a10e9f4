mod binding;
mod controller;
mod model;
mod subscription;
mod validation;


pub use binding::{FieldBinding, FieldProps};
pub use controller::{
    FormController, FormError, FormId, FormOptions, FormResult, FormSnapshot, SubmitCause,
    SubmitFuture, SubmitOutcome, SubmitState, ValidationMode,
};
pub use formstate_derive::FormModel;
pub use model::{FieldKey, FieldKind, FieldLens, FieldType, FieldValue, FormModel, FormValues};
pub use subscription::Subscription;
pub use validation::{ConfigError, FormErrors, Rules, Schema, ValidationSchema};
