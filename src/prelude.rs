pub use crate::form::{
    FieldKey, FieldLens, FieldValue, FormController, FormErrors, FormModel, FormOptions,
    FormResult, FormSnapshot, FormValues, Rules, Schema, SubmitOutcome, SubmitState,
    ValidationMode, ValidationSchema,
};
