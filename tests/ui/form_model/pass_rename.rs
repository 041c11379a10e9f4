use formstate::form::{FieldKey, FieldLens, FormModel};

#[derive(Clone, formstate::form::FormModel)]
#[form(rename_all = "camelCase")]
struct SignupForm {
    display_name: String,
    #[form(rename = "acceptTerms")]
    terms: bool,
}

fn main() {
    let form = SignupForm {
        display_name: String::new(),
        terms: false,
    };
    assert_eq!(
        form.field_keys(),
        vec![FieldKey::new("displayName"), FieldKey::new("acceptTerms")]
    );
    assert_eq!(SignupForm::fields().terms().key().as_str(), "acceptTerms");
}
