use formstate::form::{FieldLens, FieldValue, FormModel};

#[derive(Clone, formstate::form::FormModel)]
struct DemoForm {
    email: String,
    subscribed: bool,
}

fn main() {
    let fields = DemoForm::fields();
    let lens = fields.email();
    let mut model = DemoForm {
        email: "a@example.com".to_string(),
        subscribed: false,
    };
    lens.set(&mut model, "b@example.com".to_string());
    assert_eq!(lens.key().as_str(), "email");
    assert_eq!(lens.get(&model), "b@example.com");

    model
        .set_value("subscribed", FieldValue::Bool(true))
        .expect("subscribed is a bool field");
    assert_eq!(model.value("subscribed"), Some(FieldValue::Bool(true)));
    assert!(model.set_value("subscribed", FieldValue::Text("yes".into())).is_err());
    assert!(model.value("missing").is_none());
}
