use std::sync::{Arc, Mutex};

use formstate::form::{
    FieldKey, FormController, FormErrors, FormValues, Rules, Schema, SubmitCause, SubmitOutcome,
};
use futures::executor::block_on;
use pretty_assertions::assert_eq;

fn initial_values() -> FormValues {
    FormValues::new()
        .with("email", "")
        .with("password", "")
        .with("rememberMe", false)
}

fn login_schema() -> Schema {
    Schema::new()
        .field(
            "email",
            Rules::text()
                .email()
                .message("Please enter a valid email address")
                .required()
                .message("Email field is required"),
        )
        .field(
            "password",
            Rules::text()
                .required()
                .message("Password field is required"),
        )
}

fn login_controller() -> (FormController<FormValues>, Arc<Mutex<Vec<FormValues>>>) {
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let sink = submitted.clone();
    let controller = FormController::new(initial_values(), login_schema(), move |values| {
        let sink = sink.clone();
        async move {
            sink.lock().expect("submit sink lock").push(values);
            Ok::<(), SubmitCause>(())
        }
    });
    (controller, submitted)
}

#[test]
fn empty_login_is_blocked_with_required_messages() {
    let (controller, submitted) = login_controller();

    let outcome = block_on(controller.submit()).expect("submit");
    let expected = FormErrors::new()
        .with("email", "Email field is required")
        .with("password", "Password field is required");
    assert_eq!(outcome, SubmitOutcome::ValidationFailed(expected.clone()));

    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.errors, expected);
    assert!(snapshot.touched.values().all(|touched| *touched));
    assert_eq!(snapshot.touched.len(), 3);
    assert_eq!(snapshot.submit_count, 1);
    assert!(submitted.lock().expect("sink").is_empty());
    assert_eq!(
        snapshot.visible_error("email"),
        Some("Email field is required")
    );
}

#[test]
fn filled_login_submits_values_once() {
    let (controller, submitted) = login_controller();
    controller
        .set_field_value("email", "a@b.com")
        .expect("set email");
    controller
        .set_field_value("password", "secret")
        .expect("set password");

    let outcome = block_on(controller.submit()).expect("submit");
    assert_eq!(outcome, SubmitOutcome::Submitted);

    let expected = FormValues::new()
        .with("email", "a@b.com")
        .with("password", "secret")
        .with("rememberMe", false);
    assert_eq!(*submitted.lock().expect("sink"), vec![expected]);

    let snapshot = controller.snapshot().expect("snapshot");
    assert!(snapshot.errors.is_empty());
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.submit_count, 1);
}

#[test]
fn rejected_handler_reports_network_failure() {
    let controller = FormController::new(initial_values(), login_schema(), |_values| async {
        Err::<(), SubmitCause>("network down".into())
    });
    controller
        .set_field_value("email", "a@b.com")
        .expect("set email");
    controller
        .set_field_value("password", "secret")
        .expect("set password");
    let before = controller.snapshot().expect("snapshot").values;

    let outcome = block_on(controller.submit()).expect("submit");
    assert_eq!(
        outcome,
        SubmitOutcome::SubmitFailed {
            cause: "network down".to_string()
        }
    );

    let snapshot = controller.snapshot().expect("snapshot");
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.values, before);
}

#[test]
fn reset_after_editing_matches_a_fresh_form() {
    let (controller, _) = login_controller();
    let fresh = controller.snapshot().expect("fresh snapshot");

    controller
        .set_field_value("email", "a@b.com")
        .expect("set email");
    controller
        .set_field_touched("password")
        .expect("touch password");
    let _ = block_on(controller.submit()).expect("submit");

    controller.reset().expect("reset");
    let snapshot = controller.snapshot().expect("snapshot");
    assert_eq!(snapshot.values, fresh.values);
    assert_eq!(snapshot.touched, fresh.touched);
    assert_eq!(snapshot.errors, fresh.errors);
    assert_eq!(snapshot.submit_count, 0);
    assert!(!snapshot.is_touched("password"));
    assert_eq!(
        snapshot.touched.keys().cloned().collect::<Vec<_>>(),
        vec![
            FieldKey::new("email"),
            FieldKey::new("password"),
            FieldKey::new("rememberMe"),
        ]
    );
}
