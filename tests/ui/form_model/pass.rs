use calmform::form::{FieldLens, FormController, FormModel, FormOptions};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, calmform::form::FormModel)]
struct DemoForm {
    email: String,
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Clone, Serialize, Deserialize, calmform::form::FormModel)]
pub struct PublicForm {
    pub title: String,
}

fn main() {
    assert_eq!(PublicForm::fields().title().key().as_str(), "title");

    let fields = DemoForm::fields();
    assert_eq!(fields.email().key().as_str(), "email");
    assert_eq!(fields.display_name().key().as_str(), "displayName");
    assert_eq!(DemoForm::field_keys(), &["email", "displayName"]);

    let form = DemoForm {
        email: "a@calm.form".to_string(),
        display_name: "Ann".to_string(),
    };
    let controller = FormController::from_model(&form, FormOptions::default()).unwrap();
    controller
        .set_field(fields.email(), "b@calm.form".to_string())
        .unwrap();
    assert_eq!(
        controller.field(fields.email()).unwrap().as_deref(),
        Some("b@calm.form")
    );
    let model: DemoForm = controller.model().unwrap();
    assert_eq!(model.display_name, "Ann");
}
