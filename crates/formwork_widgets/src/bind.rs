//! Field binding
//!
//! [`bind`] turns a controller and a field name into the prop bundle an
//! input widget renders from. Widgets never reach into the controller; they
//! read [`FieldProps`] and call its handlers.

use formwork_core::{element_id, ErrorState, FormController};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Called with the new field value (`None` = cleared to undefined)
pub type ChangeHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Called when the widget loses focus
pub type BlurHandler = Arc<dyn Fn() + Send + Sync>;

/// What a widget shows next to its value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Indicator {
    /// Not validated since the last change
    #[default]
    Neutral,
    /// Validated and edited away from the baseline
    Valid,
    Invalid,
}

/// Everything an input widget needs to render one field
#[derive(Clone)]
pub struct FieldProps {
    pub name: String,
    /// Element ID, `"{form_id}-{name}"`
    pub id: String,
    pub form_id: String,
    /// Whether `value` should drive the widget (otherwise only `default_value` seeds it)
    pub controlled: bool,
    pub value: Option<Value>,
    pub default_value: Option<Value>,
    pub required: bool,
    pub error: ErrorState,
    /// Text shown while the field is invalid
    pub error_message: Option<String>,
    pub on_change: ChangeHandler,
    pub on_blur: BlurHandler,
}

impl fmt::Debug for FieldProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldProps")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("controlled", &self.controlled)
            .field("value", &self.value)
            .field("default_value", &self.default_value)
            .field("required", &self.required)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl FieldProps {
    /// Custom error text
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn indicator(&self) -> Indicator {
        match self.error {
            ErrorState::Invalid => Indicator::Invalid,
            ErrorState::Valid if self.value != self.default_value => Indicator::Valid,
            _ => Indicator::Neutral,
        }
    }

    /// Error text to display, only while invalid
    pub fn feedback(&self) -> Option<&str> {
        match self.indicator() {
            Indicator::Invalid => self.error_message.as_deref(),
            _ => None,
        }
    }

    /// ID of the help text element
    pub fn help_id(&self) -> String {
        format!("{}-help", self.id)
    }

    pub fn change(&self, value: Option<Value>) {
        (self.on_change)(value);
    }

    pub fn blur(&self) {
        (self.on_blur)();
    }
}

/// Bind field `name` of `form` for one render
///
/// The props are a snapshot: re-bind after the controller notifies a change.
pub fn bind(form: &FormController, name: &str) -> FieldProps {
    if !form.schema().contains(name) {
        tracing::warn!(form_id = %form.form_id(), field = name, "binding unknown field");
    }
    let field = form.field(name).unwrap_or_default();

    let change_form = form.clone();
    let change_name = name.to_string();
    let blur_form = form.clone();
    let blur_name = name.to_string();

    FieldProps {
        name: name.to_string(),
        id: element_id(form.form_id(), name),
        form_id: form.form_id().to_string(),
        controlled: form.is_controlled(),
        value: field.value,
        default_value: field.default_value,
        required: form.is_required(name),
        error: field.error,
        error_message: None,
        on_change: Arc::new(move |value| change_form.on_change(value, &change_name)),
        on_blur: Arc::new(move || blur_form.on_blur(&blur_name)),
    }
}
