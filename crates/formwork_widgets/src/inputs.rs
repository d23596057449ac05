//! Typed inputs
//!
//! Each [`InputKind`] knows how to turn a raw widget event into the field
//! value the controller expects. [`FormInput`] pairs a kind with bound
//! [`FieldProps`] and the presentational extras (label, help text).
//!
//! # Example
//!
//! ```ignore
//! use formwork_widgets::prelude::*;
//!
//! let age = FormInput::new(&form, "age", InputKind::Number)
//!     .label("Age")
//!     .help("Whole years")
//!     .error_message("Age must be positive");
//!
//! // wire into the host widget
//! age.input("42");
//! age.blur();
//! ```

use crate::bind::{bind, FieldProps, Indicator};
use formwork_core::FormController;
use serde_json::{Number, Value};

/// Input widget variants
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Date,
    CheckBox,
    Switch,
    Radio,
    NumberRadio,
    Select,
    NumberSelect,
    Color,
}

fn parse_number(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        // left as text so decoding flags it
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

impl InputKind {
    /// Whether the widget is a two-state toggle
    pub fn is_toggle(self) -> bool {
        matches!(self, InputKind::CheckBox | InputKind::Switch)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            InputKind::Number | InputKind::NumberRadio | InputKind::NumberSelect
        )
    }

    /// Convert a raw widget event into the value for `on_change`
    ///
    /// Empty text clears the field to undefined. Toggles ignore `raw` and
    /// flip `current`.
    pub fn parse_event(self, raw: &str, current: Option<&Value>) -> Option<Value> {
        if self.is_toggle() {
            let checked = current.and_then(Value::as_bool).unwrap_or(false);
            return Some(Value::Bool(!checked));
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if self.is_numeric() {
            Some(parse_number(raw))
        } else {
            Some(Value::String(raw.to_string()))
        }
    }
}

/// A bound, typed input
#[derive(Clone, Debug)]
pub struct FormInput {
    props: FieldProps,
    kind: InputKind,
    label: Option<String>,
    help: Option<String>,
}

impl FormInput {
    pub fn new(form: &FormController, name: &str, kind: InputKind) -> Self {
        Self {
            props: bind(form, name),
            kind,
            label: None,
            help: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.props = self.props.with_error_message(message);
        self
    }

    pub fn props(&self) -> &FieldProps {
        &self.props
    }

    pub fn kind(&self) -> InputKind {
        self.kind
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn indicator(&self) -> Indicator {
        self.props.indicator()
    }

    /// Whether a toggle renders checked
    pub fn is_checked(&self) -> bool {
        self.props.value.as_ref().and_then(Value::as_bool).unwrap_or(false)
    }

    /// Forward a raw widget event
    pub fn input(&self, raw: &str) {
        let value = self.kind.parse_event(raw, self.props.value.as_ref());
        tracing::trace!(field = %self.props.name, kind = ?self.kind, "input event");
        self.props.change(value);
    }

    pub fn blur(&self) {
        self.props.blur();
    }
}
