//! Field and form state
//!
//! [`FormState`] is an immutable snapshot: one [`FieldState`] per schema
//! field, in schema order, no more and no less. Every mutation consumes the
//! snapshot and returns a new one, copying the underlying map only when
//! another reader still holds the old snapshot. Readers therefore never see a
//! half-applied update.

use crate::schema::{Record, Schema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Validation status of one field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorState {
    /// Not validated since the last change or baseline reset
    #[default]
    Unknown,
    /// Passed decode and every validator
    Valid,
    /// Failed decode or a validator (or was flagged externally)
    Invalid,
}

impl ErrorState {
    pub fn is_invalid(self) -> bool {
        self == ErrorState::Invalid
    }

    pub fn is_valid(self) -> bool {
        self == ErrorState::Valid
    }

    /// `None` / `Some(true)` / `Some(false)` for unknown / invalid / valid
    pub fn as_flag(self) -> Option<bool> {
        match self {
            ErrorState::Unknown => None,
            ErrorState::Valid => Some(false),
            ErrorState::Invalid => Some(true),
        }
    }

    /// Outcome of a validation run
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            ErrorState::Valid
        } else {
            ErrorState::Invalid
        }
    }
}

impl From<bool> for ErrorState {
    /// `true` means "has an error"
    fn from(error: bool) -> Self {
        ErrorState::from_valid(!error)
    }
}

impl From<Option<bool>> for ErrorState {
    fn from(error: Option<bool>) -> Self {
        error.map(ErrorState::from).unwrap_or_default()
    }
}

/// Baseline, live value and validation status of one field
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldState {
    /// Baseline the field resets to (`None` = undefined)
    pub default_value: Option<Value>,
    /// Live value (`None` = undefined)
    pub value: Option<Value>,
    pub error: ErrorState,
}

impl FieldState {
    pub fn new(baseline: Option<Value>) -> Self {
        Self {
            value: baseline.clone(),
            default_value: baseline,
            error: ErrorState::Unknown,
        }
    }

    /// Live value differs from the baseline
    pub fn is_dirty(&self) -> bool {
        self.value != self.default_value
    }
}

/// Copy-on-write snapshot of every field's state
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormState {
    fields: Arc<IndexMap<String, FieldState>>,
}

impl FormState {
    /// One entry per schema field; fields absent from `baseline` start undefined
    pub fn init(schema: &Schema, baseline: &Record) -> Self {
        let fields = schema
            .names()
            .map(|name| (name.to_string(), FieldState::new(baseline.get(name).cloned())))
            .collect();
        Self {
            fields: Arc::new(fields),
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldState)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn patch(mut self, name: &str, f: impl FnOnce(&mut FieldState)) -> Self {
        if self.fields.contains_key(name) {
            if let Some(field) = Arc::make_mut(&mut self.fields).get_mut(name) {
                f(field);
            }
        }
        self
    }

    /// Replace one field's live value; its error state is left alone
    pub fn patch_value(self, name: &str, value: Option<Value>) -> Self {
        self.patch(name, |field| field.value = value)
    }

    /// Replace one field's error state
    pub fn patch_error(self, name: &str, error: ErrorState) -> Self {
        self.patch(name, |field| field.error = error)
    }

    /// Every field back to its baseline, error state unknown
    pub fn reset_all(mut self) -> Self {
        for field in Arc::make_mut(&mut self.fields).values_mut() {
            field.value = field.default_value.clone();
            field.error = ErrorState::Unknown;
        }
        self
    }

    /// Live value of every field (`None` for undefined)
    pub fn read_all(&self) -> IndexMap<String, Option<Value>> {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone()))
            .collect()
    }

    /// Live value of every field, with undefined replaced by `null` ("clear")
    pub fn read_changes(&self) -> Record {
        self.fields
            .iter()
            .map(|(name, field)| (name.clone(), field.value.clone().unwrap_or(Value::Null)))
            .collect()
    }

    /// Defined live values only, as a JSON object
    pub fn to_object(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .filter_map(|(name, field)| field.value.clone().map(|v| (name.clone(), v)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use crate::schema::FieldSpec;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::builder()
            .field("title", FieldSpec::new(decode::string()))
            .field("count", FieldSpec::new(decode::integer()))
            .build()
    }

    fn baseline() -> Record {
        let mut record = Record::new();
        record.insert("title".into(), json!("draft"));
        record.insert("ignored".into(), json!(true));
        record
    }

    #[test]
    fn test_init_has_exactly_schema_fields() {
        let state = FormState::init(&schema(), &baseline());
        let names: Vec<_> = state.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["title", "count"]);

        let title = state.field("title").unwrap();
        assert_eq!(title.default_value, Some(json!("draft")));
        assert_eq!(title.value, Some(json!("draft")));
        assert_eq!(title.error, ErrorState::Unknown);
        assert_eq!(state.field("count").unwrap(), &FieldState::default());
    }

    #[test]
    fn test_patch_value_leaves_error_and_others() {
        let state = FormState::init(&schema(), &baseline())
            .patch_error("title", ErrorState::Invalid)
            .patch_value("title", Some(json!("final")));

        let title = state.field("title").unwrap();
        assert_eq!(title.value, Some(json!("final")));
        assert_eq!(title.default_value, Some(json!("draft")));
        assert_eq!(title.error, ErrorState::Invalid);
        assert_eq!(state.field("count").unwrap().value, None);
    }

    #[test]
    fn test_patch_unknown_field_is_noop() {
        let state = FormState::init(&schema(), &baseline());
        let patched = state.clone().patch_value("nope", Some(json!(1)));
        assert_eq!(state, patched);
        assert!(!patched.contains("nope"));
    }

    #[test]
    fn test_snapshots_are_isolated() {
        let before = FormState::init(&schema(), &baseline());
        let after = before.clone().patch_value("count", Some(json!(3)));
        assert_eq!(before.field("count").unwrap().value, None);
        assert_eq!(after.field("count").unwrap().value, Some(json!(3)));
    }

    #[test]
    fn test_reset_all_is_idempotent() {
        let dirty = FormState::init(&schema(), &baseline())
            .patch_value("title", Some(json!("x")))
            .patch_error("title", ErrorState::Valid)
            .patch_value("count", Some(json!(9)));

        let once = dirty.reset_all();
        let twice = once.clone().reset_all();
        assert_eq!(once, twice);
        for (_, field) in once.iter() {
            assert_eq!(field.value, field.default_value);
            assert_eq!(field.error, ErrorState::Unknown);
        }
    }

    #[test]
    fn test_read_changes_nulls_undefined() {
        let state = FormState::init(&schema(), &baseline());
        let all = state.read_all();
        assert_eq!(all["count"], None);

        let changes = state.read_changes();
        assert_eq!(changes["title"], json!("draft"));
        assert_eq!(changes["count"], Value::Null);
        assert_eq!(state.to_object(), json!({ "title": "draft" }));
    }

    #[test]
    fn test_error_state_flags() {
        assert_eq!(ErrorState::from(true), ErrorState::Invalid);
        assert_eq!(ErrorState::from(false), ErrorState::Valid);
        assert_eq!(ErrorState::from(None), ErrorState::Unknown);
        assert_eq!(ErrorState::Invalid.as_flag(), Some(true));
        assert_eq!(ErrorState::Unknown.as_flag(), None);
    }
}
