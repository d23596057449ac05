//! Form schema
//!
//! A [`Schema`] is an ordered set of named fields. Each field carries a
//! structural [`Decoder`] and up to two asynchronous validators: one that
//! belongs to the field's type (shared wherever the type is reused) and one
//! that belongs to this particular field. Validation always runs the decoder
//! first; a value that fails decoding never reaches a validator.
//!
//! The schema is immutable once built and is shared by reference (`Arc`)
//! between controllers.
//!
//! # Example
//!
//! ```rust
//! use formwork_core::schema::{FieldSpec, Schema};
//! use formwork_core::{decode, validator};
//!
//! let schema = Schema::builder()
//!     .field("name", FieldSpec::new(decode::string()).validator(validator::string().min_length(1)))
//!     .field("age", FieldSpec::new(decode::optional(decode::integer())))
//!     .build();
//!
//! assert_eq!(schema.required_map().get("name"), Some(&true));
//! assert_eq!(schema.required_map().get("age"), Some(&false));
//! ```

use crate::decode::{BoxedDecoder, DecodeOptions, DecodeResult};
use crate::error::{DecodeError, DecodeIssue};
use crate::validator::{BoxedFieldValidator, FieldValidator};
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A record keyed by field name, in schema order
pub type Record = IndexMap<String, Value>;

/// Declaration of one field
#[derive(Clone)]
pub struct FieldSpec {
    decoder: BoxedDecoder,
    type_validator: Option<BoxedFieldValidator>,
    validator: Option<BoxedFieldValidator>,
}

impl FieldSpec {
    pub fn new(decoder: BoxedDecoder) -> Self {
        Self {
            decoder,
            type_validator: None,
            validator: None,
        }
    }

    /// Validator that belongs to the field's type; runs before [`FieldSpec::validator`]
    pub fn type_validator(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.type_validator = Some(Arc::new(validator));
        self
    }

    /// Field-specific validator
    pub fn validator(mut self, validator: impl FieldValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn decoder(&self) -> &BoxedDecoder {
        &self.decoder
    }

    pub fn is_required(&self) -> bool {
        self.decoder.required_probe()
    }

    /// Decode gate, then type validator, then field validator
    ///
    /// An undefined value that the decoder accepts (optional field) has
    /// nothing to validate and counts as valid.
    pub async fn validate(&self, value: Option<&Value>) -> bool {
        let decoded = match self.decoder.decode(value, &DecodeOptions::default()) {
            Ok(decoded) => decoded,
            Err(_) => return false,
        };
        let Some(decoded) = decoded else {
            return true;
        };
        for validator in [&self.type_validator, &self.validator].into_iter().flatten() {
            // sequential so the type check gates the field check
            if !validator.validate(&decoded).await {
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("decoder", &self.decoder.name())
            .field("type_validator", &self.type_validator.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Ordered collection of field declarations
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldSpec>,
}

/// Builder for [`Schema`]
#[derive(Default)]
pub struct SchemaBuilder {
    fields: IndexMap<String, FieldSpec>,
}

impl SchemaBuilder {
    /// Declare a field; redeclaring a name replaces it in place
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            fields: self.fields,
        }
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Which fields must be present, probed from each decoder
    pub fn required_map(&self) -> IndexMap<String, bool> {
        self.fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.is_required()))
            .collect()
    }

    /// Decode a single field's raw value
    pub fn decode_field(&self, name: &str, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult {
        let spec = self.fields.get(name).ok_or_else(|| {
            DecodeError::from_issue(DecodeIssue::new(name, "declared field", "unknown field"))
        })?;
        spec.decoder
            .decode(value, opts)
            .map_err(|err| err.at_field(name))
    }

    /// Decode a record where every field may be missing
    ///
    /// Keys not declared by the schema are dropped.
    pub fn decode_partial(&self, value: &Value, opts: &DecodeOptions) -> Result<Record, DecodeError> {
        self.decode_record(value, opts, false)
    }

    /// Decode a record against the complete shape: required fields must be present
    pub fn decode_strict(&self, value: &Value, opts: &DecodeOptions) -> Result<Record, DecodeError> {
        self.decode_record(value, opts, true)
    }

    fn decode_record(&self, value: &Value, opts: &DecodeOptions, strict: bool) -> Result<Record, DecodeError> {
        let Value::Object(object) = value else {
            return Err(DecodeError::new("object", format!("invalid value {value}")));
        };

        let mut record = Record::with_capacity(self.fields.len());
        let mut issues = Vec::new();
        for (name, spec) in &self.fields {
            let raw = object.get(name);
            if raw.is_none() && !strict {
                continue;
            }
            match spec.decoder.decode(raw, opts) {
                Ok(Some(decoded)) => {
                    record.insert(name.clone(), decoded);
                }
                Ok(None) => {}
                Err(err) => issues.extend(err.at_field(name).into_issues()),
            }
        }

        match DecodeError::from_issues(issues) {
            Some(err) => Err(err),
            None => Ok(record),
        }
    }
}
