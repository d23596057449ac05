//! Formwork Core
//!
//! Schema-driven form state for UI frameworks:
//!
//! - **Schema**: ordered fields, each with a structural decoder and optional
//!   type-level and field-level validators
//! - **Validators**: immutable, chainable predicates over numbers and strings
//! - **Field State Store**: per-field live value, baseline and error state,
//!   with change notification for re-rendering
//! - **Mutation Pipeline**: per-field debounced value commits and validation
//! - **Form Controller**: the handle the UI talks to
//!
//! # Example
//!
//! ```rust
//! use formwork_core::prelude::*;
//!
//! let schema = Schema::builder()
//!     .field("age", FieldSpec::new(decode::integer()).validator(validator::numeric().positive()))
//!     .field("bio", FieldSpec::new(decode::optional(decode::string())))
//!     .build();
//!
//! let form = FormController::new(schema, FormOptions::new("profile").controlled(true));
//! form.set(Record::new());
//!
//! assert_eq!(form.required().get("age"), Some(&true));
//! assert_eq!(form.get()["age"], None);
//! assert!(form.get_strict().is_err());
//!
//! form.set_strict(&json!({ "age": 30 }), &DecodeOptions::default()).unwrap();
//! assert_eq!(form.get_strict().unwrap()["age"], json!(30));
//! ```

pub mod controller;
pub mod debounce;
pub mod decode;
pub mod error;
pub mod focus;
pub mod options;
pub mod pipeline;
pub mod schema;
pub mod state;
pub mod store;
pub mod validator;


pub use controller::{FormController, FormControllerBuilder};
pub use decode::{BoxedDecoder, DecodeOptions, DecodeResult, Decoder};
pub use error::{DecodeError, DecodeIssue, FormError, Result};
pub use focus::{element_id, CallbackFocusHost, FocusCallback, FocusHost, NoopFocusHost};
pub use options::{FormOptions, DEFAULT_DEBOUNCE};
pub use schema::{FieldSpec, Record, Schema, SchemaBuilder};
pub use state::{ErrorState, FieldState, FormState};
pub use store::{FormStore, ListenerId, Subscription};
pub use validator::{
    validate_async, validate_with, BoxedFieldValidator, FieldValidator, NumberRule,
    NumberValidator, StringRule, StringValidator, Validator,
};

/// Everything needed to declare and drive a form
pub mod prelude {
    pub use crate::controller::FormController;
    pub use crate::decode::{self, DecodeOptions};
    pub use crate::error::{FormError, Result};
    pub use crate::options::FormOptions;
    pub use crate::schema::{FieldSpec, Record, Schema};
    pub use crate::state::ErrorState;
    pub use crate::validator::{self, validate_async, validate_with};
    pub use serde_json::{json, Value};
}
