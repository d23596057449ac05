//! Form configuration
//!
//! Options can be built in code or loaded from TOML:
//!
//! ```toml
//! form_id = "signup"
//! controlled = false
//! validator_debounce_ms = 250
//! revalidate_invalid = false
//!
//! [decode]
//! coerce_all = true
//! ```

use crate::decode::DecodeOptions;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default debounce window for value commits and validation
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

/// Per-form settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormOptions {
    /// Identifier of the host form element, used for focus-on-error lookup
    pub form_id: String,
    /// Commit values synchronously; only validation is debounced
    pub controlled: bool,
    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub validator_debounce_ms: u64,
    /// Re-run validation in `valid()` for fields already flagged invalid
    pub revalidate_invalid: bool,
    /// Options for `set_strict` decoding
    pub decode: DecodeOptions,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            form_id: String::new(),
            controlled: false,
            validator_debounce_ms: default_debounce_ms(),
            revalidate_invalid: false,
            decode: DecodeOptions::default(),
        }
    }
}

impl FormOptions {
    pub fn new(form_id: impl Into<String>) -> Self {
        Self {
            form_id: form_id.into(),
            ..Default::default()
        }
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn controlled(mut self, controlled: bool) -> Self {
        self.controlled = controlled;
        self
    }

    pub fn debounce(mut self, delay: Duration) -> Self {
        self.validator_debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn revalidate_invalid(mut self, revalidate: bool) -> Self {
        self.revalidate_invalid = revalidate;
        self
    }

    pub fn coerce_all(mut self, coerce: bool) -> Self {
        self.decode.coerce_all = coerce;
        self
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.validator_debounce_ms)
    }
}
