//! Field decoders
//!
//! A [`Decoder`] performs the structural half of validation: it checks (and,
//! with [`DecodeOptions::coerce_all`], coerces) one raw field value into its
//! canonical JSON shape. Absence of a value ("undefined") is modelled as
//! `None` on both sides, so a decoder can tell "missing" from `null`.
//!
//! Whether a field is required is never declared; it is probed by decoding
//! `None` (see [`Decoder::required_probe`]).
//!
//! # Example
//!
//! ```rust
//! use formwork_core::decode::{self, Decoder, DecodeOptions};
//! use serde_json::json;
//!
//! let age = decode::integer();
//! assert!(age.required_probe());
//! assert_eq!(age.decode(Some(&json!(25)), &DecodeOptions::default()), Ok(Some(json!(25))));
//!
//! let coerce = DecodeOptions { coerce_all: true };
//! assert_eq!(age.decode(Some(&json!("25")), &coerce), Ok(Some(json!(25))));
//!
//! let nickname = decode::optional(decode::string());
//! assert!(!nickname.required_probe());
//! ```

use crate::error::DecodeError;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::sync::Arc;

/// Options controlling a decode pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Permit lossy coercion (numeric strings to numbers, `"true"` to booleans, ...)
    pub coerce_all: bool,
}

/// Result of decoding one field: `Ok(None)` means "undefined, and that's fine"
pub type DecodeResult = Result<Option<Value>, DecodeError>;

/// Structural decoder for a single field value
pub trait Decoder: Send + Sync {
    /// Type name used in error messages
    fn name(&self) -> &str;

    /// Decode a raw value (`None` = undefined)
    fn decode(&self, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult;

    /// Whether the field must be present: true iff decoding `None` fails
    fn required_probe(&self) -> bool {
        self.decode(None, &DecodeOptions::default()).is_err()
    }
}

/// Shared, type-erased decoder
pub type BoxedDecoder = Arc<dyn Decoder>;

fn missing(name: &str) -> DecodeError {
    DecodeError::new(name, "missing required value")
}

fn mismatch(name: &str, got: &Value) -> DecodeError {
    DecodeError::new(name, format!("invalid value {got}"))
}

// =============================================================================
// COERCION
// =============================================================================

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .or_else(|| Some(value.clone()))
        }
        Value::Bool(b) => Some(Value::Number(u8::from(*b).into())),
        other => Some(other.clone()),
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => match s.trim() {
            "true" | "1" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "off" => Some(Value::Bool(false)),
            "" => None,
            _ => Some(value.clone()),
        },
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => Some(Value::Bool(false)),
            Some(f) if f == 1.0 => Some(Value::Bool(true)),
            _ => Some(value.clone()),
        },
        other => Some(other.clone()),
    }
}

fn coerce_string(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        other => Some(other.clone()),
    }
}

// =============================================================================
// PRIMITIVE DECODERS
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Coercion {
    Number,
    Bool,
    String,
}

/// Decoder over a single primitive predicate
struct Primitive {
    name: &'static str,
    coercion: Coercion,
    accept: fn(&Value) -> bool,
}

impl Decoder for Primitive {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult {
        let Some(raw) = value else {
            return Err(missing(self.name));
        };
        let coerced = if opts.coerce_all {
            match self.coercion {
                Coercion::Number => coerce_number(raw),
                Coercion::Bool => coerce_bool(raw),
                Coercion::String => coerce_string(raw),
            }
        } else {
            Some(raw.clone())
        };
        match coerced {
            None => Err(missing(self.name)),
            Some(v) if (self.accept)(&v) => Ok(Some(v)),
            Some(_) => Err(mismatch(self.name, raw)),
        }
    }
}

fn primitive(name: &'static str, coercion: Coercion, accept: fn(&Value) -> bool) -> BoxedDecoder {
    Arc::new(Primitive {
        name,
        coercion,
        accept,
    })
}

fn is_integral(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Any JSON string
pub fn string() -> BoxedDecoder {
    primitive("string", Coercion::String, Value::is_string)
}

/// Any finite number
pub fn number() -> BoxedDecoder {
    primitive("number", Coercion::Number, Value::is_number)
}

/// Number without a fractional part
pub fn integer() -> BoxedDecoder {
    primitive("integer", Coercion::Number, |v| match v {
        Value::Number(n) => is_integral(n),
        _ => false,
    })
}

/// Non-negative integer identifier
pub fn id() -> BoxedDecoder {
    primitive("identifier", Coercion::Number, |v| match v {
        Value::Number(n) => is_integral(n) && n.as_f64().is_some_and(|f| f >= 0.0),
        _ => false,
    })
}

pub fn boolean() -> BoxedDecoder {
    primitive("boolean", Coercion::Bool, Value::is_boolean)
}

/// Accepts any truthy value
pub fn true_type() -> BoxedDecoder {
    primitive("true", Coercion::Bool, truthy)
}

/// Accepts any falsy value
pub fn false_type() -> BoxedDecoder {
    primitive("false", Coercion::Bool, |v| !truthy(v))
}

// =============================================================================
// DATE
// =============================================================================

struct DateDecoder;

impl DateDecoder {
    fn is_date(s: &str) -> bool {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
    }
}

impl Decoder for DateDecoder {
    fn name(&self) -> &str {
        "date"
    }

    fn decode(&self, value: Option<&Value>, _opts: &DecodeOptions) -> DecodeResult {
        match value {
            None => Err(missing("date")),
            // kept as given, so a strict read returns what was set
            Some(Value::String(s)) if Self::is_date(s.trim()) => Ok(Some(Value::String(s.clone()))),
            Some(other) => Err(mismatch("date", other)),
        }
    }
}

/// Calendar date string, `YYYY-MM-DD` or RFC 3339
pub fn date() -> BoxedDecoder {
    Arc::new(DateDecoder)
}

// =============================================================================
// COMBINATORS
// =============================================================================

struct Literals {
    name: String,
    values: Vec<String>,
}

impl Decoder for Literals {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: Option<&Value>, _opts: &DecodeOptions) -> DecodeResult {
        match value {
            None => Err(missing(&self.name)),
            Some(Value::String(s)) if self.values.iter().any(|v| v == s) => {
                Ok(Some(Value::String(s.clone())))
            }
            Some(other) => Err(mismatch(&self.name, other)),
        }
    }
}

/// One of a fixed set of strings
pub fn literals<I, S>(values: I) -> BoxedDecoder
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: Vec<String> = values.into_iter().map(Into::into).collect();
    let name = values
        .iter()
        .map(|v| format!("{v:?}"))
        .collect::<Vec<_>>()
        .join(" | ");
    Arc::new(Literals { name, values })
}

struct Optional {
    name: String,
    inner: BoxedDecoder,
}

impl Decoder for Optional {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult {
        match value {
            None => Ok(None),
            Some(v) => match self.inner.decode(Some(v), opts) {
                // coercion turns blank input into undefined
                Err(_) if opts.coerce_all && is_blank(v) => Ok(None),
                other => other,
            },
        }
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.trim().is_empty())
}

/// Accepts undefined in addition to whatever `inner` accepts
pub fn optional(inner: BoxedDecoder) -> BoxedDecoder {
    let name = format!("{} | undefined", inner.name());
    Arc::new(Optional { name, inner })
}

struct Nullable {
    name: String,
    inner: BoxedDecoder,
}

impl Decoder for Nullable {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult {
        match value {
            Some(Value::Null) => Ok(Some(Value::Null)),
            other => self.inner.decode(other, opts),
        }
    }
}

/// Accepts `null` in addition to whatever `inner` accepts
pub fn nullable(inner: BoxedDecoder) -> BoxedDecoder {
    let name = format!("{} | null", inner.name());
    Arc::new(Nullable { name, inner })
}

struct Custom<F> {
    name: String,
    decode: F,
}

impl<F> Decoder for Custom<F>
where
    F: Fn(Option<&Value>, &DecodeOptions) -> DecodeResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, value: Option<&Value>, opts: &DecodeOptions) -> DecodeResult {
        (self.decode)(value, opts)
    }
}

/// Decoder from a closure, for adapting external schema libraries
pub fn custom<F>(name: impl Into<String>, decode: F) -> BoxedDecoder
where
    F: Fn(Option<&Value>, &DecodeOptions) -> DecodeResult + Send + Sync + 'static,
{
    Arc::new(Custom {
        name: name.into(),
        decode,
    })
}
