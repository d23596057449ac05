//! Validator combinators
//!
//! Validators are immutable chains of tagged rules. Every builder call
//! returns a *new* validator whose link points at the previous chain, so a
//! base validator can be shared and extended in several directions:
//!
//! ```rust
//! use formwork_core::validator::{numeric, string};
//! use serde_json::json;
//!
//! let count = numeric().integer();
//! let small = count.max(10.0);
//! let large = count.min(100.0);
//!
//! assert!(small.accepts(&json!(3)));
//! assert!(!large.accepts(&json!(3)));
//! assert!(!count.accepts(&json!(2.5)));
//!
//! let color = string().matches("^#[0-9a-f]{6}$").unwrap();
//! assert!((color.compose())(&json!("#abc123")));
//! ```
//!
//! [`Validator::compose`] folds the chain root-first into one [`Predicate`]
//! that stops at the first rule that rejects the value.
//!
//! Field-level validation is asynchronous (a uniqueness check may need a
//! server round trip), so schemas hold [`FieldValidator`]s. Rule chains
//! implement it directly; closures adapt through [`validate_with`] and
//! [`validate_async`].

use futures::future::{self, BoxFuture, FutureExt};
use regex::Regex;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A composed, synchronous predicate over a field value
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

// =============================================================================
// RULES
// =============================================================================

/// One link's check in a validator chain
pub trait Rule: fmt::Debug + Send + Sync + 'static {
    fn accepts(&self, value: &Value) -> bool;
}

/// Named user predicate, usable as a rule
pub struct CustomRule<T: ?Sized> {
    name: String,
    check: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: ?Sized> Clone for CustomRule<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

impl<T: ?Sized> fmt::Debug for CustomRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Rules over numeric values
#[derive(Clone, Debug)]
pub enum NumberRule {
    IsNumber,
    Integer,
    Positive,
    Negative,
    Min(f64),
    Max(f64),
    OneOf(Vec<f64>),
    Custom(CustomRule<f64>),
}

impl Rule for NumberRule {
    fn accepts(&self, value: &Value) -> bool {
        let Some(n) = value.as_f64() else {
            return false;
        };
        match self {
            NumberRule::IsNumber => !n.is_nan(),
            NumberRule::Integer => n == n.round(),
            NumberRule::Positive => n >= 0.0,
            NumberRule::Negative => n <= 0.0,
            NumberRule::Min(min) => n >= *min,
            NumberRule::Max(max) => n <= *max,
            NumberRule::OneOf(list) => list.contains(&n),
            NumberRule::Custom(rule) => (rule.check)(&n),
        }
    }
}

/// Rules over string values
#[derive(Clone, Debug)]
pub enum StringRule {
    IsString,
    Length(usize),
    MinLength(usize),
    MaxLength(usize),
    OneOf(Vec<String>),
    Matches(Regex),
    Custom(CustomRule<str>),
}

impl Rule for StringRule {
    fn accepts(&self, value: &Value) -> bool {
        let Some(s) = value.as_str() else {
            return false;
        };
        // lengths count characters, not bytes
        match self {
            StringRule::IsString => true,
            StringRule::Length(len) => s.chars().count() == *len,
            StringRule::MinLength(len) => s.chars().count() >= *len,
            StringRule::MaxLength(len) => s.chars().count() <= *len,
            StringRule::OneOf(list) => list.iter().any(|item| item == s),
            StringRule::Matches(pattern) => pattern.is_match(s),
            StringRule::Custom(rule) => (rule.check)(s),
        }
    }
}

// =============================================================================
// CHAIN
// =============================================================================

struct Link<R> {
    rule: R,
    parent: Option<Arc<Link<R>>>,
}

/// An immutable, shareable chain of rules
pub struct Validator<R: Rule> {
    link: Arc<Link<R>>,
}

impl<R: Rule> Clone for Validator<R> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
        }
    }
}

impl<R: Rule> Validator<R> {
    fn root(rule: R) -> Self {
        Self {
            link: Arc::new(Link { rule, parent: None }),
        }
    }

    /// Extend the chain with one more rule, leaving `self` untouched
    pub fn then(&self, rule: R) -> Self {
        Self {
            link: Arc::new(Link {
                rule,
                parent: Some(Arc::clone(&self.link)),
            }),
        }
    }

    /// Links from the root down to this validator
    fn chain(&self) -> SmallVec<[Arc<Link<R>>; 8]> {
        let mut links: SmallVec<[Arc<Link<R>>; 8]> = SmallVec::new();
        let mut cursor = Some(Arc::clone(&self.link));
        while let Some(link) = cursor {
            cursor = link.parent.clone();
            links.push(link);
        }
        links.reverse();
        links
    }

    /// Rules root-first
    pub fn rules(&self) -> Vec<&R> {
        let mut rules = Vec::new();
        let mut cursor = Some(&self.link);
        while let Some(link) = cursor {
            rules.push(&link.rule);
            cursor = link.parent.as_ref();
        }
        rules.reverse();
        rules
    }

    /// Number of rules in the chain
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = Some(&self.link);
        while let Some(link) = cursor {
            depth += 1;
            cursor = link.parent.as_ref();
        }
        depth
    }

    /// Fold the chain into a single short-circuiting predicate
    pub fn compose(&self) -> Predicate {
        let chain = self.chain();
        Arc::new(move |value: &Value| chain.iter().all(|link| link.rule.accepts(value)))
    }

    /// Run every rule root-first against `value`
    pub fn accepts(&self, value: &Value) -> bool {
        self.rules().into_iter().all(|rule| rule.accepts(value))
    }

    /// Render the chain, e.g. `IsNumber > Integer > Min(3.0)`
    pub fn describe(&self) -> String {
        self.rules()
            .iter()
            .map(|rule| format!("{rule:?}"))
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

impl<R: Rule> fmt::Debug for Validator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.describe()).finish()
    }
}

pub type NumberValidator = Validator<NumberRule>;
pub type StringValidator = Validator<StringRule>;

/// Base validator accepting any number
pub fn numeric() -> NumberValidator {
    Validator::root(NumberRule::IsNumber)
}

/// Base validator accepting any string
pub fn string() -> StringValidator {
    Validator::root(StringRule::IsString)
}

impl Validator<NumberRule> {
    pub fn integer(&self) -> Self {
        self.then(NumberRule::Integer)
    }

    /// Zero or greater
    pub fn positive(&self) -> Self {
        self.then(NumberRule::Positive)
    }

    /// Zero or less
    pub fn negative(&self) -> Self {
        self.then(NumberRule::Negative)
    }

    pub fn min(&self, min: f64) -> Self {
        self.then(NumberRule::Min(min))
    }

    pub fn max(&self, max: f64) -> Self {
        self.then(NumberRule::Max(max))
    }

    pub fn one_of(&self, list: impl IntoIterator<Item = f64>) -> Self {
        self.then(NumberRule::OneOf(list.into_iter().collect()))
    }

    pub fn custom<F>(&self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&f64) -> bool + Send + Sync + 'static,
    {
        self.then(NumberRule::Custom(CustomRule {
            name: name.into(),
            check: Arc::new(check),
        }))
    }
}

impl Validator<StringRule> {
    /// Exact length in characters
    pub fn length(&self, len: usize) -> Self {
        self.then(StringRule::Length(len))
    }

    pub fn min_length(&self, len: usize) -> Self {
        self.then(StringRule::MinLength(len))
    }

    pub fn max_length(&self, len: usize) -> Self {
        self.then(StringRule::MaxLength(len))
    }

    pub fn one_of<I, S>(&self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.then(StringRule::OneOf(list.into_iter().map(Into::into).collect()))
    }

    /// Value must match `pattern` (unanchored, like `Regex::is_match`)
    pub fn matches(&self, pattern: &str) -> Result<Self, regex::Error> {
        Ok(self.matches_regex(Regex::new(pattern)?))
    }

    pub fn matches_regex(&self, pattern: Regex) -> Self {
        self.then(StringRule::Matches(pattern))
    }

    pub fn custom<F>(&self, name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.then(StringRule::Custom(CustomRule {
            name: name.into(),
            check: Arc::new(check),
        }))
    }
}

// =============================================================================
// FIELD VALIDATORS
// =============================================================================

/// Future resolving to whether a value passed validation
pub type ValidationFuture = BoxFuture<'static, bool>;

/// Asynchronous per-field validator
///
/// Only ever called with values that already passed the field's decoder.
pub trait FieldValidator: Send + Sync {
    fn validate(&self, value: &Value) -> ValidationFuture;
}

/// Shared, type-erased field validator
pub type BoxedFieldValidator = Arc<dyn FieldValidator>;

impl<V: FieldValidator + ?Sized> FieldValidator for Arc<V> {
    fn validate(&self, value: &Value) -> ValidationFuture {
        (**self).validate(value)
    }
}

impl<R: Rule> FieldValidator for Validator<R> {
    fn validate(&self, value: &Value) -> ValidationFuture {
        future::ready(self.accepts(value)).boxed()
    }
}

struct SyncFn<F>(F);

impl<F> FieldValidator for SyncFn<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn validate(&self, value: &Value) -> ValidationFuture {
        future::ready((self.0)(value)).boxed()
    }
}

struct AsyncFn<F>(F);

impl<F, Fut> FieldValidator for AsyncFn<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn validate(&self, value: &Value) -> ValidationFuture {
        (self.0)(value.clone()).boxed()
    }
}

/// Field validator from a synchronous closure
pub fn validate_with<F>(check: F) -> BoxedFieldValidator
where
    F: Fn(&Value) -> bool + Send + Sync + 'static,
{
    Arc::new(SyncFn(check))
}

/// Field validator from an async closure (e.g. a server-side uniqueness check)
pub fn validate_async<F, Fut>(check: F) -> BoxedFieldValidator
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(AsyncFn(check))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_validators_check_type() {
        assert!(numeric().accepts(&json!(1.5)));
        assert!(!numeric().accepts(&json!("1.5")));
        assert!(string().accepts(&json!("")));
        assert!(!string().accepts(&json!(1)));
    }

    #[test]
    fn test_number_builders() {
        let v = numeric().integer().positive().max(10.0);
        assert!(v.accepts(&json!(0)));
        assert!(v.accepts(&json!(10)));
        assert!(!v.accepts(&json!(11)));
        assert!(!v.accepts(&json!(-1)));
        assert!(!v.accepts(&json!(1.5)));

        assert!(numeric().negative().accepts(&json!(-3)));
        assert!(numeric().min(2.0).accepts(&json!(2)));
        assert!(!numeric().one_of([1.0, 2.0]).accepts(&json!(3)));
    }

    #[test]
    fn test_string_builders() {
        assert!(string().length(3).accepts(&json!("abc")));
        assert!(string().length(2).accepts(&json!("éé")));
        assert!(!string().min_length(4).accepts(&json!("abc")));
        assert!(!string().max_length(2).accepts(&json!("abc")));
        assert!(string().one_of(["a", "b"]).accepts(&json!("b")));
        assert!(!string().one_of(["a", "b"]).accepts(&json!("c")));
    }

    #[test]
    fn test_builders_do_not_mutate_base() {
        let base = numeric().integer();
        let capped = base.max(5.0);
        let floored = base.min(50.0);

        assert_eq!(base.depth(), 2);
        assert_eq!(capped.depth(), 3);
        assert!(base.accepts(&json!(20)));
        assert!(!capped.accepts(&json!(20)));
        assert!(!floored.accepts(&json!(20)));
    }

    #[test]
    fn test_chained_domain_rules_keep_parent() {
        // min/max/length must still enforce the base type check
        let v = numeric().min(0.0);
        assert!(!v.accepts(&json!("5")));
        let s = string().min_length(0);
        assert!(!s.accepts(&json!(5)));
    }

    #[test]
    fn test_compose_is_stable() {
        let v = numeric().integer().min(1.0);
        let once = v.compose();
        let twice = v.compose();
        for value in [json!(0), json!(1), json!(1.5), json!("x"), json!(100)] {
            assert_eq!(once(&value), twice(&value));
            assert_eq!(once(&value), v.accepts(&value));
        }
    }

    #[test]
    fn test_compose_short_circuits_root_first() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let v = numeric().min(10.0).custom("counted", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        let pred = v.compose();
        assert!(!pred(&json!(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(pred(&json!(11)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_matches() {
        let color = string().matches("^#[0-9a-f]{6}$").unwrap();
        assert!(color.accepts(&json!("#abc123")));
        assert!(!color.accepts(&json!("#zzz")));
        assert!(string().matches("(").is_err());
    }

    #[test]
    fn test_describe() {
        let v = numeric().integer().min(3.0);
        assert_eq!(v.describe(), "IsNumber > Integer > Min(3.0)");
        let c = string().custom("no_spaces", |s| !s.contains(' '));
        assert_eq!(c.describe(), "IsString > Custom(no_spaces)");
    }

    #[tokio::test]
    async fn test_field_validators() {
        let chain: BoxedFieldValidator = Arc::new(numeric().positive());
        assert!(chain.validate(&json!(1)).await);
        assert!(!chain.validate(&json!(-1)).await);

        let sync = validate_with(|v| v.as_str() == Some("ok"));
        assert!(sync.validate(&json!("ok")).await);

        let taken = validate_async(|v: Value| async move {
            tokio::task::yield_now().await;
            v.as_str() != Some("admin")
        });
        assert!(taken.validate(&json!("alice")).await);
        assert!(!taken.validate(&json!("admin")).await);
    }
}
