//! Form controller
//!
//! The controller is the object handed to the UI layer. It owns one form's
//! store and mutation pipeline, and exposes:
//!
//! - **reads**: [`get`](FormController::get), [`get_changes`](FormController::get_changes),
//!   [`get_strict`](FormController::get_strict)
//! - **writes**: [`set`](FormController::set), [`set_strict`](FormController::set_strict),
//!   [`on_change`](FormController::on_change), [`on_blur`](FormController::on_blur),
//!   [`reset`](FormController::reset), [`set_error`](FormController::set_error)
//! - **validation**: [`valid`](FormController::valid)
//!
//! Handles are cheap to clone; clones share the same form.
//!
//! # Example
//!
//! ```ignore
//! use formwork_core::prelude::*;
//!
//! let schema = Schema::builder()
//!     .field("age", FieldSpec::new(decode::integer()))
//!     .build();
//! let form = FormController::builder(schema)
//!     .options(FormOptions::new("profile"))
//!     .build();
//!
//! form.set(Record::new());
//! form.on_change(Some(json!(25)), "age");
//!
//! // ... after the debounce window
//! if form.valid().await {
//!     let record = form.get_strict()?;
//! }
//! ```

use crate::decode::DecodeOptions;
use crate::error::{FormError, Result};
use crate::focus::{focus_first_invalid, FocusHost, NoopFocusHost};
use crate::options::FormOptions;
use crate::pipeline::MutationPipeline;
use crate::schema::{Record, Schema};
use crate::state::{ErrorState, FieldState, FormState};
use crate::store::{FormStore, Subscription};
use futures::future::join_all;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

struct Inner {
    schema: Arc<Schema>,
    store: Arc<FormStore>,
    options: FormOptions,
    required: IndexMap<String, bool>,
    focus: Arc<dyn FocusHost>,
    pipeline: MutationPipeline,
}

/// Builder for [`FormController`]
pub struct FormControllerBuilder {
    schema: Arc<Schema>,
    options: FormOptions,
    store: Option<Arc<FormStore>>,
    focus: Option<Arc<dyn FocusHost>>,
    init: Option<Record>,
}

impl FormControllerBuilder {
    pub fn options(mut self, options: FormOptions) -> Self {
        self.options = options;
        self
    }

    /// Use an externally owned store instead of a private one
    pub fn store(mut self, store: Arc<FormStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn focus_host(mut self, host: Arc<dyn FocusHost>) -> Self {
        self.focus = Some(host);
        self
    }

    /// Initial baseline; without one the form stays uninitialized until `set`
    pub fn init(mut self, baseline: Record) -> Self {
        self.init = Some(baseline);
        self
    }

    pub fn build(self) -> FormController {
        let store = self.store.unwrap_or_else(FormStore::new);
        if let Some(baseline) = &self.init {
            store.replace(FormState::init(&self.schema, baseline));
        }
        let pipeline = MutationPipeline::new(
            Arc::clone(&self.schema),
            Arc::clone(&store),
            self.options.debounce_delay(),
            self.options.controlled,
        );
        let required = self.schema.required_map();
        tracing::debug!(
            form_id = %self.options.form_id,
            fields = self.schema.len(),
            controlled = self.options.controlled,
            "form controller created"
        );
        FormController {
            inner: Arc::new(Inner {
                schema: self.schema,
                store,
                options: self.options,
                required,
                focus: self.focus.unwrap_or_else(|| Arc::new(NoopFocusHost)),
                pipeline,
            }),
        }
    }
}

/// Stateful controller for one form instance
#[derive(Clone)]
pub struct FormController {
    inner: Arc<Inner>,
}

impl fmt::Debug for FormController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormController")
            .field("form_id", &self.inner.options.form_id)
            .field("schema", &self.inner.schema)
            .field("state", &self.inner.store.get())
            .finish()
    }
}

/// Run a future on the ambient runtime, or to completion if there is none
fn spawn_or_block<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => pollster::block_on(future),
    }
}

impl FormController {
    pub fn builder(schema: impl Into<Arc<Schema>>) -> FormControllerBuilder {
        FormControllerBuilder {
            schema: schema.into(),
            options: FormOptions::default(),
            store: None,
            focus: None,
            init: None,
        }
    }

    pub fn new(schema: impl Into<Arc<Schema>>, options: FormOptions) -> Self {
        Self::builder(schema).options(options).build()
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn store(&self) -> &Arc<FormStore> {
        &self.inner.store
    }

    pub fn options(&self) -> &FormOptions {
        &self.inner.options
    }

    pub fn form_id(&self) -> &str {
        &self.inner.options.form_id
    }

    pub fn is_controlled(&self) -> bool {
        self.inner.options.controlled
    }

    /// Which fields must be present, computed once per controller
    pub fn required(&self) -> &IndexMap<String, bool> {
        &self.inner.required
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.inner.required.get(name).copied().unwrap_or(false)
    }

    /// Current snapshot, `None` until initialized
    pub fn state(&self) -> Option<FormState> {
        self.inner.store.get()
    }

    pub fn field(&self, name: &str) -> Option<FieldState> {
        self.inner.store.get()?.field(name).cloned()
    }

    /// Register a change listener (the re-render trigger)
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FormState) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(listener)
    }

    fn check_field(&self, name: &str) -> Result<()> {
        if self.inner.schema.contains(name) {
            Ok(())
        } else {
            Err(FormError::UnknownField(name.to_string()))
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Field value changed in the UI
    ///
    /// Commits the value (debounced unless controlled) and schedules a
    /// debounced validation of it.
    pub fn on_change(&self, value: Option<Value>, name: &str) {
        if let Err(err) = self.check_field(name) {
            tracing::warn!(form_id = %self.form_id(), %err, "change ignored");
            return;
        }
        self.inner.pipeline.change(name, value);
    }

    /// Field lost focus: validate its current value right away
    pub fn on_blur(&self, name: &str) {
        if let Err(err) = self.check_field(name) {
            tracing::warn!(form_id = %self.form_id(), %err, "blur ignored");
            return;
        }
        if !self.inner.store.is_initialized() {
            return;
        }
        // read the value now, so later edits can't change what blur validates
        let settled = self.inner.pipeline.settle(name);
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        spawn_or_block(async move {
            inner.pipeline.validate_settled(&name, settled).await;
        });
    }

    /// Awaitable form of [`on_blur`](Self::on_blur)
    pub async fn validate_field(&self, name: &str) -> Result<ErrorState> {
        self.check_field(name)?;
        if !self.inner.store.is_initialized() {
            return Err(FormError::NotInitialized(self.form_id().to_string()));
        }
        let settled = self.inner.pipeline.settle(name);
        Ok(self.inner.pipeline.validate_settled(name, settled).await)
    }

    /// Apply every pending (debounced) value commit now
    pub fn flush(&self) {
        self.inner.pipeline.flush_commits();
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Replace the whole form: baseline and live value both become `values`
    ///
    /// Error states reset to unknown; nothing is validated.
    pub fn set(&self, values: Record) {
        tracing::debug!(form_id = %self.form_id(), fields = values.len(), "form baseline set");
        self.inner
            .store
            .replace(FormState::init(&self.inner.schema, &values));
    }

    /// Decode an untrusted value against the partial schema, then [`set`](Self::set) it
    pub fn set_strict(&self, value: &Value, opts: &DecodeOptions) -> Result<()> {
        match self.inner.schema.decode_partial(value, opts) {
            Ok(record) => {
                self.set(record);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(form_id = %self.form_id(), %err, "set_strict rejected value");
                Err(err.into())
            }
        }
    }

    /// Typed [`set_strict`](Self::set_strict) using the form's decode options
    pub fn set_from<T: Serialize>(&self, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.set_strict(&value, &self.inner.options.decode)
    }

    /// Every field back to its baseline, error state unknown
    pub fn reset(&self) {
        tracing::debug!(form_id = %self.form_id(), "form reset");
        self.inner.store.update(FormState::reset_all);
    }

    /// Override a field's error state (e.g. after a server-side rejection)
    pub fn set_error(&self, name: &str, error: bool) {
        if let Err(err) = self.check_field(name) {
            tracing::warn!(form_id = %self.form_id(), %err, "set_error ignored");
            return;
        }
        tracing::debug!(form_id = %self.form_id(), field = name, error, "error set externally");
        self.inner
            .store
            .update(|state| state.patch_error(name, ErrorState::from(error)));
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Live value of every field (`None` = undefined)
    pub fn get(&self) -> IndexMap<String, Option<Value>> {
        match self.inner.store.get() {
            Some(state) => state.read_all(),
            None => self
                .inner
                .schema
                .names()
                .map(|name| (name.to_string(), None))
                .collect(),
        }
    }

    /// Live values for partial-update submission: undefined becomes `null`
    ///
    /// Empty while the form is uninitialized.
    pub fn get_changes(&self) -> Record {
        self.inner
            .store
            .get()
            .map(|state| state.read_changes())
            .unwrap_or_default()
    }

    /// Decode the live values against the complete schema
    ///
    /// This is the authoritative completeness check; it does not look at the
    /// per-field error flags.
    pub fn get_strict(&self) -> Result<Record> {
        let object = match self.inner.store.get() {
            Some(state) => state.to_object(),
            None => Value::Object(Default::default()),
        };
        self.inner
            .schema
            .decode_strict(&object, &DecodeOptions::default())
            .map_err(|err| {
                tracing::warn!(form_id = %self.form_id(), %err, "get_strict failed");
                err.into()
            })
    }

    /// [`get_strict`](Self::get_strict) converted to a typed record
    pub fn get_strict_as<T: DeserializeOwned>(&self) -> Result<T> {
        let record = self.get_strict()?;
        Ok(serde_json::from_value(Value::Object(record.into_iter().collect()))?)
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Validate every field and report whether the whole form is valid
    ///
    /// Fields already known to be valid are trusted. Fields already flagged
    /// invalid count as failing without re-running validation, unless
    /// [`FormOptions::revalidate_invalid`] is set. Failing fields are flagged
    /// invalid and focus moves to the first of them in document order.
    pub async fn valid(&self) -> bool {
        let Some(state) = self.inner.store.get() else {
            return false;
        };
        let revalidate = self.inner.options.revalidate_invalid;

        let checks = self.inner.schema.fields().map(|(name, spec)| {
            let field = state.field(name).cloned().unwrap_or_default();
            async move {
                let ok = match field.error {
                    ErrorState::Valid => true,
                    ErrorState::Invalid if !revalidate => false,
                    _ => spec.validate(field.value.as_ref()).await,
                };
                (name, field.error, ok)
            }
        });
        let results = join_all(checks).await;

        let failing: Vec<String> = results
            .iter()
            .filter(|(_, _, ok)| !ok)
            .map(|(name, _, _)| name.to_string())
            .collect();
        let recovered: Vec<String> = results
            .iter()
            .filter(|(_, before, ok)| *ok && before.is_invalid())
            .map(|(name, _, _)| name.to_string())
            .collect();

        if !failing.is_empty() || !recovered.is_empty() {
            self.inner.store.update(|mut state| {
                for name in &failing {
                    state = state.patch_error(name, ErrorState::Invalid);
                }
                for name in &recovered {
                    state = state.patch_error(name, ErrorState::Valid);
                }
                state
            });
        }

        if failing.is_empty() {
            tracing::debug!(form_id = %self.form_id(), "form valid");
            return true;
        }

        tracing::debug!(form_id = %self.form_id(), ?failing, "form invalid");
        focus_first_invalid(self.inner.focus.as_ref(), self.form_id(), &failing);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use crate::schema::FieldSpec;
    use crate::validator;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    fn profile() -> Schema {
        Schema::builder()
            .field("name", FieldSpec::new(decode::string()).validator(validator::string().min_length(2)))
            .field("age", FieldSpec::new(decode::integer()).validator(validator::numeric().positive()))
            .field("bio", FieldSpec::new(decode::optional(decode::string())))
            .build()
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => Record::new(),
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_required_computed_once() {
        let form = FormController::new(profile(), FormOptions::default());
        assert!(form.is_required("name"));
        assert!(form.is_required("age"));
        assert!(!form.is_required("bio"));
        assert!(!form.is_required("unknown"));
    }

    #[test]
    fn test_uninitialized_reads() {
        let form = FormController::new(profile(), FormOptions::default());
        assert!(form.state().is_none());
        assert_eq!(form.get().len(), 3);
        assert!(form.get().values().all(Option::is_none));
        assert!(form.get_changes().is_empty());
        assert!(form.get_strict().is_err());
    }

    #[test]
    fn test_set_resets_baseline_and_errors() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(record(json!({ "name": "Ann" })));
        form.set_error("name", true);
        form.set(record(json!({ "name": "Bob", "age": 3 })));

        let name = form.field("name").unwrap();
        assert_eq!(name.default_value, Some(json!("Bob")));
        assert_eq!(name.value, Some(json!("Bob")));
        assert_eq!(name.error, ErrorState::Unknown);
        assert_eq!(form.get()["age"], Some(json!(3)));
        assert_eq!(form.get()["bio"], None);
    }

    #[test]
    fn test_set_strict_decodes_partial_shape() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set_strict(&json!({ "age": "41" }), &DecodeOptions { coerce_all: true })
            .unwrap();
        assert_eq!(form.get()["age"], Some(json!(41)));

        let err = form
            .set_strict(&json!({ "age": "old" }), &DecodeOptions::default())
            .unwrap_err();
        assert!(matches!(err, FormError::Decode(_)));
        // failed decode leaves the form untouched
        assert_eq!(form.get()["age"], Some(json!(41)));
    }

    #[test]
    fn test_get_changes_marks_clears() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(record(json!({ "name": "Ann" })));
        let changes = form.get_changes();
        assert_eq!(changes["name"], json!("Ann"));
        assert_eq!(changes["age"], Value::Null);
        assert_eq!(changes["bio"], Value::Null);
    }

    #[test]
    fn test_get_strict_typed() {
        #[derive(Debug, Deserialize, Serialize, PartialEq)]
        struct Profile {
            name: String,
            age: u32,
            #[serde(default, skip_serializing_if = "Option::is_none")]
            bio: Option<String>,
        }

        let form = FormController::new(profile(), FormOptions::default());
        let ann = Profile {
            name: "Ann".into(),
            age: 30,
            bio: None,
        };
        form.set_from(&ann).unwrap();
        assert_eq!(form.get_strict_as::<Profile>().unwrap(), ann);

        form.set(record(json!({ "name": "Ann" })));
        assert!(matches!(form.get_strict_as::<Profile>(), Err(FormError::Decode(_))));
    }

    #[test]
    fn test_set_error_and_reset() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(record(json!({ "age": 1 })));
        form.set_error("age", true);
        assert_eq!(form.field("age").unwrap().error, ErrorState::Invalid);
        form.set_error("age", false);
        assert_eq!(form.field("age").unwrap().error, ErrorState::Valid);

        form.reset();
        form.reset();
        assert_eq!(form.field("age").unwrap().error, ErrorState::Unknown);
        assert_eq!(form.field("age").unwrap().value, Some(json!(1)));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(Record::new());
        let version = form.store().version();
        form.set_error("ghost", true);
        form.on_change(Some(json!(1)), "ghost");
        form.on_blur("ghost");
        assert_eq!(form.store().version(), version);
        assert!(form.field("ghost").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_change_debounces_commit_and_validation() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(Record::new());
        form.on_change(Some(json!(-1)), "age");
        form.on_change(Some(json!(12)), "age");
        assert_eq!(form.get()["age"], None);

        advance(350).await;
        let age = form.field("age").unwrap();
        assert_eq!(age.value, Some(json!(12)));
        assert_eq!(age.error, ErrorState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_controlled_mode_commits_synchronously() {
        let form = FormController::new(profile(), FormOptions::default().controlled(true));
        form.set(Record::new());
        form.on_change(Some(json!("A")), "name");
        assert_eq!(form.get()["name"], Some(json!("A")));
        assert_eq!(form.field("name").unwrap().error, ErrorState::Unknown);

        advance(350).await;
        assert_eq!(form.field("name").unwrap().error, ErrorState::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_validates_latest_value() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(record(json!({ "age": -5 })));
        form.on_change(Some(json!(8)), "age");
        form.on_blur("age");
        advance(1).await;

        let age = form.field("age").unwrap();
        assert_eq!(age.value, Some(json!(8)));
        assert_eq!(age.error, ErrorState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_field() {
        let form = FormController::new(profile(), FormOptions::default());
        assert!(matches!(
            form.validate_field("age").await,
            Err(FormError::NotInitialized(_))
        ));
        assert!(matches!(
            form.validate_field("ghost").await,
            Err(FormError::UnknownField(_))
        ));

        form.set(record(json!({ "name": "x" })));
        assert_eq!(form.validate_field("name").await.unwrap(), ErrorState::Invalid);
        assert_eq!(form.validate_field("bio").await.unwrap(), ErrorState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_flags_failures() {
        let form = FormController::new(profile(), FormOptions::default());
        assert!(!form.valid().await);

        form.set(record(json!({ "name": "Ann" })));
        assert!(!form.valid().await);
        assert_eq!(form.field("age").unwrap().error, ErrorState::Invalid);
        // passing fields are not flagged by valid()
        assert_eq!(form.field("name").unwrap().error, ErrorState::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_trusts_existing_invalid_flag() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(record(json!({ "name": "Ann", "age": 3 })));
        form.set_error("age", true);
        assert!(!form.valid().await);

        let revalidating = FormController::new(
            profile(),
            FormOptions::default().revalidate_invalid(true),
        );
        revalidating.set(record(json!({ "name": "Ann", "age": 3 })));
        revalidating.set_error("age", true);
        assert!(revalidating.valid().await);
        assert_eq!(revalidating.field("age").unwrap().error, ErrorState::Valid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_applies_pending_values() {
        let form = FormController::new(profile(), FormOptions::default());
        form.set(Record::new());
        form.on_change(Some(json!("Zed")), "name");
        form.flush();
        assert_eq!(form.get()["name"], Some(json!("Zed")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_see_changes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let form = FormController::new(profile(), FormOptions::default());
        let renders = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&renders);
        let _sub = form.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        form.set(Record::new());
        form.on_change(Some(json!(4)), "age");
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        advance(350).await;
        // one commit and one validation result
        assert_eq!(renders.load(Ordering::SeqCst), 3);
    }
}
