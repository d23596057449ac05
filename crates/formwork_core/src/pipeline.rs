//! Debounced mutation pipeline
//!
//! Field edits travel through two independent debounced channels:
//!
//! - the **value-commit** channel writes the live value into the store
//! - the **validation** channel runs the field's decoder and validators and
//!   records the outcome as the field's error state
//!
//! Both are keyed per field, so editing `name` never delays or swallows an
//! edit to `email`. In controlled mode the commit is applied synchronously
//! (the visible value tracks every keystroke) and only validation waits.
//!
//! A blur flushes the field's pending commit first, so blur-triggered
//! validation always sees the value the user is looking at.
//!
//! Every edit and every blur starts a new validation *generation* for its
//! field. A validation outcome is only recorded if its generation is still
//! the field's latest, so a slow validator for an old value can never
//! overwrite the result for a newer one.

use crate::debounce::Debouncer;
use crate::schema::Schema;
use crate::state::ErrorState;
use crate::store::FormStore;
use futures::FutureExt;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Latest validation generation per field
#[derive(Clone, Default)]
struct Generations {
    latest: Arc<Mutex<FxHashMap<String, u64>>>,
}

impl Generations {
    fn bump(&self, name: &str) -> u64 {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = latest.entry(name.to_string()).or_insert(0);
        *generation += 1;
        *generation
    }

    fn is_current(&self, name: &str, generation: u64) -> bool {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.get(name).copied().unwrap_or(0) == generation
    }
}

/// Validate `value` for field `name` and record the outcome, unless a newer
/// generation has started for the field in the meantime
///
/// Unknown fields are reported as invalid and leave the store untouched.
async fn validate_and_record(
    schema: &Schema,
    store: &FormStore,
    generations: &Generations,
    name: &str,
    value: Option<Value>,
    generation: u64,
) -> ErrorState {
    let Some(spec) = schema.field(name) else {
        return ErrorState::Invalid;
    };
    let outcome = ErrorState::from_valid(spec.validate(value.as_ref()).await);
    // checked under the store lock, so a newer result can't slip in between
    let recorded = store.update_if(|state| {
        generations
            .is_current(name, generation)
            .then(|| state.clone().patch_error(name, outcome))
    });
    if recorded.is_some() {
        tracing::debug!(field = name, ?outcome, "field validated");
    } else {
        tracing::debug!(field = name, generation, "stale validation result dropped");
    }
    outcome
}

/// A field value taken for immediate validation, see [`MutationPipeline::settle`]
#[derive(Clone, Debug, PartialEq)]
pub struct Settled {
    pub value: Option<Value>,
    pub generation: u64,
}

/// The two debounced channels of one form
pub struct MutationPipeline {
    schema: Arc<Schema>,
    store: Arc<FormStore>,
    controlled: bool,
    generations: Generations,
    commit: Debouncer<String, Option<Value>>,
    validation: Debouncer<String, (Option<Value>, u64)>,
}

impl MutationPipeline {
    pub fn new(schema: Arc<Schema>, store: Arc<FormStore>, delay: Duration, controlled: bool) -> Self {
        let commit_store = Arc::clone(&store);
        let commit = Debouncer::new(delay, move |name: String, value: Option<Value>| {
            tracing::trace!(field = %name, "value committed");
            commit_store.update(|state| state.patch_value(&name, value));
            futures::future::ready(()).boxed()
        });

        let generations = Generations::default();
        let validation_schema = Arc::clone(&schema);
        let validation_store = Arc::clone(&store);
        let validation_generations = generations.clone();
        let validation = Debouncer::new(
            delay,
            move |name: String, (value, generation): (Option<Value>, u64)| {
                let schema = Arc::clone(&validation_schema);
                let store = Arc::clone(&validation_store);
                let generations = validation_generations.clone();
                async move {
                    validate_and_record(&schema, &store, &generations, &name, value, generation).await;
                }
                .boxed()
            },
        );

        Self {
            schema,
            store,
            controlled,
            generations,
            commit,
            validation,
        }
    }

    pub fn is_controlled(&self) -> bool {
        self.controlled
    }

    /// Route a field edit: commit (debounced unless controlled) and schedule validation
    pub fn change(&self, name: &str, value: Option<Value>) {
        if self.controlled {
            self.store
                .update(|state| state.patch_value(name, value.clone()));
        } else {
            self.commit.call(name.to_string(), value.clone());
        }
        let generation = self.generations.bump(name);
        self.validation.call(name.to_string(), (value, generation));
    }

    /// Settle a field for blur: apply its pending commit, drop its pending
    /// validation, and start a new generation for the committed value
    pub fn settle(&self, name: &str) -> Settled {
        let key = name.to_string();
        if let Some(value) = self.commit.flush(&key) {
            tracing::trace!(field = name, "pending commit flushed");
            self.store.update(|state| state.patch_value(name, value));
        }
        self.validation.flush(&key);
        let value = self
            .store
            .get()
            .and_then(|state| state.field(name).and_then(|field| field.value.clone()));
        Settled {
            value,
            generation: self.generations.bump(name),
        }
    }

    /// Validate a settled value and record the outcome if it is still the latest
    pub async fn validate_settled(&self, name: &str, settled: Settled) -> ErrorState {
        validate_and_record(
            &self.schema,
            &self.store,
            &self.generations,
            name,
            settled.value,
            settled.generation,
        )
        .await
    }

    /// Apply every pending commit now
    pub fn flush_commits(&self) {
        let pending = self.commit.flush_all();
        if pending.is_empty() {
            return;
        }
        self.store.update(|mut state| {
            for (name, value) in pending {
                state = state.patch_value(&name, value);
            }
            state
        });
    }

    /// Value waiting in the commit channel for `name`
    pub fn pending_value(&self, name: &str) -> Option<Option<Value>> {
        self.commit.pending(&name.to_string())
    }

    pub fn is_validation_pending(&self, name: &str) -> bool {
        self.validation.is_pending(&name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use crate::schema::{FieldSpec, Record};
    use crate::state::FormState;
    use crate::validator;
    use serde_json::json;

    fn setup(controlled: bool) -> (MutationPipeline, Arc<FormStore>) {
        let schema = Arc::new(
            Schema::builder()
                .field("age", FieldSpec::new(decode::integer()).validator(validator::numeric().positive()))
                .field("name", FieldSpec::new(decode::string()))
                .build(),
        );
        let store = FormStore::with_state(FormState::init(&schema, &Record::new()));
        let pipeline = MutationPipeline::new(
            schema,
            Arc::clone(&store),
            Duration::from_millis(300),
            controlled,
        );
        (pipeline, store)
    }

    fn field(store: &FormStore, name: &str) -> (Option<Value>, ErrorState) {
        let state = store.get().unwrap();
        let field = state.field(name).unwrap();
        (field.value.clone(), field.error)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_is_debounced() {
        let (pipeline, store) = setup(false);
        pipeline.change("age", Some(json!(1)));
        pipeline.change("age", Some(json!(2)));
        assert_eq!(field(&store, "age"), (None, ErrorState::Unknown));
        assert_eq!(pipeline.pending_value("age"), Some(Some(json!(2))));

        advance(350).await;
        assert_eq!(field(&store, "age"), (Some(json!(2)), ErrorState::Valid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_controlled_commits_immediately() {
        let (pipeline, store) = setup(true);
        pipeline.change("age", Some(json!(-4)));
        assert_eq!(field(&store, "age"), (Some(json!(-4)), ErrorState::Unknown));
        assert!(pipeline.is_validation_pending("age"));

        advance(350).await;
        assert_eq!(field(&store, "age").1, ErrorState::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fields_debounce_independently() {
        let (pipeline, store) = setup(false);
        pipeline.change("age", Some(json!(5)));
        advance(200).await;
        pipeline.change("name", Some(json!("Ann")));
        advance(150).await;

        assert_eq!(field(&store, "age"), (Some(json!(5)), ErrorState::Valid));
        assert_eq!(field(&store, "name"), (None, ErrorState::Unknown));

        advance(200).await;
        assert_eq!(field(&store, "name"), (Some(json!("Ann")), ErrorState::Valid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_flushes_pending_commit() {
        let (pipeline, store) = setup(false);
        pipeline.change("age", Some(json!(7)));
        assert_eq!(pipeline.settle("age").value, Some(json!(7)));
        assert_eq!(field(&store, "age").0, Some(json!(7)));
        assert!(!pipeline.is_validation_pending("age"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_commits() {
        let (pipeline, store) = setup(false);
        pipeline.change("age", Some(json!(1)));
        pipeline.change("name", Some(json!("Bo")));
        pipeline.flush_commits();
        assert_eq!(field(&store, "age").0, Some(json!(1)));
        assert_eq!(field(&store, "name").0, Some(json!("Bo")));
    }

    #[tokio::test]
    async fn test_validate_and_record_unknown_field() {
        let (_, store) = setup(false);
        let schema = Schema::default();
        let before = store.version();
        assert_eq!(
            validate_and_record(&schema, &store, &Generations::default(), "ghost", None, 0).await,
            ErrorState::Invalid
        );
        assert_eq!(store.version(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stale_validation_does_not_overwrite_newer_result() {
        let schema = Arc::new(
            Schema::builder()
                .field(
                    "username",
                    FieldSpec::new(decode::string()).validator(validator::validate_async(|value| async move {
                        let slow = value == json!("slow");
                        let ms = if slow { 1000 } else { 10 };
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        !slow
                    })),
                )
                .build(),
        );
        let store = FormStore::with_state(FormState::init(&schema, &Record::new()));
        let pipeline = MutationPipeline::new(schema, Arc::clone(&store), Duration::from_millis(300), false);

        pipeline.change("username", Some(json!("slow")));
        advance(350).await;
        pipeline.change("username", Some(json!("alice")));
        advance(350).await;
        assert_eq!(field(&store, "username"), (Some(json!("alice")), ErrorState::Valid));

        // the validation of "slow" finishes long after the newer one
        advance(1000).await;
        assert_eq!(field(&store, "username"), (Some(json!("alice")), ErrorState::Valid));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blur_supersedes_in_flight_validation() {
        let schema = Arc::new(
            Schema::builder()
                .field(
                    "code",
                    FieldSpec::new(decode::string()).validator(validator::validate_async(|value| async move {
                        if value == json!("old") {
                            tokio::time::sleep(Duration::from_millis(500)).await;
                            return false;
                        }
                        true
                    })),
                )
                .build(),
        );
        let store = FormStore::with_state(FormState::init(&schema, &Record::new()));
        let pipeline = MutationPipeline::new(schema, Arc::clone(&store), Duration::from_millis(300), true);

        pipeline.change("code", Some(json!("old")));
        advance(350).await;
        // the "old" validation is still running when the value is corrected
        store.update(|state| state.patch_value("code", Some(json!("new"))));
        let settled = pipeline.settle("code");
        assert_eq!(pipeline.validate_settled("code", settled).await, ErrorState::Valid);

        advance(600).await;
        assert_eq!(field(&store, "code"), (Some(json!("new")), ErrorState::Valid));
    }
}
