//! Keyed trailing-edge debouncer
//!
//! Each key gets its own timer. Calls for a key within the delay window
//! replace the pending value and push the deadline back; when the window
//! finally elapses the sink receives only the last value (last write wins).
//! Different keys never share a flush.
//!
//! One timer task runs per burst, not per call: the task sleeps until the
//! current deadline, and if the deadline moved while it slept it simply
//! sleeps again.
//!
//! Timers run on the ambient tokio runtime.

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Receives the value that survived a debounce window
pub type Sink<K, V> = Arc<dyn Fn(K, V) -> BoxFuture<'static, ()> + Send + Sync>;

struct Pending<V> {
    value: V,
    deadline: Instant,
    /// Identifies the timer task that owns this entry
    timer: u64,
}

struct Slots<K, V> {
    pending: FxHashMap<K, Pending<V>>,
    next_timer: u64,
}

/// Per-key debouncer
pub struct Debouncer<K, V> {
    delay: Duration,
    slots: Arc<Mutex<Slots<K, V>>>,
    sink: Sink<K, V>,
}

impl<K, V> Clone for Debouncer<K, V> {
    fn clone(&self) -> Self {
        Self {
            delay: self.delay,
            slots: Arc::clone(&self.slots),
            sink: Arc::clone(&self.sink),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Send + 'static,
{
    pub fn new<F>(delay: Duration, sink: F) -> Self
    where
        F: Fn(K, V) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            delay,
            slots: Arc::new(Mutex::new(Slots {
                pending: FxHashMap::default(),
                next_timer: 0,
            })),
            sink: Arc::new(sink),
        }
    }

    /// Schedule `value` for `key`, replacing anything still pending for it
    pub fn call(&self, key: K, value: V) {
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!(?key, "no tokio runtime for debounce timer, flushing immediately");
            pollster::block_on((self.sink)(key, value));
            return;
        };

        let deadline = Instant::now() + self.delay;
        let timer = {
            let mut slots = lock(&self.slots);
            let next_timer = slots.next_timer;
            match slots.pending.entry(key.clone()) {
                Entry::Occupied(mut entry) => {
                    let pending = entry.get_mut();
                    pending.value = value;
                    pending.deadline = deadline;
                    tracing::trace!(?key, "debounce window extended");
                    return;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Pending {
                        value,
                        deadline,
                        timer: next_timer,
                    });
                }
            }
            slots.next_timer += 1;
            next_timer
        };

        tracing::trace!(?key, delay = ?self.delay, "debounce timer armed");
        let slots = Arc::clone(&self.slots);
        let sink = Arc::clone(&self.sink);
        handle.spawn(async move {
            loop {
                let deadline = match lock(&slots).pending.get(&key) {
                    Some(pending) if pending.timer == timer => pending.deadline,
                    // flushed, or taken over by a newer timer
                    _ => return,
                };
                tokio::time::sleep_until(deadline).await;

                let fired = {
                    let mut slots = lock(&slots);
                    match slots.pending.get(&key) {
                        Some(pending) if pending.timer != timer => return,
                        Some(pending) if pending.deadline > Instant::now() => None,
                        Some(_) => slots.pending.remove(&key).map(|pending| pending.value),
                        None => return,
                    }
                };
                if let Some(value) = fired {
                    tracing::trace!(?key, "debounce window elapsed");
                    sink(key, value).await;
                    return;
                }
            }
        });
    }

    /// Take the pending value for `key` now, cancelling its window
    pub fn flush(&self, key: &K) -> Option<V> {
        lock(&self.slots).pending.remove(key).map(|pending| pending.value)
    }

    /// Take every pending value now
    pub fn flush_all(&self) -> Vec<(K, V)> {
        lock(&self.slots)
            .pending
            .drain()
            .map(|(key, pending)| (key, pending.value))
            .collect()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.slots).pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.slots).pending.len()
    }
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Peek at the pending value for `key`
    pub fn pending(&self, key: &K) -> Option<V> {
        lock(&self.slots)
            .pending
            .get(key)
            .map(|pending| pending.value.clone())
    }
}
