//! Form store - the externally owned container for a form's state
//!
//! The store holds the current [`FormState`] snapshot (or nothing, before the
//! form is initialized) and notifies subscribers after every change. It is
//! the only mutable thing a controller touches: every write is a
//! read-modify-write against the *latest* snapshot, so two independently
//! scheduled field updates merge instead of overwriting each other.
//!
//! Subscribers are how a host framework learns that it should re-render.
//!
//! # Example
//!
//! ```ignore
//! use formwork_core::store::FormStore;
//!
//! let store = FormStore::new();
//!
//! // Keep the subscription alive for as long as you want notifications
//! let _sub = store.subscribe(|state| {
//!     println!("form changed: {} fields", state.len());
//! });
//!
//! store.replace(FormState::init(&schema, &Record::new()));
//! store.update(|state| state.patch_value("age", Some(json!(25))));
//! ```

use crate::state::FormState;
use slotmap::{new_key_type, SlotMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

new_key_type! {
    /// Identifier of a registered listener
    pub struct ListenerId;
}

type Listener = Arc<dyn Fn(&FormState) + Send + Sync>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Observable cell holding a form's state
pub struct FormStore {
    state: RwLock<Option<FormState>>,
    listeners: RwLock<SlotMap<ListenerId, Listener>>,
    /// Bumped on every change
    version: AtomicU64,
}

impl FormStore {
    /// Create an empty (uninitialized) store
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            listeners: RwLock::new(SlotMap::with_key()),
            version: AtomicU64::new(0),
        })
    }

    /// Create a store that already holds `state`
    pub fn with_state(state: FormState) -> Arc<Self> {
        let store = Self::new();
        *write(&store.state) = Some(state);
        store
    }

    /// Current snapshot, `None` until the form is initialized
    pub fn get(&self) -> Option<FormState> {
        read(&self.state).clone()
    }

    pub fn is_initialized(&self) -> bool {
        read(&self.state).is_some()
    }

    /// Number of changes applied so far
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Replace the whole state
    pub fn replace(&self, state: FormState) {
        *write(&self.state) = Some(state.clone());
        self.version.fetch_add(1, Ordering::AcqRel);
        self.notify(&state);
    }

    /// Read-modify-write against the latest snapshot
    ///
    /// Does nothing (and returns `None`) while the store is uninitialized.
    pub fn update<F>(&self, f: F) -> Option<FormState>
    where
        F: FnOnce(FormState) -> FormState,
    {
        let next = {
            let mut guard = write(&self.state);
            let current = guard.take()?;
            let next = f(current);
            *guard = Some(next.clone());
            next
        };
        self.version.fetch_add(1, Ordering::AcqRel);
        self.notify(&next);
        Some(next)
    }

    /// Conditional read-modify-write: `f` may decline by returning `None`
    ///
    /// A declined update leaves the state, the version and the listeners
    /// alone. `f` runs under the store's write lock.
    pub fn update_if<F>(&self, f: F) -> Option<FormState>
    where
        F: FnOnce(&FormState) -> Option<FormState>,
    {
        let next = {
            let mut guard = write(&self.state);
            let next = f(guard.as_ref()?)?;
            *guard = Some(next.clone());
            next
        };
        self.version.fetch_add(1, Ordering::AcqRel);
        self.notify(&next);
        Some(next)
    }

    /// Register a change listener
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped.
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&FormState) + Send + Sync + 'static,
    {
        let id = write(&self.listeners).insert(Arc::new(listener));
        Subscription {
            store: Arc::downgrade(self),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        read(&self.listeners).len()
    }

    fn unsubscribe(&self, id: ListenerId) {
        write(&self.listeners).remove(id);
    }

    fn notify(&self, state: &FormState) {
        // listeners may read the store, so call them outside the lock
        let listeners: Vec<Listener> = read(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener(state);
        }
    }
}

/// Keeps a listener registered; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes immediately"]
#[derive(Debug)]
pub struct Subscription {
    store: Weak<FormStore>,
    id: ListenerId,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unsubscribe now
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.unsubscribe(self.id);
        }
    }
}
