use std::cell::Cell;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::environment::{Environment, StorageKind, SyncId};
use super::serializer::{JsonSerializer, Serializer};
use super::storage::StorageArea;
use crate::store::{build_store, create_store, Getter, Merge, Setter, Store, StoreEvent, StoreOptions};

/// Prefix of the key holding the serialized state.
pub const STATE_PREFIX: &str = "store_";
/// Prefix of the key holding the serialized initial state.
pub const FINGERPRINT_PREFIX: &str = "init_";

/// The two storage keys used by one persistent store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKeys {
    /// `store_<key>`: the current snapshot.
    pub state: String,
    /// `init_<key>`: the initial state the snapshot was taken against.
    pub fingerprint: String,
}

impl StorageKeys {
    pub fn new(key: &str) -> Self {
        Self {
            state: format!("{STATE_PREFIX}{key}"),
            fingerprint: format!("{FINGERPRINT_PREFIX}{key}"),
        }
    }
}

/// Options for [`create_persistent_store`].
pub struct PersistOptions<S> {
    storage: StorageKind,
    serializer: Rc<dyn Serializer<S>>,
    store: StoreOptions<S>,
}

impl<S> PersistOptions<S>
where
    S: Merge + Serialize + DeserializeOwned,
{
    /// Local storage, JSON, default store options.
    pub fn new() -> Self {
        Self::with_serializer(JsonSerializer)
    }
}

impl<S: Merge> PersistOptions<S> {
    /// Local storage, default store options, custom serializer.
    pub fn with_serializer<T>(serializer: T) -> Self
    where
        T: Serializer<S> + 'static,
    {
        Self {
            storage: StorageKind::default(),
            serializer: Rc::new(serializer),
            store: StoreOptions::default(),
        }
    }

    pub fn storage(mut self, kind: StorageKind) -> Self {
        self.storage = kind;
        self
    }

    pub fn serializer<T>(mut self, serializer: T) -> Self
    where
        T: Serializer<S> + 'static,
    {
        self.serializer = Rc::new(serializer);
        self
    }

    /// Options passed through to the underlying store.
    pub fn store(mut self, options: StoreOptions<S>) -> Self {
        self.store = options;
        self
    }
}

impl<S> Default for PersistOptions<S>
where
    S: Merge + Serialize + DeserializeOwned,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Reads and writes one store's snapshot.
struct Snapshots<S> {
    storage: Rc<dyn StorageArea>,
    serializer: Rc<dyn Serializer<S>>,
    keys: StorageKeys,
}

impl<S: Merge> Snapshots<S> {
    /// Pick the starting state, discarding the snapshot if `initial` changed
    /// since it was written.
    fn load(&self, initial: &S) -> S {
        let fingerprint = match self.serializer.stringify(initial) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                warn!(key = %self.keys.state, %err, "cannot serialize initial state");
                return initial.clone();
            }
        };

        let stored = self.read(&self.keys.fingerprint);
        if stored.as_deref() != Some(fingerprint.as_str()) {
            debug!(key = %self.keys.state, "initial state changed, discarding snapshot");
            if let Err(err) = self.storage.set_item(&self.keys.fingerprint, &fingerprint) {
                warn!(key = %self.keys.fingerprint, %err, "failed to write fingerprint");
            }
            if let Err(err) = self.storage.remove_item(&self.keys.state) {
                warn!(key = %self.keys.state, %err, "failed to remove stale snapshot");
            }
            return initial.clone();
        }

        match self.read(&self.keys.state) {
            Some(raw) => self.serializer.parse(&raw).unwrap_or_else(|err| {
                warn!(key = %self.keys.state, %err, "unreadable snapshot, using initial state");
                initial.clone()
            }),
            None => initial.clone(),
        }
    }

    /// Write `state` unless the stored snapshot already matches it.
    fn write(&self, state: &S) {
        let next = match self.serializer.stringify(state) {
            Ok(next) => next,
            Err(err) => {
                warn!(key = %self.keys.state, %err, "cannot serialize state");
                return;
            }
        };
        if self.read(&self.keys.state).as_deref() == Some(next.as_str()) {
            return;
        }
        if let Err(err) = self.storage.set_item(&self.keys.state, &next) {
            warn!(key = %self.keys.state, %err, "failed to write snapshot");
        }
    }

    /// The stored snapshot, if it differs from `current`.
    fn external_change(&self, current: &S) -> Option<S> {
        let stored = self.read(&self.keys.state)?;
        match self.serializer.stringify(current) {
            Ok(serialized) if serialized == stored => return None,
            Ok(_) => {}
            Err(err) => {
                warn!(key = %self.keys.state, %err, "cannot serialize state");
                return None;
            }
        }
        match self.serializer.parse(&stored) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(key = %self.keys.state, %err, "ignoring unreadable snapshot");
                None
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).unwrap_or_else(|err| {
            warn!(key, %err, "storage read failed");
            None
        })
    }
}

/// Create a store whose state is mirrored into `env`'s storage.
///
/// The state is loaded from the `store_<key>` snapshot when the `init_<key>`
/// fingerprint still matches `initial`; otherwise the snapshot is dropped and
/// the store starts from `initial`. Every commit is written back when it
/// differs from the stored snapshot. While the store has listeners it also
/// follows writes made by other environments sharing the storage, and
/// re-reads its snapshot on [`Environment::focus`].
///
/// If `env` has no storage of the requested kind, a plain store is returned.
///
/// # Examples
///
/// ```
/// use statekit::persist::{create_persistent_store, Environment, PersistOptions};
/// use serde_json::json;
///
/// let env = Environment::in_memory();
///
/// let store = create_persistent_store(&env, "counter", json!({ "count": 0 }), |_, _| (), PersistOptions::new());
/// store.set(json!({ "count": 1 }));
///
/// let reloaded = create_persistent_store(&env, "counter", json!({ "count": 0 }), |_, _| (), PersistOptions::new());
/// assert_eq!(reloaded.get(), json!({ "count": 1 }));
/// ```
pub fn create_persistent_store<S, A, F>(
    env: &Environment,
    key: &str,
    initial: S,
    define_actions: F,
    options: PersistOptions<S>,
) -> Store<S, A>
where
    S: Merge,
    F: FnOnce(Setter<S>, Getter<S>) -> A,
{
    let PersistOptions {
        storage: kind,
        serializer,
        store: store_options,
    } = options;

    let Some(storage) = env.storage(kind) else {
        debug!(key, %kind, "no storage available, persistence disabled");
        return create_store(initial, define_actions, store_options);
    };

    let snapshots = Rc::new(Snapshots {
        storage: Rc::clone(&storage),
        serializer,
        keys: StorageKeys::new(key),
    });
    let state = snapshots.load(&initial);
    let store = build_store(state, initial, define_actions, store_options);

    // After every Change handler, so their silent adjustments are written too.
    let writer = Rc::clone(&snapshots);
    store.on_commit(move |state: &S| writer.write(state));

    let recheck: Rc<dyn Fn()> = {
        let store = store.downgrade();
        let snapshots = Rc::clone(&snapshots);
        Rc::new(move || {
            let Some(inner) = store.upgrade() else {
                return;
            };
            if let Some(state) = snapshots.external_change(&inner.get()) {
                debug!(key = %snapshots.keys.state, "synchronizing from storage");
                inner.commit(state, false);
            }
        })
    };

    let registration: Rc<Cell<Option<SyncId>>> = Rc::new(Cell::new(None));
    {
        let registry = Rc::clone(env.registry());
        let registration = Rc::clone(&registration);
        let state_key = snapshots.keys.state.clone();
        store.add_event_listener(StoreEvent::Attach, move |_: &S, _: &Setter<S>| {
            recheck();
            if registration.get().is_none() {
                let id = registry.register(kind, &state_key, &storage, Rc::clone(&recheck));
                registration.set(Some(id));
            }
        });
    }
    {
        let registry = Rc::clone(env.registry());
        let state_key = snapshots.keys.state.clone();
        store.add_event_listener(StoreEvent::Detach, move |_: &S, _: &Setter<S>| {
            if let Some(id) = registration.take() {
                registry.unregister(kind, &state_key, id);
            }
        });
    }

    store.finish_load();
    store
}
