//! The host a persistent store runs in.
//!
//! An [`Environment`] stands in for a browser window: it may offer local and
//! session storage, it receives focus signals, and it owns the registry of
//! storage watchers installed on behalf of attached stores. Two environments
//! holding clones of the same local storage behave like two tabs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::storage::{StorageArea, StorageEvent, WatchId};
use crate::error::Error;

/// Which storage area a persistent store writes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Survives restarts; shared by every environment holding the backend.
    #[default]
    Local,
    /// Scoped to one environment's session.
    Session,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Local => f.write_str("local"),
            StorageKind::Session => f.write_str("session"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageKind::Local),
            "session" => Ok(StorageKind::Session),
            other => Err(Error::UnknownStorageKind(other.to_string())),
        }
    }
}

/// Identifies one store's registration in a [`SyncRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SyncId(u64);

type Recheck = Rc<dyn Fn()>;
type EntryKey = (StorageKind, String);

struct SyncEntry {
    storage: Rc<dyn StorageArea>,
    watch: WatchId,
    stores: Vec<(SyncId, Recheck)>,
}

/// Storage watchers installed for attached persistent stores.
///
/// There is at most one watcher per (storage kind, store key). It is created
/// when the first store with that key attaches, fans each relevant storage
/// event out to every attached store with that key, and is removed when the
/// last of them detaches.
#[derive(Default)]
pub struct SyncRegistry {
    entries: RefCell<HashMap<EntryKey, SyncEntry>>,
    next_id: Cell<u64>,
}

impl SyncRegistry {
    /// Register `recheck` to run whenever the snapshot under `state_key` may
    /// have changed.
    pub(crate) fn register(
        self: &Rc<Self>,
        kind: StorageKind,
        state_key: &str,
        storage: &Rc<dyn StorageArea>,
        recheck: Recheck,
    ) -> SyncId {
        let id = SyncId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let entry_key = (kind, state_key.to_string());
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(entry_key.clone()).or_insert_with(|| {
            debug!(%kind, key = state_key, "installing storage watcher");
            let registry: Weak<SyncRegistry> = Rc::downgrade(self);
            let watched = entry_key.clone();
            let watch = storage.watch(Rc::new(move |event: &StorageEvent| {
                let relevant = event.key.as_deref().map_or(true, |key| key == watched.1);
                if !relevant {
                    return;
                }
                if let Some(registry) = registry.upgrade() {
                    registry.recheck(&watched);
                }
            }));
            SyncEntry {
                storage: Rc::clone(storage),
                watch,
                stores: Vec::new(),
            }
        });
        entry.stores.push((id, recheck));
        id
    }

    pub(crate) fn unregister(&self, kind: StorageKind, state_key: &str, id: SyncId) {
        let entry_key = (kind, state_key.to_string());
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(&entry_key) else {
            return;
        };
        entry.stores.retain(|(sync_id, _)| *sync_id != id);
        let removed = if entry.stores.is_empty() {
            entries.remove(&entry_key)
        } else {
            None
        };
        drop(entries);

        if let Some(entry) = removed {
            debug!(%kind, key = state_key, "removing storage watcher");
            entry.storage.unwatch(entry.watch);
        }
    }

    fn recheck(&self, entry_key: &EntryKey) {
        let stores = match self.entries.borrow().get(entry_key) {
            Some(entry) => entry.stores.clone(),
            None => return,
        };
        for (_, recheck) in stores {
            recheck();
        }
    }

    fn recheck_all(&self) {
        let stores: Vec<Recheck> = self
            .entries
            .borrow()
            .values()
            .flat_map(|entry| entry.stores.iter().map(|(_, recheck)| Rc::clone(recheck)))
            .collect();
        for recheck in stores {
            recheck();
        }
    }

    /// Whether a watcher is installed for `state_key`.
    pub fn is_watching(&self, kind: StorageKind, state_key: &str) -> bool {
        self.entries
            .borrow()
            .contains_key(&(kind, state_key.to_string()))
    }

    /// Number of installed watchers.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage and synchronization context for persistent stores.
///
/// # Examples
///
/// ```
/// use statekit::persist::{Environment, MemoryStorage, StorageKind};
///
/// let shared = MemoryStorage::new();
/// let tab_a = Environment::new().with_local(shared.clone());
/// let tab_b = Environment::new().with_local(shared);
/// assert!(tab_a.storage(StorageKind::Local).is_some());
/// assert!(tab_b.storage(StorageKind::Session).is_none());
/// ```
#[derive(Clone, Default)]
pub struct Environment {
    local: Option<Rc<dyn StorageArea>>,
    session: Option<Rc<dyn StorageArea>>,
    registry: Rc<SyncRegistry>,
}

impl Environment {
    /// An environment with no storage. Persistent stores created in it are
    /// plain stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with fresh in-memory local and session storage.
    pub fn in_memory() -> Self {
        Self::new()
            .with_local(super::MemoryStorage::new())
            .with_session(super::MemoryStorage::new())
    }

    pub fn with_local<T: StorageArea + 'static>(mut self, storage: T) -> Self {
        self.local = Some(Rc::new(storage));
        self
    }

    pub fn with_session<T: StorageArea + 'static>(mut self, storage: T) -> Self {
        self.session = Some(Rc::new(storage));
        self
    }

    pub fn storage(&self, kind: StorageKind) -> Option<Rc<dyn StorageArea>> {
        match kind {
            StorageKind::Local => self.local.clone(),
            StorageKind::Session => self.session.clone(),
        }
    }

    pub fn registry(&self) -> &Rc<SyncRegistry> {
        &self.registry
    }

    /// Signal that the environment regained focus. Every attached persistent
    /// store re-reads its snapshot.
    pub fn focus(&self) {
        debug!(watchers = self.registry.len(), "focus signal");
        self.registry.recheck_all();
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("local", &self.local.is_some())
            .field("session", &self.session.is_some())
            .field("watchers", &self.registry.len())
            .finish()
    }
}
