//! Key/value storage backends.
//!
//! A [`StorageArea`] behaves like browser local or session storage: string
//! keys, string values, and a change notification for every mutation.
//! Cloned handles of [`MemoryStorage`] and [`FileStorage`] share their data
//! and watchers, so two environments holding the same backend observe each
//! other's writes the way two tabs of one origin do.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;

/// A mutation observed on a storage area.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    /// The changed key, or `None` when the whole area was cleared.
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Identifies a watcher registered with [`StorageArea::watch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

pub type Watcher = Rc<dyn Fn(&StorageEvent)>;

/// A string key/value store with change notification.
pub trait StorageArea {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`. Watchers are notified only if the value changed.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    fn remove_item(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `watcher` for every subsequent mutation.
    fn watch(&self, watcher: Watcher) -> WatchId;

    /// Returns `false` if `id` was not registered.
    fn unwatch(&self, id: WatchId) -> bool;
}

#[derive(Default)]
struct Watchers {
    list: RefCell<Vec<(WatchId, Watcher)>>,
    next_id: Cell<u64>,
}

impl Watchers {
    fn add(&self, watcher: Watcher) -> WatchId {
        let id = WatchId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.list.borrow_mut().push((id, watcher));
        id
    }

    fn remove(&self, id: WatchId) -> bool {
        let mut list = self.list.borrow_mut();
        let before = list.len();
        list.retain(|(watch_id, _)| *watch_id != id);
        list.len() != before
    }

    fn notify(&self, event: &StorageEvent) {
        let watchers = self.list.borrow().clone();
        for (id, watcher) in watchers {
            if self.list.borrow().iter().any(|(watch_id, _)| *watch_id == id) {
                watcher(event);
            }
        }
    }
}

type Items = BTreeMap<String, String>;

/// Apply a write and return the event to broadcast, if anything changed.
fn set_entry(items: &mut Items, key: &str, value: &str) -> Option<StorageEvent> {
    let old = items.insert(key.to_string(), value.to_string());
    if old.as_deref() == Some(value) {
        return None;
    }
    Some(StorageEvent {
        key: Some(key.to_string()),
        old_value: old,
        new_value: Some(value.to_string()),
    })
}

fn remove_entry(items: &mut Items, key: &str) -> Option<StorageEvent> {
    let old = items.remove(key)?;
    Some(StorageEvent {
        key: Some(key.to_string()),
        old_value: Some(old),
        new_value: None,
    })
}

fn clear_entries(items: &mut Items) -> Option<StorageEvent> {
    if items.is_empty() {
        return None;
    }
    items.clear();
    Some(StorageEvent {
        key: None,
        old_value: None,
        new_value: None,
    })
}

/// Map plus watchers; the shared core of both backends.
#[derive(Default)]
struct Area {
    items: RefCell<Items>,
    watchers: Watchers,
}

impl Area {
    fn get(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// Mutate in place and notify.
    fn change<F>(&self, f: F)
    where
        F: FnOnce(&mut Items) -> Option<StorageEvent>,
    {
        let event = f(&mut self.items.borrow_mut());
        if let Some(event) = event {
            self.watchers.notify(&event);
        }
    }
}

/// In-memory storage. Clones share the same data and watchers.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    area: Rc<Area>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageArea for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.area.get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.area.change(|items| set_entry(items, key, value));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.area.change(|items| remove_entry(items, key));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.area.change(clear_entries);
        Ok(())
    }

    fn len(&self) -> usize {
        self.area.len()
    }

    fn watch(&self, watcher: Watcher) -> WatchId {
        self.area.watchers.add(watcher)
    }

    fn unwatch(&self, id: WatchId) -> bool {
        self.area.watchers.remove(id)
    }
}

/// Durable storage kept as a JSON object of string pairs in one file.
///
/// The file is read once on [`FileStorage::open`] and rewritten after every
/// mutation. Clones share the same data and watchers.
#[derive(Clone)]
pub struct FileStorage {
    path: Rc<PathBuf>,
    area: Rc<Area>,
}

impl FileStorage {
    /// Open the file at `path`, starting empty if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let items: Items = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = items.len(), "opened file storage");

        Ok(Self {
            path: Rc::new(path),
            area: Rc::new(Area {
                items: RefCell::new(items),
                watchers: Watchers::default(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, items: &Items) -> Result<()> {
        let raw = serde_json::to_string_pretty(items)?;
        fs::write(&*self.path, raw)?;
        Ok(())
    }

    /// Apply `f` to a copy of the map and publish it only once it is on disk.
    fn change<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Items) -> Option<StorageEvent>,
    {
        let mut items = self.area.items.borrow().clone();
        let Some(event) = f(&mut items) else {
            return Ok(());
        };
        self.flush(&items)?;
        *self.area.items.borrow_mut() = items;
        self.area.watchers.notify(&event);
        Ok(())
    }
}

impl StorageArea for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.area.get(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.change(|items| set_entry(items, key, value))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.change(|items| remove_entry(items, key))
    }

    fn clear(&self) -> Result<()> {
        self.change(clear_entries)
    }

    fn len(&self) -> usize {
        self.area.len()
    }

    fn watch(&self, watcher: Watcher) -> WatchId {
        self.area.watchers.add(watcher)
    }

    fn unwatch(&self, id: WatchId) -> bool {
        self.area.watchers.remove(id)
    }
}
