//! Persistence for stores.
//!
//! [`create_persistent_store`] wraps a regular store so that its state is
//! written to a [`StorageArea`] on every commit and restored on creation. A
//! fingerprint of the initial state is stored next to the snapshot; when the
//! initial state changes between runs the old snapshot is discarded.
//!
//! Stores that share a key and a storage backend stay synchronized while
//! they have listeners, through storage change events and
//! [`Environment::focus`].

mod environment;
mod persistent;
mod serializer;
mod storage;

pub use environment::{Environment, StorageKind, SyncId, SyncRegistry};
pub use persistent::{
    create_persistent_store, PersistOptions, StorageKeys, FINGERPRINT_PREFIX, STATE_PREFIX,
};
pub use serializer::{JsonSerializer, Serializer};
pub use storage::{FileStorage, MemoryStorage, StorageArea, StorageEvent, WatchId, Watcher};
