//! # statekit
//!
//! A minimal reactive state container for Rust.
//!
//! statekit provides two levels of functionality:
//!
//! ## Store (Core)
//!
//! A single-threaded state cell with change notification:
//! - `Store<S, A>` - State plus optional actions, updated by shallow merge
//! - `subscribe` - Listeners called after every commit
//! - `StoreEvent` - `Load`, `Attach`, `Detach` and `Change` lifecycle events
//! - `StoreContext` - Factory and scoped lookup for per-subtree instances
//!
//! ## Persistence (Opt-in)
//!
//! Mirrors a store into key/value storage:
//! - `create_persistent_store` - Snapshot on every commit, restore on creation
//! - Initial-state fingerprints invalidate stale snapshots
//! - Stores sharing a key and a backend stay synchronized while attached

pub mod context;
pub mod error;
pub mod persist;
pub mod store;

// Re-export main types for convenience
pub use context::StoreContext;
pub use error::{Error, Result};
pub use persist::{create_persistent_store, Environment, PersistOptions, StorageKind};
pub use store::{
    create_store, Getter, HandlerId, Merge, Modifier, Setter, Store, StoreEvent, StoreOptions,
    Subscription,
};
