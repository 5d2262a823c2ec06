//! The store engine.
//!
//! A store holds one state value, merges partial updates into it, fires
//! lifecycle events and notifies subscribers after every commit.

mod events;
mod merge;
mod store;

pub use events::{HandlerId, StoreEvent};
pub use merge::{Merge, Modifier};
pub use store::{create_store, Getter, Setter, Store, StoreOptions, Subscription};

pub(crate) use store::build_store;
