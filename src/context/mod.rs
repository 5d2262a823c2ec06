//! Store contexts.
//!
//! A [`StoreContext`] builds store instances on demand and lets nested code
//! look up the nearest instance provided to it.

mod context;

pub use context::StoreContext;
