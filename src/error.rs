//! Error types for statekit

use thiserror::Error;

/// Errors surfaced by statekit.
///
/// The store engine itself never fails; errors come from the edges:
/// serializers, storage backends and context lookup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("store context not found; call `current` inside `StoreContext::provide`")]
    ContextNotFound,

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unknown storage kind `{0}`, expected `local` or `session`")]
    UnknownStorageKind(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
