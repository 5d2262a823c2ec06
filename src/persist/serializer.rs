use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Converts state to and from its stored string form.
///
/// Two snapshots are considered equal when their strings are equal, so an
/// implementation should be deterministic for equal states.
pub trait Serializer<S> {
    fn stringify(&self, state: &S) -> Result<String>;
    fn parse(&self, raw: &str) -> Result<S>;
}

/// Plain JSON via `serde_json`. The default serializer.
///
/// Output goes through [`serde_json::Value`], whose maps are sorted, so object
/// keys come out in the same order no matter how the state stores them.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl<S> Serializer<S> for JsonSerializer
where
    S: Serialize + DeserializeOwned,
{
    fn stringify(&self, state: &S) -> Result<String> {
        let value = serde_json::to_value(state)?;
        Ok(serde_json::to_string(&value)?)
    }

    fn parse(&self, raw: &str) -> Result<S> {
        Ok(serde_json::from_str(raw)?)
    }
}
