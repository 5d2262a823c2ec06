use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde_json::{Map, Value};

/// A state value that can absorb a partial update.
///
/// Every commit is a shallow merge: fields present in the patch overwrite the
/// current ones, fields absent from the patch are left untouched.
///
/// # Examples
///
/// ```
/// use statekit::Merge;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Counter {
///     count: i32,
///     label: String,
/// }
///
/// #[derive(Default)]
/// struct CounterPatch {
///     count: Option<i32>,
///     label: Option<String>,
/// }
///
/// impl Merge for Counter {
///     type Patch = CounterPatch;
///
///     fn merge(&mut self, patch: CounterPatch) {
///         if let Some(count) = patch.count {
///             self.count = count;
///         }
///         if let Some(label) = patch.label {
///             self.label = label;
///         }
///     }
/// }
///
/// let mut counter = Counter { count: 0, label: "clicks".into() };
/// counter.merge(CounterPatch { count: Some(3), ..Default::default() });
/// assert_eq!(counter, Counter { count: 3, label: "clicks".into() });
/// ```
pub trait Merge: Clone + 'static {
    /// The partial form of the state accepted by `set`.
    type Patch: 'static;

    /// Merge `patch` into `self`, keeping fields the patch does not mention.
    fn merge(&mut self, patch: Self::Patch);
}

/// JSON objects merge key by key. Anything else is replaced wholesale.
impl Merge for Value {
    type Patch = Value;

    fn merge(&mut self, patch: Value) {
        match (self, patch) {
            (Value::Object(current), Value::Object(patch)) => current.extend(patch),
            (current, patch) => *current = patch,
        }
    }
}

impl Merge for Map<String, Value> {
    type Patch = Map<String, Value>;

    fn merge(&mut self, patch: Self::Patch) {
        self.extend(patch);
    }
}

impl<K, V> Merge for HashMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    type Patch = HashMap<K, V>;

    fn merge(&mut self, patch: Self::Patch) {
        self.extend(patch);
    }
}

impl<K, V> Merge for BTreeMap<K, V>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
{
    type Patch = BTreeMap<K, V>;

    fn merge(&mut self, patch: Self::Patch) {
        self.extend(patch);
    }
}

/// A state modifier: either a literal patch or a function of the current state.
///
/// Both forms go through [`Modifier::resolve`], which is evaluated against the
/// current state before anything is committed.
pub enum Modifier<S: Merge> {
    /// Merge this patch as-is.
    Patch(S::Patch),
    /// Compute the patch from the current state.
    With(Box<dyn FnOnce(&S) -> S::Patch>),
}

impl<S: Merge> Modifier<S> {
    pub fn patch(patch: S::Patch) -> Self {
        Modifier::Patch(patch)
    }

    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&S) -> S::Patch + 'static,
    {
        Modifier::With(Box::new(f))
    }

    /// Turn the modifier into a concrete patch for `state`.
    pub fn resolve(self, state: &S) -> S::Patch {
        match self {
            Modifier::Patch(patch) => patch,
            Modifier::With(f) => f(state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_merge_keeps_absent_fields() {
        let mut state = json!({ "count": 0, "name": "test" });
        state.merge(json!({ "count": 5 }));
        assert_eq!(state, json!({ "count": 5, "name": "test" }));
    }

    #[test]
    fn json_merge_is_shallow() {
        let mut state = json!({ "user": { "name": "a", "age": 3 } });
        state.merge(json!({ "user": { "name": "b" } }));
        assert_eq!(state, json!({ "user": { "name": "b" } }));
    }

    #[test]
    fn json_non_object_is_replaced() {
        let mut state = json!(1);
        state.merge(json!({ "count": 2 }));
        assert_eq!(state, json!({ "count": 2 }));
    }

    #[test]
    fn hashmap_merge() {
        let mut state = HashMap::from([("a", 1), ("b", 2)]);
        state.merge(HashMap::from([("b", 20), ("c", 30)]));
        assert_eq!(state, HashMap::from([("a", 1), ("b", 20), ("c", 30)]));
    }

    #[test]
    fn modifier_resolves_function_against_state() {
        let state = json!({ "count": 4 });
        let modifier: Modifier<Value> =
            Modifier::with(|s: &Value| json!({ "count": s["count"].as_i64().unwrap() * 2 }));
        assert_eq!(modifier.resolve(&state), json!({ "count": 8 }));

        let literal: Modifier<Value> = Modifier::patch(json!({ "count": 1 }));
        assert_eq!(literal.resolve(&state), json!({ "count": 1 }));
    }
}
