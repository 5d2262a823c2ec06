use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::store::Store;

type Builder<Args, S, A> = dyn Fn(Args) -> Store<S, A>;

/// A factory for independent store instances, plus a scoped binding so
/// nested code can reach the nearest provided instance.
///
/// Each context keeps its own stack of provided stores; `provide` pushes for
/// the duration of a closure and [`StoreContext::current`] reads the top.
///
/// # Examples
///
/// ```
/// use statekit::{Store, StoreContext};
/// use serde_json::json;
///
/// let counters = StoreContext::new(|start: i64| Store::new(json!({ "count": start })));
///
/// let outer = counters.instantiate(1);
/// let inner = counters.instantiate(10);
///
/// counters.provide(outer, || {
///     assert_eq!(counters.current().unwrap().get()["count"], 1);
///     counters.provide(inner, || {
///         assert_eq!(counters.current().unwrap().get()["count"], 10);
///     });
///     assert_eq!(counters.current().unwrap().get()["count"], 1);
/// });
///
/// assert!(counters.current().is_err());
/// ```
pub struct StoreContext<Args, S, A = ()> {
    builder: Rc<Builder<Args, S, A>>,
    stack: Rc<RefCell<Vec<Store<S, A>>>>,
}

impl<Args, S, A> StoreContext<Args, S, A> {
    /// Create a context around `builder`.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(Args) -> Store<S, A> + 'static,
    {
        Self {
            builder: Rc::new(builder),
            stack: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Build a fresh store. Every call returns a new, independent instance.
    pub fn instantiate(&self, args: Args) -> Store<S, A> {
        (self.builder)(args)
    }

    /// Run `f` with `store` as the nearest instance of this context.
    ///
    /// The binding is removed when `f` returns, including by panic.
    pub fn provide<F, R>(&self, store: Store<S, A>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.stack.borrow_mut().push(store);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        self.stack.borrow_mut().pop();

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The nearest provided instance.
    ///
    /// Fails with [`Error::ContextNotFound`] outside of any `provide` call.
    pub fn current(&self) -> Result<Store<S, A>> {
        self.stack
            .borrow()
            .last()
            .cloned()
            .ok_or(Error::ContextNotFound)
    }

    /// Depth of nested `provide` calls currently active.
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }
}

impl<Args, S, A> Clone for StoreContext<Args, S, A> {
    fn clone(&self) -> Self {
        Self {
            builder: Rc::clone(&self.builder),
            stack: Rc::clone(&self.stack),
        }
    }
}
