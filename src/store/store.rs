use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::events::{EventBus, Handler, HandlerId, StoreEvent};
use super::merge::{Merge, Modifier};

type Listener = Rc<dyn Fn()>;
type CommitHook<S> = Rc<dyn Fn(&S)>;

/// Shared state behind every handle of one store.
pub(crate) struct StoreInner<S> {
    state: RefCell<S>,
    initial: S,
    listeners: RefCell<Vec<(usize, Listener)>>,
    events: EventBus<S>,
    commit_hooks: RefCell<Vec<CommitHook<S>>>,
    next_listener: Cell<usize>,
    reset_on_detach: bool,
}

impl<S: Merge> StoreInner<S> {
    fn new(state: S, initial: S, reset_on_detach: bool) -> Self {
        Self {
            state: RefCell::new(state),
            initial,
            listeners: RefCell::new(Vec::new()),
            events: EventBus::new(),
            commit_hooks: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            reset_on_detach,
        }
    }

    pub(crate) fn get(&self) -> S {
        self.state.borrow().clone()
    }

    /// Merge a patch computed from `current` and commit the result.
    fn merge_and_commit(self: &Rc<Self>, mut current: S, patch: S::Patch, silent: bool) -> S {
        current.merge(patch);
        self.commit(current, silent)
    }

    fn apply(self: &Rc<Self>, modifier: Modifier<S>, silent: bool) -> S {
        // Resolve before touching the cell so a panicking modifier commits nothing.
        let current = self.get();
        let patch = modifier.resolve(&current);
        self.merge_and_commit(current, patch, silent)
    }

    /// Replace the state, then fire `Change`, run commit hooks and notify
    /// listeners unless silent.
    pub(crate) fn commit(self: &Rc<Self>, next: S, silent: bool) -> S {
        *self.state.borrow_mut() = next;
        if !silent {
            trace!(listeners = self.listener_count(), "state committed");
            self.emit(StoreEvent::Change);
            self.run_commit_hooks();
            self.dispatch();
        }
        self.get()
    }

    /// Hooks see the state after every `Change` handler has adjusted it.
    fn run_commit_hooks(&self) {
        let hooks = self.commit_hooks.borrow().clone();
        if hooks.is_empty() {
            return;
        }
        let state = self.get();
        for hook in hooks {
            hook(&state);
        }
    }

    fn reset(self: &Rc<Self>) -> S {
        self.commit(self.initial.clone(), false)
    }

    fn emit(self: &Rc<Self>, event: StoreEvent) {
        let handlers = self.events.snapshot(event);
        if handlers.is_empty() {
            return;
        }
        let setter = Setter {
            inner: Rc::clone(self),
            silent: event == StoreEvent::Change,
        };
        for (id, handler) in handlers {
            if !self.events.contains(event, id) {
                continue;
            }
            // Each handler sees adjustments made by the ones before it.
            let state = self.get();
            handler(&state, &setter);
        }
    }

    fn dispatch(&self) {
        let listeners = self.listeners.borrow().clone();
        for (id, listener) in listeners {
            if self.is_subscribed(id) {
                listener();
            }
        }
    }

    fn is_subscribed(&self, id: usize) -> bool {
        self.listeners.borrow().iter().any(|(lid, _)| *lid == id)
    }

    fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn subscribe(self: &Rc<Self>, listener: Listener) -> usize {
        if self.listener_count() == 0 {
            debug!("first listener attached");
            self.emit(StoreEvent::Attach);
        }
        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn unsubscribe(self: &Rc<Self>, id: usize) {
        let detached = {
            let mut listeners = self.listeners.borrow_mut();
            let before = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            before != listeners.len() && listeners.is_empty()
        };
        if detached {
            debug!(reset = self.reset_on_detach, "last listener detached");
            self.emit(StoreEvent::Detach);
            if self.reset_on_detach {
                self.reset();
            }
        }
    }
}

/// Writes to a store. Handed to action factories and event handlers.
///
/// The setter given to `Change` handlers is silent: it updates the state
/// without firing `Change` again or notifying listeners.
pub struct Setter<S> {
    inner: Rc<StoreInner<S>>,
    silent: bool,
}

impl<S: Merge> Setter<S> {
    /// Merge a patch into the state.
    pub fn set(&self, patch: S::Patch) -> S {
        self.apply(Modifier::Patch(patch))
    }

    /// Merge the patch computed from the current state.
    pub fn update<F>(&self, f: F) -> S
    where
        F: FnOnce(&S) -> S::Patch + 'static,
    {
        self.apply(Modifier::with(f))
    }

    /// Merge the patch a [`Modifier`] resolves to.
    pub fn apply(&self, modifier: Modifier<S>) -> S {
        self.inner.apply(modifier, self.silent)
    }

    /// Like [`Setter::update`], but a failing modifier leaves the state untouched.
    pub fn try_update<F, E>(&self, f: F) -> Result<S, E>
    where
        F: FnOnce(&S) -> Result<S::Patch, E>,
    {
        let current = self.inner.get();
        let patch = f(&current)?;
        Ok(self.inner.merge_and_commit(current, patch, self.silent))
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }
}

impl<S> Clone for Setter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            silent: self.silent,
        }
    }
}

/// Reads a store. Handed to action factories.
pub struct Getter<S> {
    inner: Rc<StoreInner<S>>,
}

impl<S: Merge> Getter<S> {
    pub fn get(&self) -> S {
        self.inner.get()
    }

    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        f(&*self.inner.state.borrow())
    }
}

impl<S> Clone for Getter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    /// Keep the listener registered for as long as the store lives.
    pub fn forget(mut self) {
        self.unsubscribe = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Construction options for a store.
///
/// The `on_*` callbacks are registered on the matching event channel before
/// the store is returned, so `on_load` is guaranteed to run.
pub struct StoreOptions<S> {
    pub(crate) on_load: Option<Handler<S>>,
    pub(crate) on_attach: Option<Handler<S>>,
    pub(crate) on_detach: Option<Handler<S>>,
    pub(crate) on_state_change: Option<Handler<S>>,
    pub(crate) reset_on_detach: bool,
}

impl<S: Merge> StoreOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_load<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &Setter<S>) + 'static,
    {
        self.on_load = Some(Rc::new(f));
        self
    }

    pub fn on_attach<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &Setter<S>) + 'static,
    {
        self.on_attach = Some(Rc::new(f));
        self
    }

    pub fn on_detach<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &Setter<S>) + 'static,
    {
        self.on_detach = Some(Rc::new(f));
        self
    }

    /// Runs on every commit with a silent setter.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &Setter<S>) + 'static,
    {
        self.on_state_change = Some(Rc::new(f));
        self
    }

    /// Restore the initial state when the last listener unsubscribes.
    pub fn reset_on_detach(mut self, reset: bool) -> Self {
        self.reset_on_detach = reset;
        self
    }
}

impl<S> Default for StoreOptions<S> {
    fn default() -> Self {
        Self {
            on_load: None,
            on_attach: None,
            on_detach: None,
            on_state_change: None,
            reset_on_detach: false,
        }
    }
}

/// A reactive state container.
///
/// Handles are cheap to clone and all refer to the same store. A store is
/// single-threaded; every operation runs to completion before returning.
///
/// # Examples
///
/// ```
/// use statekit::Store;
/// use serde_json::json;
///
/// let store = Store::new(json!({ "count": 0, "name": "clicks" }));
/// store.set(json!({ "count": 1 }));
/// assert_eq!(store.get(), json!({ "count": 1, "name": "clicks" }));
///
/// store.update(|s| json!({ "count": s["count"].as_i64().unwrap_or(0) + 1 }));
/// assert_eq!(store.get()["count"], 2);
///
/// store.reset();
/// assert_eq!(store.get()["count"], 0);
/// ```
pub struct Store<S, A = ()> {
    inner: Rc<StoreInner<S>>,
    actions: Rc<A>,
}

impl<S: Merge> Store<S> {
    /// Create a store with no actions and default options.
    pub fn new(initial: S) -> Self {
        create_store(initial, |_, _| (), StoreOptions::default())
    }
}

impl<S: Merge, A> Store<S, A> {
    /// Create a store whose actions are built by `define_actions`.
    pub fn with_actions<F>(initial: S, define_actions: F) -> Self
    where
        F: FnOnce(Setter<S>, Getter<S>) -> A,
    {
        create_store(initial, define_actions, StoreOptions::default())
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> S {
        self.inner.get()
    }

    /// Read state without cloning.
    ///
    /// The store must not be written from inside `f`.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&S) -> R,
    {
        f(&*self.inner.state.borrow())
    }

    /// Merge a patch into the state and notify.
    pub fn set(&self, patch: S::Patch) -> S {
        self.inner.apply(Modifier::Patch(patch), false)
    }

    /// Merge the patch computed from the current state and notify.
    pub fn update<F>(&self, f: F) -> S
    where
        F: FnOnce(&S) -> S::Patch + 'static,
    {
        self.inner.apply(Modifier::with(f), false)
    }

    /// Merge the patch a [`Modifier`] resolves to and notify.
    pub fn apply(&self, modifier: Modifier<S>) -> S {
        self.inner.apply(modifier, false)
    }

    /// Fallible update. On error nothing is committed and nobody is notified.
    pub fn try_update<F, E>(&self, f: F) -> Result<S, E>
    where
        F: FnOnce(&S) -> Result<S::Patch, E>,
    {
        let current = self.inner.get();
        let patch = f(&current)?;
        Ok(self.inner.merge_and_commit(current, patch, false))
    }

    /// Restore the initial state and notify.
    pub fn reset(&self) -> S {
        self.inner.reset()
    }

    /// Register a listener called after every commit.
    ///
    /// The first subscriber fires `Attach`; dropping the last
    /// [`Subscription`] fires `Detach`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        let id = self.inner.subscribe(Rc::new(listener));
        let inner: Weak<StoreInner<S>> = Rc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.unsubscribe(id);
                }
            })),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }

    pub fn add_event_listener<F>(&self, event: StoreEvent, handler: F) -> HandlerId
    where
        F: Fn(&S, &Setter<S>) + 'static,
    {
        self.inner.events.add(event, Rc::new(handler))
    }

    /// Returns `false` if `id` was not registered for `event`.
    pub fn remove_event_listener(&self, event: StoreEvent, id: HandlerId) -> bool {
        self.inner.events.remove(event, id)
    }

    pub fn actions(&self) -> &A {
        &self.actions
    }

    /// A setter that notifies like [`Store::set`].
    pub fn setter(&self) -> Setter<S> {
        Setter {
            inner: Rc::clone(&self.inner),
            silent: false,
        }
    }

    pub fn getter(&self) -> Getter<S> {
        Getter {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Run `hook` after the `Change` handlers of every notifying commit,
    /// before listeners. Hooks cannot be removed.
    pub(crate) fn on_commit<F>(&self, hook: F)
    where
        F: Fn(&S) + 'static,
    {
        self.inner.commit_hooks.borrow_mut().push(Rc::new(hook));
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner<S>> {
        Rc::downgrade(&self.inner)
    }

    /// Fire `Load`. Called exactly once, by the constructor that built the store.
    pub(crate) fn finish_load(&self) {
        self.inner.emit(StoreEvent::Load);
    }
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            actions: Rc::clone(&self.actions),
        }
    }
}

impl<S: Merge + fmt::Debug, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.inner.state.borrow())
            .field("listeners", &self.inner.listener_count())
            .finish()
    }
}

/// Create a store.
///
/// `define_actions` runs once with a setter and a getter; whatever it returns
/// is available through [`Store::actions`]. `Load` fires after the actions are
/// built.
///
/// # Examples
///
/// ```
/// use statekit::{create_store, StoreOptions};
/// use serde_json::json;
///
/// let store = create_store(
///     json!({ "count": 0 }),
///     |set, get| {
///         let inc = set.clone();
///         let dec = set;
///         (
///             move || { inc.update(|s| json!({ "count": s["count"].as_i64().unwrap() + 1 })); },
///             move || { dec.update(|s| json!({ "count": s["count"].as_i64().unwrap() - 1 })); },
///             move || get.get()["count"].as_i64().unwrap(),
///         )
///     },
///     StoreOptions::default(),
/// );
///
/// let (increment, decrement, count) = store.actions();
/// increment();
/// increment();
/// decrement();
/// assert_eq!(count(), 1);
/// ```
pub fn create_store<S, A, F>(initial: S, define_actions: F, options: StoreOptions<S>) -> Store<S, A>
where
    S: Merge,
    F: FnOnce(Setter<S>, Getter<S>) -> A,
{
    let state = initial.clone();
    let store = build_store(state, initial, define_actions, options);
    store.finish_load();
    store
}

/// Build a store whose starting state may differ from the value `reset`
/// restores. `Load` has not fired yet when this returns.
pub(crate) fn build_store<S, A, F>(
    state: S,
    initial: S,
    define_actions: F,
    options: StoreOptions<S>,
) -> Store<S, A>
where
    S: Merge,
    F: FnOnce(Setter<S>, Getter<S>) -> A,
{
    let StoreOptions {
        on_load,
        on_attach,
        on_detach,
        on_state_change,
        reset_on_detach,
    } = options;

    let inner = Rc::new(StoreInner::new(state, initial, reset_on_detach));
    let sugar = [
        (StoreEvent::Load, on_load),
        (StoreEvent::Attach, on_attach),
        (StoreEvent::Detach, on_detach),
        (StoreEvent::Change, on_state_change),
    ];
    for (event, handler) in sugar {
        if let Some(handler) = handler {
            inner.events.add(event, handler);
        }
    }

    let actions = define_actions(
        Setter {
            inner: Rc::clone(&inner),
            silent: false,
        },
        Getter {
            inner: Rc::clone(&inner),
        },
    );

    Store {
        inner,
        actions: Rc::new(actions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq)]
    struct AppState {
        count: usize,
        name: String,
    }

    #[derive(Default)]
    struct AppPatch {
        count: Option<usize>,
        name: Option<String>,
    }

    impl Merge for AppState {
        type Patch = AppPatch;

        fn merge(&mut self, patch: AppPatch) {
            if let Some(count) = patch.count {
                self.count = count;
            }
            if let Some(name) = patch.name {
                self.name = name;
            }
        }
    }

    fn app_store() -> Store<AppState> {
        Store::new(AppState {
            count: 0,
            name: "test".to_string(),
        })
    }

    fn counter(state: &Value) -> i64 {
        state["count"].as_i64().unwrap_or_default()
    }

    #[test]
    fn store_get_set() {
        let store = app_store();
        assert_eq!(store.get().count, 0);

        let next = store.set(AppPatch {
            count: Some(42),
            ..Default::default()
        });

        assert_eq!(next.count, 42);
        assert_eq!(store.get().count, 42);
        assert_eq!(store.get().name, "test");
    }

    #[test]
    fn store_update() {
        let store = app_store();
        store.update(|state| AppPatch {
            count: Some(state.count + 10),
            ..Default::default()
        });
        assert_eq!(store.get().count, 10);
        assert_eq!(store.read(|s| s.name.len()), 4);
    }

    #[test]
    fn store_reset_restores_initial() {
        let store = app_store();
        for i in 1..5 {
            store.set(AppPatch {
                count: Some(i),
                name: Some(format!("n{i}")),
            });
        }
        let reset = store.reset();
        assert_eq!(
            reset,
            AppState {
                count: 0,
                name: "test".to_string()
            }
        );
    }

    #[test]
    fn store_subscribe() {
        let store = app_store();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        let _sub = store.subscribe(move || calls_clone.set(calls_clone.get() + 1));
        assert_eq!(calls.get(), 0);

        store.set(AppPatch::default());
        assert_eq!(calls.get(), 1);

        store.update(|state| AppPatch {
            count: Some(state.count + 1),
            ..Default::default()
        });
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn subscribe_then_unsubscribe_never_calls() {
        let store = app_store();
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        store
            .subscribe(move || calls_clone.set(calls_clone.get() + 1))
            .unsubscribe();
        store.set(AppPatch::default());

        assert_eq!(calls.get(), 0);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let store = Store::new(json!({ "count": 0 }));
        let log = Rc::new(RefCell::new(Vec::new()));

        let subs: Vec<_> = (0..3)
            .map(|i| {
                let log = log.clone();
                store.subscribe(move || log.borrow_mut().push(i))
            })
            .collect();

        store.set(json!({ "count": 1 }));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        drop(subs);
    }

    #[test]
    fn attach_and_detach_fire_on_transitions_only() {
        let store = Store::new(json!({}));
        let log = Rc::new(RefCell::new(Vec::new()));
        for event in [StoreEvent::Attach, StoreEvent::Detach] {
            let log = log.clone();
            store.add_event_listener(event, move |_, _| log.borrow_mut().push(event));
        }

        let a = store.subscribe(|| {});
        let b = store.subscribe(|| {});
        let c = store.subscribe(|| {});
        assert_eq!(*log.borrow(), vec![StoreEvent::Attach]);

        a.unsubscribe();
        drop(b);
        assert_eq!(*log.borrow(), vec![StoreEvent::Attach]);

        c.unsubscribe();
        assert_eq!(*log.borrow(), vec![StoreEvent::Attach, StoreEvent::Detach]);
    }

    #[test]
    fn attach_fires_before_listener_is_added() {
        let store = Store::new(json!({}));
        let seen = Rc::new(Cell::new(usize::MAX));
        let probe = store.clone();
        let seen_clone = seen.clone();
        store.add_event_listener(StoreEvent::Attach, move |_, _| {
            seen_clone.set(probe.listener_count())
        });

        let _sub = store.subscribe(|| {});
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn change_fires_before_listeners() {
        let store = Store::new(json!({ "count": 0 }));
        let log = Rc::new(RefCell::new(Vec::new()));

        let change_log = log.clone();
        store.add_event_listener(StoreEvent::Change, move |state, _| {
            change_log.borrow_mut().push(format!("change:{}", state["count"]))
        });
        let listener_log = log.clone();
        let _sub = store.subscribe(move || listener_log.borrow_mut().push("listener".into()));

        store.set(json!({ "count": 7 }));
        assert_eq!(*log.borrow(), vec!["change:7".to_string(), "listener".to_string()]);
    }

    #[test]
    fn commit_hooks_see_every_change_adjustment() {
        let store = Store::new(json!({ "count": 0, "doubled": 0 }));
        let log = Rc::new(RefCell::new(Vec::new()));

        let hook_log = log.clone();
        store.on_commit(move |state| hook_log.borrow_mut().push(state["doubled"].to_string()));
        // Registered after the hook, still runs before it.
        store.add_event_listener(StoreEvent::Change, |state: &Value, set: &Setter<Value>| {
            set.set(json!({ "doubled": counter(state) * 2 }));
        });
        let listener_log = log.clone();
        let _sub = store.subscribe(move || listener_log.borrow_mut().push("listener".into()));

        store.set(json!({ "count": 3 }));
        assert_eq!(*log.borrow(), vec!["6".to_string(), "listener".to_string()]);
    }

    #[test]
    fn change_handler_setter_is_silent() {
        let changes = Rc::new(Cell::new(0));
        let changes_clone = changes.clone();
        let store = create_store(
            json!({ "count": 0, "doubled": 0 }),
            |_, _| (),
            StoreOptions::new().on_state_change(move |state: &Value, set: &Setter<Value>| {
                changes_clone.set(changes_clone.get() + 1);
                assert!(set.is_silent());
                set.set(json!({ "doubled": counter(state) * 2 }));
            }),
        );

        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();
        let probe = store.clone();
        let _sub = store.subscribe(move || seen_clone.borrow_mut().push(probe.get()));

        let returned = store.set(json!({ "count": 3 }));

        assert_eq!(changes.get(), 1);
        assert_eq!(returned, json!({ "count": 3, "doubled": 6 }));
        assert_eq!(*seen.borrow(), vec![json!({ "count": 3, "doubled": 6 })]);
    }

    #[test]
    fn try_update_error_leaves_state_uncommitted() {
        let store = Store::new(json!({ "count": 1 }));
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _sub = store.subscribe(move || calls_clone.set(calls_clone.get() + 1));

        let result: Result<Value, &str> = store.try_update(|_| Err("boom"));
        assert_eq!(result, Err("boom"));
        assert_eq!(store.get(), json!({ "count": 1 }));
        assert_eq!(calls.get(), 0);

        let result: Result<Value, &str> =
            store.try_update(|s| Ok(json!({ "count": counter(s) + 1 })));
        assert_eq!(result, Ok(json!({ "count": 2 })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn panicking_modifier_commits_nothing() {
        let store = Store::new(json!({ "count": 1 }));
        let handle = store.clone();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            handle.update(|_| panic!("modifier failed"));
        }));
        assert!(outcome.is_err());
        assert_eq!(store.get(), json!({ "count": 1 }));

        store.set(json!({ "count": 2 }));
        assert_eq!(store.get(), json!({ "count": 2 }));
    }

    #[test]
    fn unsubscribing_during_dispatch_skips_listener() {
        let store = Store::new(json!({ "count": 0 }));
        let later_calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot_clone = slot.clone();
        let _first = store.subscribe(move || {
            if let Some(sub) = slot_clone.borrow_mut().take() {
                sub.unsubscribe();
            }
        });
        let later_clone = later_calls.clone();
        *slot.borrow_mut() = Some(store.subscribe(move || later_clone.set(later_clone.get() + 1)));

        store.set(json!({ "count": 1 }));
        store.set(json!({ "count": 2 }));
        assert_eq!(later_calls.get(), 0);
    }

    #[test]
    fn listener_added_during_dispatch_waits_for_next_commit() {
        let store = Store::new(json!({ "count": 0 }));
        let added_calls = Rc::new(Cell::new(0));
        let held: Rc<RefCell<Vec<Subscription>>> = Rc::new(RefCell::new(Vec::new()));

        let probe = store.clone();
        let added_clone = added_calls.clone();
        let held_clone = held.clone();
        let _first = store.subscribe(move || {
            if held_clone.borrow().is_empty() {
                let added = added_clone.clone();
                let sub = probe.subscribe(move || added.set(added.get() + 1));
                held_clone.borrow_mut().push(sub);
            }
        });

        store.set(json!({ "count": 1 }));
        assert_eq!(added_calls.get(), 0);
        store.set(json!({ "count": 2 }));
        assert_eq!(added_calls.get(), 1);
    }

    #[test]
    fn reset_on_detach() {
        let store = create_store(
            json!({ "count": 0 }),
            |_, _| (),
            StoreOptions::new().reset_on_detach(true),
        );
        let sub = store.subscribe(|| {});
        store.set(json!({ "count": 5 }));
        assert_eq!(counter(&store.get()), 5);

        drop(sub);
        assert_eq!(store.get(), json!({ "count": 0 }));
    }

    #[test]
    fn load_fires_once_after_actions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let load_log = log.clone();
        let action_log = log.clone();

        let store = create_store(
            json!({ "count": 0 }),
            move |_, _| action_log.borrow_mut().push("actions"),
            StoreOptions::new().on_load(move |_: &Value, _: &Setter<Value>| {
                load_log.borrow_mut().push("load")
            }),
        );

        store.set(json!({ "count": 1 }));
        let _sub = store.subscribe(|| {});
        assert_eq!(*log.borrow(), vec!["actions", "load"]);
    }

    #[test]
    fn on_load_may_set_state() {
        let store = create_store(
            json!({ "ready": false }),
            |_, _| (),
            StoreOptions::new().on_load(|_: &Value, set: &Setter<Value>| {
                set.set(json!({ "ready": true }));
            }),
        );
        assert_eq!(store.get(), json!({ "ready": true }));
        assert_eq!(store.reset(), json!({ "ready": false }));
    }

    #[test]
    fn removed_event_listener_is_not_called() {
        let store = Store::new(json!({ "count": 0 }));
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let id = store.add_event_listener(StoreEvent::Change, move |_, _| {
            calls_clone.set(calls_clone.get() + 1)
        });

        store.set(json!({ "count": 1 }));
        assert!(store.remove_event_listener(StoreEvent::Change, id));
        assert!(!store.remove_event_listener(StoreEvent::Change, id));
        store.set(json!({ "count": 2 }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn actions_use_set_and_get() {
        struct Counter {
            increment: Box<dyn Fn() -> Value>,
            current: Box<dyn Fn() -> i64>,
        }

        let store = Store::with_actions(json!({ "count": 0 }), |set, get| Counter {
            increment: Box::new(move || set.update(|s| json!({ "count": counter(s) + 1 }))),
            current: Box::new(move || counter(&get.get())),
        });

        (store.actions().increment)();
        (store.actions().increment)();
        assert_eq!((store.actions().current)(), 2);
        assert_eq!(counter(&store.get()), 2);
    }

    #[test]
    fn subscription_outliving_store_is_harmless() {
        let store = Store::new(json!({}));
        let sub = store.subscribe(|| {});
        drop(store);
        sub.unsubscribe();
    }

    #[test]
    fn forgotten_subscription_stays_registered() {
        let store = Store::new(json!({}));
        store.subscribe(|| {}).forget();
        assert_eq!(store.listener_count(), 1);
    }
}
