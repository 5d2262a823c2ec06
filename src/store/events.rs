use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::Setter;

/// Lifecycle events emitted by a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    /// Fired once, at the end of store construction.
    Load,
    /// Fired when the first listener subscribes.
    Attach,
    /// Fired when the last listener unsubscribes.
    Detach,
    /// Fired on every commit, before plain listeners run.
    Change,
}

impl fmt::Display for StoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreEvent::Load => "load",
            StoreEvent::Attach => "attach",
            StoreEvent::Detach => "detach",
            StoreEvent::Change => "change",
        };
        f.write_str(name)
    }
}

/// Identifies a handler registered with `add_event_listener`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub(crate) type Handler<S> = Rc<dyn Fn(&S, &Setter<S>)>;

/// Handler lists keyed by event.
pub(crate) struct EventBus<S> {
    handlers: RefCell<HashMap<StoreEvent, Vec<(HandlerId, Handler<S>)>>>,
    next_id: Cell<u64>,
}

impl<S> EventBus<S> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    pub(crate) fn add(&self, event: StoreEvent, handler: Handler<S>) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.handlers
            .borrow_mut()
            .entry(event)
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, event: StoreEvent, id: HandlerId) -> bool {
        let mut handlers = self.handlers.borrow_mut();
        match handlers.get_mut(&event) {
            Some(list) => {
                let before = list.len();
                list.retain(|(handler_id, _)| *handler_id != id);
                list.len() != before
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, event: StoreEvent, id: HandlerId) -> bool {
        self.handlers
            .borrow()
            .get(&event)
            .is_some_and(|list| list.iter().any(|(handler_id, _)| *handler_id == id))
    }

    /// Copy of the handler list, so handlers may (un)register while it is walked.
    pub(crate) fn snapshot(&self, event: StoreEvent) -> Vec<(HandlerId, Handler<S>)> {
        self.handlers
            .borrow()
            .get(&event)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, event: StoreEvent) -> usize {
        self.handlers.borrow().get(&event).map_or(0, Vec::len)
    }
}
