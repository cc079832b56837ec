use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Shared listener callback. Identity (the `Rc` allocation) makes
/// subscription idempotent.
pub type Listener<T> = Rc<dyn Fn(&T)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publisher for a single value-carrying event type.
pub struct Event<T> {
    listeners: RefCell<Vec<(SubscriptionId, Listener<T>)>>,
    next_id: Cell<u64>,
}

impl<T> Event<T> {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register `listener`. Subscribing the same `Rc` again returns its existing id.
    pub fn subscribe(&self, listener: Listener<T>) -> SubscriptionId {
        let mut listeners = self.listeners.borrow_mut();
        if let Some((id, _)) = listeners.iter().find(|(_, l)| Rc::ptr_eq(l, &listener)) {
            return *id;
        }
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        listeners.push((id, listener));
        id
    }

    /// Convenience for one-off closures.
    pub fn subscribe_fn(&self, f: impl Fn(&T) + 'static) -> SubscriptionId {
        self.subscribe(Rc::new(f))
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Run every current listener with `value`.
    ///
    /// Listeners added or removed during emission take effect next time.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dirty flag driven by an event: every emission bumps a version counter.
///
/// Stays subscribed until [`RenderTrigger::detach`] is called.
pub struct RenderTrigger {
    version: Rc<Cell<u64>>,
    seen: u64,
    subscription: Option<SubscriptionId>,
}

impl RenderTrigger {
    pub fn attach<T: 'static>(event: &Event<T>) -> Self {
        let version = Rc::new(Cell::new(0u64));
        let counter = Rc::clone(&version);
        let listener: Listener<T> = Rc::new(move |_: &T| counter.set(counter.get() + 1));
        let subscription = event.subscribe(listener);
        Self {
            version,
            seen: 0,
            subscription: Some(subscription),
        }
    }

    /// Emissions observed so far.
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// True once after any number of emissions since the last call.
    pub fn take_dirty(&mut self) -> bool {
        let current = self.version.get();
        if current == self.seen {
            return false;
        }
        self.seen = current;
        true
    }

    pub fn detach<T>(&mut self, event: &Event<T>) -> bool {
        match self.subscription.take() {
            Some(id) => event.unsubscribe(id),
            None => false,
        }
    }
}
