//! Synchronous event delivery to a dynamic set of listeners.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::{Rc, Weak},
};

use super::EventListener;

/// Event handler stored in an [`EventEmitter`].
type Listener<E> = Rc<dyn Fn(&E)>;

/// Delivers events to every subscribed listener in emission order.
///
/// Listeners may freely emit new events, subscribe or unsubscribe while being
/// called: events emitted from inside a listener are queued and delivered
/// once the current event has reached every listener.
pub struct EventEmitter<E> {
    listeners: RefCell<Vec<(u64, Listener<E>)>>,
    next_id: Cell<u64>,
    pending: RefCell<VecDeque<E>>,
    emitting: Cell<bool>,
}

impl<E: 'static> EventEmitter<E> {
    /// Creates a new [`EventEmitter`] without listeners.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            emitting: Cell::new(false),
        })
    }

    /// Subscribes the provided `listener` to all further events.
    ///
    /// Subscription lasts until the returned [`EventListener`] is dropped.
    pub fn subscribe<F>(self: &Rc<Self>, listener: F) -> EventListener
    where
        F: Fn(&E) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));

        let this = Rc::downgrade(self);
        EventListener::new("endpoint_event", move || {
            if let Some(this) = Weak::upgrade(&this) {
                this.listeners.borrow_mut().retain(|(i, _)| *i != id);
            }
        })
    }

    /// Emits the provided `event` to all the subscribed listeners.
    pub fn emit(&self, event: E) {
        self.pending.borrow_mut().push_back(event);
        if self.emitting.replace(true) {
            return;
        }

        loop {
            let next = self.pending.borrow_mut().pop_front();
            let event = match next {
                Some(event) => event,
                None => break,
            };
            let listeners: Vec<_> = self
                .listeners
                .borrow()
                .iter()
                .map(|(_, l)| Rc::clone(l))
                .collect();
            for listener in listeners {
                (listener)(&event);
            }
        }

        self.emitting.set(false);
    }

    /// Returns count of the currently subscribed listeners.
    #[must_use]
    pub fn listeners_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}
