use std::cell::RefCell;
use std::rc::Rc;

use crate::env::Env;

/// A future-like, one-shot event.
///
/// `succeed` fires every registered callback exactly once, in the order
/// they were attached (FIFO), and is idempotent: calling it twice on an
/// already-fired event is a no-op. Cloning an `Event` is cheap and yields
/// a handle to the same underlying slot — this is how a single wake (e.g.
/// a bucket transitioning to even) can notify many waiters.
pub struct Event<T: Clone + 'static> {
    inner: Rc<RefCell<Inner<T>>>,
}

struct Inner<T> {
    value: Option<T>,
    callbacks: Vec<Box<dyn FnOnce(&Env, T)>>,
}

impl<T: Clone + 'static> Event<T> {
    pub fn new() -> Self {
        Event {
            inner: Rc::new(RefCell::new(Inner {
                value: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// An event that has already fired with `value`.
    pub fn fired(value: T) -> Self {
        let ev = Self::new();
        ev.inner.borrow_mut().value = Some(value);
        ev
    }

    pub fn is_fired(&self) -> bool {
        self.inner.borrow().value.is_some()
    }

    /// Fire the event, draining callbacks in attachment order. No-op if
    /// already fired.
    pub fn succeed(&self, env: &Env, value: T) {
        let callbacks = {
            let mut inner = self.inner.borrow_mut();
            if inner.value.is_some() {
                return;
            }
            inner.value = Some(value.clone());
            std::mem::take(&mut inner.callbacks)
        };
        for cb in callbacks {
            cb(env, value.clone());
        }
    }

    /// Attach a callback. If the event already fired, the callback runs
    /// immediately (SimPy instead re-schedules immediately-ready callbacks
    /// onto the next scheduler step; since we call this only from within
    /// process bodies that are themselves running on the heap, invoking it
    /// inline here keeps ordering simple and matches the "already ready"
    /// fast path of a `get()` against a non-empty store).
    pub fn add_callback(&self, env: &Env, cb: impl FnOnce(&Env, T) + 'static) {
        let mut inner = self.inner.borrow_mut();
        let already_fired = inner.value.clone();
        match already_fired {
            Some(v) => {
                drop(inner);
                cb(env, v);
            }
            None => {
                inner.callbacks.push(Box::new(cb));
            }
        }
    }
}

impl<T: Clone + 'static> Clone for Event<T> {
    fn clone(&self) -> Self {
        Event {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}
