use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::env::Env;
use crate::event::Event;

struct Inner<T: Clone + 'static> {
    queue: VecDeque<T>,
    waiters: VecDeque<Event<T>>,
}

/// An unbounded FIFO queue. `put` completes the oldest pending `get` (if
/// any) in arrival order; otherwise the value sits in `queue` until a
/// `get` claims it.
pub struct Store<T: Clone + 'static> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: Clone + 'static> Store<T> {
    pub fn new() -> Self {
        Store {
            inner: Rc::new(RefCell::new(Inner {
                queue: VecDeque::new(),
                waiters: VecDeque::new(),
            })),
        }
    }

    pub fn put(&self, env: &Env, value: T) {
        let waiter = self.inner.borrow_mut().waiters.pop_front();
        match waiter {
            Some(ev) => ev.succeed(env, value),
            None => self.inner.borrow_mut().queue.push_back(value),
        }
    }

    /// Returns an event that fires with the next value, immediately if one
    /// is already queued.
    pub fn get(&self, env: &Env) -> Event<T> {
        let popped = self.inner.borrow_mut().queue.pop_front();
        match popped {
            Some(v) => Event::fired(v),
            None => {
                let ev = Event::new();
                self.inner.borrow_mut().waiters.push_back(ev.clone());
                ev
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-destructively check whether any currently-queued item matches
    /// `pred`. Used by write-batching to detect "another write to this key
    /// is already observable in the input channel".
    pub fn any_queued(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.inner.borrow().queue.iter().any(pred)
    }
}

impl<T: Clone + 'static> Clone for Store<T> {
    fn clone(&self) -> Self {
        Store {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Store`] wrapped with a fixed propagation delay: `put` schedules the
/// underlying store's `put` to fire `delay` virtual-time units later, while
/// `get` delegates straight through. This is the channel abstraction used
/// for every queue that crosses a "wire" in the simulated system (input
/// stream, per-core dispatch queues, pull-feedback queue).
pub struct Channel<T: Clone + 'static> {
    store: Store<T>,
    delay: u64,
}

impl<T: Clone + 'static> Channel<T> {
    pub fn new(delay: u64) -> Self {
        Channel {
            store: Store::new(),
            delay,
        }
    }

    pub fn put(&self, env: &Env, value: T) {
        let store = self.store.clone();
        let delay = self.delay;
        env.schedule_at(env.now() + delay, move |env| {
            store.put(env, value);
        });
    }

    pub fn get(&self, env: &Env) -> Event<T> {
        self.store.get(env)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn any_queued(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.store.any_queued(pred)
    }
}

impl<T: Clone + 'static> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            store: self.store.clone(),
            delay: self.delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_get_before_put() {
        let env = Env::new();
        let store: Store<u32> = Store::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..3 {
            let seen = seen.clone();
            store.get(&env).add_callback(&env, move |_, v| {
                seen.borrow_mut().push(v);
            });
        }
        store.put(&env, 1);
        store.put(&env, 2);
        store.put(&env, 3);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn channel_delays_delivery() {
        let env = Env::new();
        let chan: Channel<u32> = Channel::new(50);
        chan.put(&env, 7);
        let seen = Rc::new(RefCell::new(None));
        let seen2 = seen.clone();
        chan.get(&env).add_callback(&env, move |env, v| {
            *seen2.borrow_mut() = Some((env.now(), v));
        });
        env.run();
        assert_eq!(*seen.borrow(), Some((50, 7)));
    }

    #[test]
    fn timeout_orders_same_tick_by_schedule_order() {
        let env = Env::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            env.timeout(10).add_callback(&env, move |_, _| {
                order.borrow_mut().push(i);
            });
        }
        env.run();
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);
    }
}
