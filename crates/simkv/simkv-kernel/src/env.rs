use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::event::Event;

struct Scheduled {
    time: u64,
    seq: u64,
    action: Box<dyn FnOnce(&Env)>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so the heap pops the smallest (time, seq) first.
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

struct Inner {
    now: Cell<u64>,
    seq: Cell<u64>,
    heap: RefCell<BinaryHeap<Scheduled>>,
}

/// The simulation environment: owns the virtual clock and the event heap.
///
/// `Env` is cheap to clone (it's an `Rc` handle) so every process closure
/// can carry its own copy without lifetime gymnastics.
#[derive(Clone)]
pub struct Env {
    inner: Rc<Inner>,
}

impl Env {
    pub fn new() -> Self {
        Env {
            inner: Rc::new(Inner {
                now: Cell::new(0),
                seq: Cell::new(0),
                heap: RefCell::new(BinaryHeap::new()),
            }),
        }
    }

    #[inline]
    pub fn now(&self) -> u64 {
        self.inner.now.get()
    }

    /// Schedule `action` to run at `time` (which must be `>= now()`).
    /// Actions scheduled for the same `time` run in scheduling order.
    pub fn schedule_at(&self, time: u64, action: impl FnOnce(&Env) + 'static) {
        debug_assert!(time >= self.now(), "cannot schedule an event in the past");
        let seq = self.inner.seq.get();
        self.inner.seq.set(seq + 1);
        self.inner.heap.borrow_mut().push(Scheduled {
            time,
            seq,
            action: Box::new(action),
        });
    }

    /// An event that fires once `delay` virtual-time units from now.
    pub fn timeout(&self, delay: u64) -> Event<()> {
        let ev = Event::new();
        let ev_for_cb = ev.clone();
        self.schedule_at(self.now() + delay, move |env| {
            ev_for_cb.succeed(env, ());
        });
        ev
    }

    /// Run the scheduler until the event heap is empty.
    pub fn run(&self) {
        loop {
            let next = self.inner.heap.borrow_mut().pop();
            match next {
                Some(scheduled) => {
                    self.inner.now.set(scheduled.time);
                    (scheduled.action)(self);
                }
                None => break,
            }
        }
    }

    /// Run until the heap is empty or `now` would exceed `until`, whichever
    /// comes first. Used by callers that want a hard virtual-time ceiling
    /// (not required by the base kernel contract, but convenient for tests).
    pub fn run_until(&self, until: u64) {
        loop {
            let should_pop = matches!(self.inner.heap.borrow().peek(), Some(s) if s.time <= until);
            if !should_pop {
                break;
            }
            let scheduled = self.inner.heap.borrow_mut().pop().unwrap();
            self.inner.now.set(scheduled.time);
            (scheduled.action)(self);
        }
    }

    pub fn pending_events(&self) -> usize {
        self.inner.heap.borrow().len()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}
