//! Single-threaded, cooperative discrete-event kernel.
//!
//! This mirrors the scheduling model a SimPy-style environment gives you:
//! a monotonic virtual clock, one-shot idempotent [`Event`]s with FIFO
//! callback delivery, [`Store`]/[`Channel`] FIFO queues, and an [`Env`] that
//! owns a min-heap of pending actions keyed by `(fire_time, sequence)`.
//!
//! There is no real concurrency here — everything runs on the caller's
//! thread, and "suspension" is modelled as a process re-entering itself
//! through a callback registered on whichever event it is waiting on
//! (continuation-passing style), not an OS thread or an async task.

mod env;
mod event;
mod store;

pub use env::Env;
pub use event::Event;
pub use store::{Channel, Store};
