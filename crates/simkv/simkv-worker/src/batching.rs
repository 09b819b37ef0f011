//! Write compaction: collapse writes to the same key that arrive close
//! together into a single index update, while still recording one latency
//! sample per absorbed request.
//!
//! This is a deliberately simplified stand-in for the batch/close-batch
//! state machine the reference engine builds around an open batch window
//! per key; the property it preserves is the one the testable properties
//! actually ask for — every absorbed request still completes and is still
//! measured — without reproducing the original's per-batch retry and
//! partial-flush bookkeeping.

use std::cell::RefCell;
use std::rc::Rc;

use simkv_icc::is_odd;
use simkv_kernel::Env;
use simkv_workload::Request;

use crate::worker::{finish_request, next_service, queue_bindex, WorkerState};

pub(crate) fn absorb_write(
    state: Rc<RefCell<WorkerState>>,
    env: &Env,
    req: Request,
    bucket: usize,
) {
    let key = req.key;
    let already_open = state.borrow().batch_map.contains_key(&key);
    state
        .borrow_mut()
        .batch_map
        .entry(key)
        .or_default()
        .push(req);

    if already_open {
        return;
    }

    let deadline = {
        let s = state.borrow();
        env.now() + s.compaction_time * s.batch_window_factor.max(1)
    };
    state.borrow_mut().batch_deadline.insert(key, deadline);
    env.schedule_at(deadline, move |env| {
        close_batch(state, env, bucket, key);
    });
}

fn close_batch(state: Rc<RefCell<WorkerState>>, env: &Env, bucket: usize, key: u64) {
    let batch = {
        let mut s = state.borrow_mut();
        s.batch_deadline.remove(&key);
        s.batch_map.remove(&key)
    };
    let mut batch = match batch {
        Some(b) if !b.is_empty() => b,
        _ => return,
    };
    let compacted = batch.len() > 1;
    *state
        .borrow()
        .balancer_stats
        .borrow_mut()
        .batch_size_histogram
        .entry(batch.len() as u32)
        .or_insert(0) += 1;
    let bindex = queue_bindex(&state);
    let index_update_delay = state.borrow().index_update_delay;

    let bindex_odd = bindex.clone();
    env.schedule_at(env.now() + index_update_delay, move |env| {
        bindex_odd.increment(env, bucket); // mark odd: the batch owns the bucket
    });

    let representative = batch.remove(0);
    let rest = batch;
    let service = next_service(&state);
    env.timeout(service).add_callback(env, move |env, _| {
        debug_assert!(
            is_odd(bindex.get_version(bucket)),
            "batch's own odd-mark bump should have already fired by the time its service time elapses"
        );
        env.schedule_at(env.now() + index_update_delay, move |env| {
            bindex.increment(env, bucket); // mark even: batch now visible
        });
        let now = env.now();
        for mut absorbed in rest {
            absorbed.end_proc_time = Some(now);
            finish_request(state.clone(), env, absorbed, true);
        }
        let mut representative = representative;
        representative.end_proc_time = Some(now);
        finish_request(state, env, representative, compacted);
    });
}
