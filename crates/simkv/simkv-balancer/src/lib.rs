//! The load balancer: the process standing between the single generated
//! request stream and each worker's private queue. It owns the
//! [`DispatchPolicy`](simkv_dispatch::DispatchPolicy) decision, turns
//! worker pull-feedback into dispatch-tracking and dynamic-CREW release
//! notifications, and retries whatever the policy refused (JBSQ(D) past
//! depth) as soon as feedback frees a slot.
//!
//! Grounded on the reference engine's `load_balancer.py`, which runs this
//! same split: a dispatch loop pulling the shared input, and a feedback
//! loop draining worker acks, with a single pending-request slot bridging
//! the two when the policy says "not yet".

use std::cell::RefCell;
use std::rc::Rc;

use simkv_dispatch::{bucket_for, DispatchPolicy, WriteClass};
use simkv_kernel::{Channel, Env};
use simkv_metrics::BalancerStats;
use simkv_workload::{PipelineItem, PullFeedback, Request};

struct BalancerState {
    input: Channel<PipelineItem>,
    worker_inputs: Vec<Channel<PipelineItem>>,
    pull_q: Channel<PullFeedback>,
    dispatch: RefCell<DispatchPolicy>,
    num_buckets: usize,
    pending: RefCell<Option<Request>>,
    stats: Rc<RefCell<BalancerStats>>,
}

/// Spawn the balancer's two cooperating loops: dispatch (drains `input`,
/// refusing to pull further once a request is blocked) and feedback
/// (drains `pull_q`, then retries whatever is blocked).
pub fn spawn_balancer(
    env: &Env,
    input: Channel<PipelineItem>,
    worker_inputs: Vec<Channel<PipelineItem>>,
    pull_q: Channel<PullFeedback>,
    dispatch: DispatchPolicy,
    num_buckets: usize,
    stats: Rc<RefCell<BalancerStats>>,
) {
    let state = Rc::new(BalancerState {
        input,
        worker_inputs,
        pull_q,
        dispatch: RefCell::new(dispatch),
        num_buckets,
        pending: RefCell::new(None),
        stats,
    });
    dispatch_loop(state.clone(), env);
    feedback_loop(state, env);
}

fn dispatch_loop(state: Rc<BalancerState>, env: &Env) {
    if state.pending.borrow().is_some() {
        // A refused request is blocking the head of line; wait for
        // feedback to retry it instead of pulling anything further, or
        // FIFO ordering across the shared stream would be lost.
        return;
    }
    let input = state.input.clone();
    input.get(env).add_callback(env, move |env, item| {
        match item {
            PipelineItem::EndOfMeasurements => {
                // Only one worker needs to observe the sentinel; every
                // worker shares the same "still measuring" flag.
                state.worker_inputs[0].put(env, PipelineItem::EndOfMeasurements);
            }
            PipelineItem::Request(req) => {
                try_dispatch_or_block(&state, env, req);
            }
        }
        dispatch_loop(state, env);
    });
}

fn try_dispatch_or_block(state: &Rc<BalancerState>, env: &Env, req: Request) {
    let write_class = state.dispatch.borrow().classify_write(req.key);
    let chosen = state.dispatch.borrow_mut().select(req.id, req.key, req.write);
    match chosen {
        Some(q) => dispatch_to(state, env, req, q, write_class),
        None => {
            *state.pending.borrow_mut() = Some(req);
        }
    }
}

fn dispatch_to(
    state: &Rc<BalancerState>,
    env: &Env,
    mut req: Request,
    q: usize,
    write_class: WriteClass,
) {
    req.dispatch_time = Some(env.now());
    if req.write {
        let mut stats = state.stats.borrow_mut();
        match write_class {
            WriteClass::Balanced => stats.balanced_writes += 1,
            WriteClass::Exclusive => stats.exclusive_writes += 1,
        }
    }
    state.worker_inputs[q].put(env, PipelineItem::Request(req));
}

fn feedback_loop(state: Rc<BalancerState>, env: &Env) {
    let pull_q = state.pull_q.clone();
    pull_q.get(env).add_callback(env, move |env, feedback| {
        on_feedback(&state, env, feedback);
        retry_pending(&state, env);
        feedback_loop(state, env);
    });
}

fn on_feedback(state: &Rc<BalancerState>, _env: &Env, feedback: PullFeedback) {
    let req = feedback.request;
    let bucket = bucket_for(req.key, state.num_buckets);
    let mut dispatch = state.dispatch.borrow_mut();
    dispatch.func_executed(feedback.worker_id);
    if req.write {
        dispatch.write_req_finished(bucket);
    }
}

fn retry_pending(state: &Rc<BalancerState>, env: &Env) {
    let Some(req) = state.pending.borrow_mut().take() else {
        return;
    };
    let write_class = state.dispatch.borrow().classify_write(req.key);
    let chosen = state.dispatch.borrow_mut().select(req.id, req.key, req.write);
    match chosen {
        Some(q) => {
            dispatch_to(state, env, req, q, write_class);
            dispatch_loop(state.clone(), env);
        }
        None => {
            *state.pending.borrow_mut() = Some(req);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use simkv_workload::Request;

    use super::*;

    #[test]
    fn erew_forwards_every_request_to_its_hashed_worker() {
        let env = Env::new();
        let input: Channel<PipelineItem> = Channel::new(0);
        let worker_inputs: Vec<Channel<PipelineItem>> =
            (0..4).map(|_| Channel::new(0)).collect();
        let pull_q: Channel<PullFeedback> = Channel::new(0);
        let stats = Rc::new(RefCell::new(BalancerStats::default()));
        spawn_balancer(
            &env,
            input.clone(),
            worker_inputs.clone(),
            pull_q,
            DispatchPolicy::erew(4, 16),
            16,
            stats,
        );
        input.put(&env, PipelineItem::Request(Request::new(1, 5, false, 0)));
        env.run_until(100);
        let total: usize = worker_inputs.iter().map(|w| w.len()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn jbsq_blocked_request_is_retried_after_feedback() {
        let env = Env::new();
        let input: Channel<PipelineItem> = Channel::new(0);
        let worker_inputs: Vec<Channel<PipelineItem>> = vec![Channel::new(0)];
        let pull_q: Channel<PullFeedback> = Channel::new(0);
        let stats = Rc::new(RefCell::new(BalancerStats::default()));
        spawn_balancer(
            &env,
            input.clone(),
            worker_inputs.clone(),
            pull_q.clone(),
            DispatchPolicy::jbsq_crew(1, 16, 1),
            16,
            stats,
        );
        input.put(&env, PipelineItem::Request(Request::new(1, 1, false, 0)));
        input.put(&env, PipelineItem::Request(Request::new(2, 2, false, 0)));
        env.run_until(10);
        assert_eq!(worker_inputs[0].len(), 1, "second read should be refused and held");

        pull_q.put(
            &env,
            PullFeedback {
                worker_id: 0,
                request: Request::new(1, 1, false, 0),
            },
        );
        env.run_until(20);
        assert_eq!(worker_inputs[0].len(), 2, "feedback should free the slot for the retry");
    }
}
