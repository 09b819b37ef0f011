use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use simkv_gen::ServiceTimeGenerator;
use simkv_icc::{BucketedIndex, is_odd};
use simkv_kernel::{Channel, Env};
use simkv_metrics::{BalancerStats, LatencyStore};
use simkv_workload::{PipelineItem, PullFeedback, Request};

use crate::multiversion::MultiversionState;
use crate::PolicyKind;

pub struct WorkerConfig {
    pub id: usize,
    pub policy_kind: PolicyKind,
    pub use_compaction: bool,
    pub compaction_time: u64,
    pub batch_window_factor: u64,
    pub index_update_delay: u64,
    pub fixed_overhead: u64,
    pub instability_threshold: u64,
    pub is_master: bool,
}

pub(crate) struct WorkerState {
    pub(crate) id: usize,
    pub(crate) in_q: Channel<PipelineItem>,
    pub(crate) pull_q: Channel<PullFeedback>,
    pub(crate) bindex: Rc<BucketedIndex>,
    serv_gen: Box<dyn ServiceTimeGenerator>,
    policy_kind: PolicyKind,
    pub(crate) use_compaction: bool,
    pub(crate) compaction_time: u64,
    pub(crate) batch_window_factor: u64,
    pub(crate) index_update_delay: u64,
    fixed_overhead: u64,
    instability_threshold: u64,
    is_master: bool,
    killed: bool,
    last_five: VecDeque<u64>,
    measurements: Rc<RefCell<LatencyStore>>,
    measuring: Rc<Cell<bool>>,
    on_unstable: Rc<dyn Fn()>,
    pub(crate) batch_map: HashMap<u64, Vec<Request>>,
    pub(crate) batch_deadline: HashMap<u64, u64>,
    pub(crate) mv: Option<Rc<MultiversionState>>,
    pub(crate) balancer_stats: Rc<RefCell<BalancerStats>>,
}

#[allow(clippy::too_many_arguments)]
pub fn spawn_worker(
    env: &Env,
    cfg: WorkerConfig,
    in_q: Channel<PipelineItem>,
    pull_q: Channel<PullFeedback>,
    bindex: Rc<BucketedIndex>,
    serv_gen: Box<dyn ServiceTimeGenerator>,
    measurements: Rc<RefCell<LatencyStore>>,
    measuring: Rc<Cell<bool>>,
    on_unstable: Rc<dyn Fn()>,
    mv: Option<Rc<MultiversionState>>,
    balancer_stats: Rc<RefCell<BalancerStats>>,
) {
    let state = Rc::new(RefCell::new(WorkerState {
        id: cfg.id,
        in_q,
        pull_q,
        bindex,
        serv_gen,
        policy_kind: cfg.policy_kind,
        use_compaction: cfg.use_compaction,
        compaction_time: cfg.compaction_time,
        batch_window_factor: cfg.batch_window_factor,
        index_update_delay: cfg.index_update_delay,
        fixed_overhead: cfg.fixed_overhead,
        instability_threshold: cfg.instability_threshold,
        is_master: cfg.is_master,
        killed: false,
        last_five: VecDeque::with_capacity(5),
        measurements,
        measuring,
        on_unstable,
        batch_map: HashMap::new(),
        batch_deadline: HashMap::new(),
        mv,
        balancer_stats,
    }));
    step(state, env);
}

fn step(state: Rc<RefCell<WorkerState>>, env: &Env) {
    if state.borrow().killed {
        return;
    }
    let in_q = state.borrow().in_q.clone();
    in_q.get(env).add_callback(env, move |env, item| {
        handle_item(state, env, item);
    });
}

fn handle_item(state: Rc<RefCell<WorkerState>>, env: &Env, item: PipelineItem) {
    if state.borrow().killed {
        return;
    }
    match item {
        PipelineItem::EndOfMeasurements => {
            // Stop recording into the histograms but keep draining the
            // queue: the generator keeps producing post-marker traffic so
            // steady-state workers don't starve, and this flag (shared by
            // every worker) is what tells all of them the window closed,
            // even though the balancer only routes the sentinel itself to
            // one worker's queue.
            state.borrow().measuring.set(false);
            step(state, env);
        }
        PipelineItem::Request(mut req) => {
            req.start_proc_time = Some(env.now());
            let num_buckets = state.borrow().bindex.num_buckets();
            let bucket = (req.key % num_buckets as u64) as usize;
            let policy_kind = state.borrow().policy_kind;
            match policy_kind {
                PolicyKind::Erew => erew_path(state, env, req, bucket),
                PolicyKind::Concurrent { disregard_conf: true } => {
                    ideal_path(state, env, req, bucket)
                }
                PolicyKind::Concurrent { disregard_conf: false } => {
                    concurrent_entry(state, env, req, bucket)
                }
                PolicyKind::Multiversion => multiversion_path(state, env, req, bucket),
            }
        }
    }
}

pub(crate) fn next_service(state: &Rc<RefCell<WorkerState>>) -> u64 {
    state.borrow_mut().serv_gen.get()
}

fn erew_path(state: Rc<RefCell<WorkerState>>, env: &Env, mut req: Request, bucket: usize) {
    let bindex = state.borrow().bindex.clone();
    debug_assert!(
        !is_odd(bindex.get_version(bucket)),
        "EREW worker observed an odd bucket version; EREW guarantees no concurrent writer"
    );
    let service = next_service(&state);
    if req.write {
        bindex.increment(env, bucket);
        let bindex2 = bindex.clone();
        env.timeout(service).add_callback(env, move |env, _| {
            bindex2.increment(env, bucket);
            req.end_proc_time = Some(env.now());
            finish_request(state, env, req, false);
        });
    } else {
        env.timeout(service).add_callback(env, move |env, _| {
            req.end_proc_time = Some(env.now());
            finish_request(state, env, req, false);
        });
    }
}

fn ideal_path(state: Rc<RefCell<WorkerState>>, env: &Env, mut req: Request, _bucket: usize) {
    let service = next_service(&state);
    env.timeout(service).add_callback(env, move |env, _| {
        req.end_proc_time = Some(env.now());
        finish_request(state, env, req, false);
    });
}

fn concurrent_entry(state: Rc<RefCell<WorkerState>>, env: &Env, mut req: Request, bucket: usize) {
    let bindex = state.borrow().bindex.clone();
    let version = bindex.get_version(bucket);
    if is_odd(version) {
        req.num_cc_spins += 1;
        bindex
            .wait_for_even(bucket)
            .add_callback(env, move |env, _| {
                concurrent_entry(state, env, req, bucket);
            });
    } else if req.write {
        concurrent_write(state, env, req, bucket);
    } else {
        concurrent_read(state, env, req, bucket);
    }
}

/// Records how many times a reader had to spin on an odd bucket before it
/// was let through, keyed by spin count, for every read that reaches the
/// point of actually starting service.
fn record_reader_wait(state: &Rc<RefCell<WorkerState>>, req: &Request) {
    *state
        .borrow()
        .balancer_stats
        .borrow_mut()
        .reader_wait_histogram
        .entry(req.num_cc_spins)
        .or_insert(0) += 1;
}

fn concurrent_read(state: Rc<RefCell<WorkerState>>, env: &Env, mut req: Request, bucket: usize) {
    record_reader_wait(&state, &req);
    let bindex = state.borrow().bindex.clone();
    let prev_version = bindex.get_version(bucket);
    let service = next_service(&state);
    env.timeout(service).add_callback(env, move |env, _| {
        let recheck = bindex.get_version(bucket);
        if recheck != prev_version {
            req.num_cc_aborts += 1;
            let service2 = next_service(&state);
            env.timeout(service2).add_callback(env, move |env, _| {
                req.end_proc_time = Some(env.now());
                finish_request(state, env, req, false);
            });
        } else {
            req.end_proc_time = Some(env.now());
            finish_request(state, env, req, false);
        }
    });
}

fn concurrent_write(state: Rc<RefCell<WorkerState>>, env: &Env, req: Request, bucket: usize) {
    let (use_compaction, has_pending_same_key) = {
        let s = state.borrow();
        let pending = s.use_compaction
            && (s.batch_map.contains_key(&req.key)
                || s.in_q
                    .any_queued(|item| matches!(item, PipelineItem::Request(r) if r.write && r.key == req.key)));
        (s.use_compaction, pending)
    };
    if use_compaction && has_pending_same_key {
        crate::batching::absorb_write(state, env, req, bucket);
    } else {
        do_write_process(state, env, req, bucket, false);
    }
}

pub(crate) fn do_write_process(
    state: Rc<RefCell<WorkerState>>,
    env: &Env,
    mut req: Request,
    bucket: usize,
    compacted: bool,
) {
    let bindex = state.borrow().bindex.clone();
    let index_update_delay = state.borrow().index_update_delay;

    let bindex_odd = bindex.clone();
    env.schedule_at(env.now() + index_update_delay, move |env| {
        bindex_odd.increment(env, bucket); // mark odd: writer owns the bucket
    });

    let service = next_service(&state);
    env.timeout(service).add_callback(env, move |env, _| {
        debug_assert!(
            is_odd(bindex.get_version(bucket)),
            "write's own odd-mark bump should have already fired by the time its service time elapses"
        );
        env.schedule_at(env.now() + index_update_delay, move |env| {
            bindex.increment(env, bucket); // mark even: write now visible
        });
        req.end_proc_time = Some(env.now());
        finish_request(state, env, req, compacted);
    });
}

pub(crate) fn finish_request(
    state: Rc<RefCell<WorkerState>>,
    env: &Env,
    mut req: Request,
    compacted: bool,
) {
    let fixed_overhead = state.borrow().fixed_overhead;
    env.timeout(fixed_overhead).add_callback(env, move |env, _| {
        req.completion_time = Some(env.now());
        let total = req.total_service_time().unwrap_or(0);
        let unstable = {
            let mut s = state.borrow_mut();
            let still_measuring = s.measuring.get();
            if still_measuring {
                s.measurements
                    .borrow_mut()
                    .record(req.id, req.write, compacted, total);
            }
            s.last_five.push_back(total);
            if s.last_five.len() > 5 {
                s.last_five.pop_front();
            }
            still_measuring
                && s.is_master
                && s.last_five.len() == 5
                && s.last_five.iter().all(|&t| t > s.instability_threshold)
        };
        if unstable {
            let on_unstable = state.borrow().on_unstable.clone();
            tracing::warn!(worker = state.borrow().id, "run unstable, interrupting load generator");
            on_unstable();
            state.borrow_mut().killed = true;
            return;
        }
        let (pull_q, worker_id) = {
            let s = state.borrow();
            (s.pull_q.clone(), s.id)
        };
        pull_q.put(env, PullFeedback { worker_id, request: req });
        step(state, env);
    });
}

pub(crate) fn queue_bindex(state: &Rc<RefCell<WorkerState>>) -> Rc<BucketedIndex> {
    state.borrow().bindex.clone()
}

/// Multiversion path: readers never abort and writers never spin. A
/// reader brackets its service time with an epoch it registers with and
/// releases from the shared tracker; a writer claims the next sequence
/// number up front and defers the bucket's visible bump until every
/// reader from an older epoch has released.
fn multiversion_path(state: Rc<RefCell<WorkerState>>, env: &Env, mut req: Request, bucket: usize) {
    let mv = state
        .borrow()
        .mv
        .clone()
        .expect("multiversion policy requires MultiversionState");
    let service = next_service(&state);
    if req.write {
        let epoch = mv.sequencer.issue();
        env.timeout(service).add_callback(env, move |env, _| {
            req.end_proc_time = Some(env.now());
            let bindex = queue_bindex(&state);
            mv.defer_bump(env, epoch, bindex, bucket, move |env| {
                finish_request(state, env, req, false);
            });
        });
    } else {
        let epoch = mv.sequencer.current();
        mv.epochs.enter(epoch);
        env.timeout(service).add_callback(env, move |env, _| {
            mv.epochs.leave(epoch);
            mv.deferrals.drain_ready(env, &mv.epochs);
            req.end_proc_time = Some(env.now());
            finish_request(state, env, req, false);
        });
    }
}
