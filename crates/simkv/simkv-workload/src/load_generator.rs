use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rand::Rng;
use rand_pcg::Pcg64;

use simkv_gen::{ExpServTimeGenerator, ServiceTimeGenerator, ZipfKeyGenerator};
use simkv_kernel::{Channel, Env};

use crate::request::{PipelineItem, Request};

pub struct LoadGenConfig {
    pub arrival_rate: f64,
    pub reqs_to_sim: u64,
    pub write_frac: u8,
    pub seed_load: u64,
    pub seed_zipf: u64,
    pub zipf_coeff: f64,
    pub num_items: u64,
}

struct State {
    interarrival: ExpServTimeGenerator,
    zipf: ZipfKeyGenerator,
    write_coin: Pcg64,
    write_frac: u8,
    next_id: u64,
    reqs_to_sim: u64,
    generated_count: u64,
    end_marker_sent: bool,
    stopped: bool,
}

/// Handle a worker uses to interrupt the generator on instability.
pub struct LoadGenHandle {
    stopped: Rc<Cell<bool>>,
}

impl LoadGenHandle {
    pub fn interrupt(&self) {
        self.stopped.set(true);
    }
}

/// Open-loop Poisson arrival generator: emits requests at exponentially
/// distributed inter-arrival times over a Zipf-skewed key population.
/// After `reqs_to_sim` requests it puts the end-of-measurements sentinel
/// exactly once, then keeps generating (discarded from measurement)
/// indefinitely so steady-state workers don't starve — unless interrupted.
pub fn spawn_load_generator(
    env: &Env,
    input: Channel<PipelineItem>,
    cfg: LoadGenConfig,
) -> LoadGenHandle {
    let state = Rc::new(RefCell::new(State {
        interarrival: ExpServTimeGenerator::new(cfg.arrival_rate, cfg.seed_load),
        zipf: ZipfKeyGenerator::new(cfg.num_items, cfg.zipf_coeff, cfg.seed_zipf),
        write_coin: Pcg64::new(
            cfg.seed_load.wrapping_add(1) as u128,
            0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96,
        ),
        write_frac: cfg.write_frac,
        next_id: 0,
        reqs_to_sim: cfg.reqs_to_sim,
        generated_count: 0,
        end_marker_sent: false,
        stopped: false,
    }));
    let stopped_flag = Rc::new(Cell::new(false));
    step(state, stopped_flag.clone(), input, env);
    LoadGenHandle {
        stopped: stopped_flag,
    }
}

fn step(
    state: Rc<RefCell<State>>,
    stopped_flag: Rc<Cell<bool>>,
    input: Channel<PipelineItem>,
    env: &Env,
) {
    if stopped_flag.get() {
        state.borrow_mut().stopped = true;
        return;
    }

    let (req_item, emit_marker, interarrival_delay) = {
        let mut s = state.borrow_mut();
        let write = s.write_coin.gen_range(0.0..100.0) < s.write_frac as f64;
        let key = s.zipf.get_key();
        let id = s.next_id;
        s.next_id += 1;
        let req = Request::new(id, key, write, env.now());
        s.generated_count += 1;

        let emit_marker = s.generated_count == s.reqs_to_sim && !s.end_marker_sent;
        if emit_marker {
            s.end_marker_sent = true;
        }
        let delay = s.interarrival.get();
        (PipelineItem::Request(req), emit_marker, delay)
    };
    input.put(env, req_item);
    if emit_marker {
        input.put(env, PipelineItem::EndOfMeasurements);
    }

    env.timeout(interarrival_delay).add_callback(env, {
        let input = input.clone();
        move |env, _| step(state, stopped_flag, input, env)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_marker_after_reqs_to_sim() {
        let env = Env::new();
        let input: Channel<PipelineItem> = Channel::new(0);
        let cfg = LoadGenConfig {
            arrival_rate: 100.0,
            reqs_to_sim: 5,
            write_frac: 20,
            seed_load: 1,
            seed_zipf: 2,
            zipf_coeff: 0.9,
            num_items: 100,
        };
        let handle = spawn_load_generator(&env, input.clone(), cfg);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..6 {
            let seen = seen.clone();
            input.get(&env).add_callback(&env, move |_, item| {
                seen.borrow_mut().push(item);
            });
        }
        env.run_until(10_000);
        handle.interrupt();
        let seen = seen.borrow();
        assert_eq!(seen.len(), 6);
        assert!(matches!(seen[5], PipelineItem::EndOfMeasurements));
        for item in seen.iter().take(5) {
            assert!(matches!(item, PipelineItem::Request(_)));
        }
    }
}
