use rand::Rng;
use rand_pcg::Pcg64;

/// Common interface for every service-time distribution: `get()` draws a
/// duration in nanoseconds, `get_with_mean` draws from the same family but
/// with a one-shot substitute mean (used by the multiversion worker to cost
/// out things like reader/writer synchronization with a scaled mean).
pub trait ServiceTimeGenerator {
    fn get(&mut self) -> u64;
    fn get_with_mean(&mut self, mean: f64) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct FixedServiceTime {
    pub value: u64,
}

impl FixedServiceTime {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl ServiceTimeGenerator for FixedServiceTime {
    fn get(&mut self) -> u64 {
        self.value
    }
    fn get_with_mean(&mut self, mean: f64) -> u64 {
        mean.round() as u64
    }
}

pub struct UniformServTimeGenerator {
    lo: f64,
    hi: f64,
    rng: Pcg64,
}

impl UniformServTimeGenerator {
    pub fn new(lo: u64, hi: u64, seed: u64) -> Self {
        Self {
            lo: lo as f64,
            hi: hi as f64,
            rng: Pcg64::new(seed as u128, 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96),
        }
    }
}

impl ServiceTimeGenerator for UniformServTimeGenerator {
    fn get(&mut self) -> u64 {
        self.rng.gen_range(self.lo..=self.hi).round() as u64
    }
    fn get_with_mean(&mut self, mean: f64) -> u64 {
        let half_width = (self.hi - self.lo) / 2.0;
        self.rng
            .gen_range((mean - half_width).max(0.0)..=(mean + half_width))
            .round() as u64
    }
}

/// Exponential service time with a given mean, drawn via inverse-CDF
/// sampling (`-mean * ln(1 - u)`) off a seeded PCG64 stream.
pub struct ExpServTimeGenerator {
    mean: f64,
    rng: Pcg64,
}

impl ExpServTimeGenerator {
    pub fn new(mean: f64, seed: u64) -> Self {
        Self {
            mean,
            rng: Pcg64::new(seed as u128, 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96),
        }
    }

    fn draw(&mut self, mean: f64) -> u64 {
        let u: f64 = self.rng.gen_range(0.0..1.0);
        (-mean * (1.0 - u).ln()).round().max(0.0) as u64
    }
}

impl ServiceTimeGenerator for ExpServTimeGenerator {
    fn get(&mut self) -> u64 {
        let mean = self.mean;
        self.draw(mean)
    }
    fn get_with_mean(&mut self, mean: f64) -> u64 {
        self.draw(mean)
    }
}

/// Bimodal: returns `short` with probability `p_short_pct`%, else `long`.
pub struct BimodalServTimeGenerator {
    p_short_pct: f64,
    short: u64,
    long: u64,
    rng: Pcg64,
}

impl BimodalServTimeGenerator {
    pub fn new(p_short_pct: f64, short: u64, long: u64, seed: u64) -> Self {
        Self {
            p_short_pct,
            short,
            long,
            rng: Pcg64::new(seed as u128, 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96),
        }
    }

    /// Bernoulli trial with success probability `prob_success_pct`%.
    pub fn roll_hit(&mut self, prob_success_pct: f64) -> bool {
        self.rng.gen_range(0.0..100.0) < prob_success_pct
    }
}

impl ServiceTimeGenerator for BimodalServTimeGenerator {
    fn get(&mut self) -> u64 {
        if self.roll_hit(self.p_short_pct) {
            self.short
        } else {
            self.long
        }
    }
    fn get_with_mean(&mut self, mean: f64) -> u64 {
        mean.round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_is_constant() {
        let mut g = FixedServiceTime::new(600);
        assert_eq!(g.get(), 600);
        assert_eq!(g.get(), 600);
    }

    #[test]
    fn bimodal_picks_short_or_long() {
        let mut g = BimodalServTimeGenerator::new(80.0, 100, 5000, 42);
        for _ in 0..100 {
            let v = g.get();
            assert!(v == 100 || v == 5000);
        }
    }

    #[test]
    fn exponential_is_deterministic_for_a_seed() {
        let mut a = ExpServTimeGenerator::new(600.0, 7);
        let mut b = ExpServTimeGenerator::new(600.0, 7);
        let seq_a: Vec<u64> = (0..10).map(|_| a.get()).collect();
        let seq_b: Vec<u64> = (0..10).map(|_| b.get()).collect();
        assert_eq!(seq_a, seq_b);
    }
}
