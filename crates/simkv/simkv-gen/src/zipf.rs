use rand::Rng;
use rand_pcg::Pcg64;
use sha2::{Digest, Sha256};

/// Samples ranks `1..=num_items` from a Zipf(s) distribution and maps a
/// rank to a stable 8-byte key hash. The pdf/cdf arrays are precomputed
/// once so sampling is a uniform draw plus a binary search.
pub struct ZipfKeyGenerator {
    cdf: Vec<f64>,
    rng: Pcg64,
}

impl ZipfKeyGenerator {
    pub fn new(num_items: u64, s: f64, seed: u64) -> Self {
        let harmonic = generalized_harmonic(num_items, s);
        let mut cdf = Vec::with_capacity(num_items as usize);
        let mut running = 0.0;
        for rank in 1..=num_items {
            let pdf = (rank as f64).powf(-s) / harmonic;
            running += pdf;
            cdf.push(running);
        }
        // Guard against floating-point drift so bisection always lands
        // inside the array for u == the supremum of the draw range.
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }
        Self {
            cdf,
            rng: Pcg64::new(seed as u128, 0xa02b_dbf7_bb3c_0a7a_c28f_a16a_64ab_f96),
        }
    }

    /// Draw a 1-indexed rank from the distribution.
    pub fn get_rank(&mut self) -> u64 {
        let u: f64 = self.rng.gen_range(0.0..1.0);
        bisect_right(&self.cdf, u) as u64 + 1
    }

    pub fn hash_for_rank(rank: u64) -> u64 {
        hash_int_to_key(rank)
    }

    pub fn get_key(&mut self) -> u64 {
        Self::hash_for_rank(self.get_rank())
    }
}

fn generalized_harmonic(n: u64, s: f64) -> f64 {
    (1..=n).map(|k| (k as f64).powf(-s)).sum()
}

/// Equivalent to Python's `bisect.bisect_right`: the insertion point for
/// `x` in a sorted slice that keeps it sorted, biased to the right of
/// equal elements.
fn bisect_right(sorted: &[f64], x: f64) -> usize {
    let mut lo = 0usize;
    let mut hi = sorted.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if x < sorted[mid] {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Hashes the decimal string form of `n` with SHA-256 and takes the low
/// 8 bytes of the digest as a `u64` key — mirrors taking `hexdigest()[-16:-8]`
/// as an integer off the original digest.
fn hash_int_to_key(n: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(n.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[16..24]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdf_is_monotonic_and_ends_at_one() {
        let gener = ZipfKeyGenerator::new(1000, 0.99, 1);
        assert!(gener.cdf.windows(2).all(|w| w[1] >= w[0]));
        assert!((gener.cdf.last().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rank_is_always_in_range() {
        let mut gener = ZipfKeyGenerator::new(500, 0.8, 99);
        for _ in 0..2000 {
            let r = gener.get_rank();
            assert!(r >= 1 && r <= 500);
        }
    }

    #[test]
    fn hash_is_stable_for_a_given_rank() {
        assert_eq!(hash_int_to_key(42), hash_int_to_key(42));
        assert_ne!(hash_int_to_key(42), hash_int_to_key(43));
    }

    #[test]
    fn skew_concentrates_low_ranks() {
        let mut gener = ZipfKeyGenerator::new(1000, 1.2, 7);
        let mut rank_one_count = 0;
        for _ in 0..5000 {
            if gener.get_rank() == 1 {
                rank_one_count += 1;
            }
        }
        // Highly skewed distribution: rank 1 should dominate far beyond 1/1000.
        assert!(rank_one_count > 500);
    }
}
