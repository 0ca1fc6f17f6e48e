//! Deterministic RNG hierarchy.
//!
//! A master seed generates deterministic sub-seeds for each `(scope, stream, iteration)`
//! tuple. Sub-seeds are derived via BLAKE3 hashing, so the jitter stream of one
//! episode never depends on how many draws another episode consumed.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive a deterministic sub-seed for a specific (scope, stream, iteration).
    ///
    /// `scope` is usually a graph fingerprint; `stream` names the consumer
    /// ("jitter", "episodes", an episode label, ...).
    pub fn sub_seed(&self, scope: &str, stream: &str, iteration: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(scope.as_bytes());
        hasher.update(&[0]);
        hasher.update(stream.as_bytes());
        hasher.update(&iteration.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    /// Create a seeded StdRng from a sub-seed.
    pub fn rng_for(&self, scope: &str, stream: &str, iteration: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(scope, stream, iteration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn sub_seeds_are_deterministic() {
        let h = RngHierarchy::new(42);
        assert_eq!(h.sub_seed("g1", "jitter", 0), h.sub_seed("g1", "jitter", 0));
    }

    #[test]
    fn different_streams_different_seeds() {
        let h = RngHierarchy::new(42);
        assert_ne!(h.sub_seed("g1", "jitter", 0), h.sub_seed("g1", "episodes", 0));
        assert_ne!(h.sub_seed("g1", "jitter", 0), h.sub_seed("g2", "jitter", 0));
    }

    #[test]
    fn scope_and_stream_boundary_is_unambiguous() {
        let h = RngHierarchy::new(1);
        assert_ne!(h.sub_seed("ab", "c", 0), h.sub_seed("a", "bc", 0));
    }

    #[test]
    fn different_iterations_different_seeds() {
        let h = RngHierarchy::new(42);
        assert_ne!(h.sub_seed("g", "s", 0), h.sub_seed("g", "s", 1));
    }

    #[test]
    fn different_master_seeds_different_output() {
        assert_ne!(
            RngHierarchy::new(42).sub_seed("g", "s", 0),
            RngHierarchy::new(43).sub_seed("g", "s", 0)
        );
    }

    #[test]
    fn rng_streams_replay() {
        let h = RngHierarchy::new(7);
        let draw = |mut rng: StdRng| (0..5).map(|_| rng.gen::<u32>()).collect::<Vec<_>>();
        assert_eq!(draw(h.rng_for("g", "s", 3)), draw(h.rng_for("g", "s", 3)));
    }
}
