use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// RandMode controls random generator behaviour. May be predictable for
/// testing (and for RANDOM with a negative argument) or truly random for
/// gameplay.
pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct ZRand {
    rng: StdRng,
    rand_mode: RandMode,
}

impl ZRand {
    pub fn new_uniform() -> ZRand {
        ZRand {
            rng: StdRng::from_entropy(),
            rand_mode: RandMode::RandomUniform,
        }
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {
            rng: StdRng::seed_from_u64(seed),
            rand_mode: RandMode::Predictable,
        }
    }

    /// RANDOM n with n > 0: uniform draw from 1..=n.
    pub fn next_in_range(&mut self, n: u16) -> u16 {
        debug_assert!(n > 0);
        self.rng.gen_range(1..=n)
    }

    /// RANDOM 0: re-seed unpredictably and go back to uniform mode.
    pub fn reseed_random(&mut self) {
        debug!("rng reseeded from entropy");
        self.rng = StdRng::from_entropy();
        self.rand_mode = RandMode::RandomUniform;
    }

    /// RANDOM -n: seed deterministically with n and enter predictable mode.
    pub fn seed(&mut self, seed: u64) {
        debug!("rng seeded with {}", seed);
        self.rng = StdRng::seed_from_u64(seed);
        self.rand_mode = RandMode::Predictable;
    }

    pub fn is_predictable(&self) -> bool {
        matches!(self.rand_mode, RandMode::Predictable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_is_inclusive_one_to_n() {
        let mut rng = ZRand::new_predictable(7);
        for _ in 0..200 {
            let v = rng.next_in_range(6);
            assert!((1..=6).contains(&v));
        }
        let mut rng = ZRand::new_predictable(7);
        for _ in 0..50 {
            assert_eq!(rng.next_in_range(1), 1);
        }
    }

    #[test]
    fn identical_seeds_give_identical_sequences() {
        let mut a = ZRand::new_predictable(42);
        let mut b = ZRand::new_predictable(42);
        let sa: Vec<u16> = (0..32).map(|_| a.next_in_range(100)).collect();
        let sb: Vec<u16> = (0..32).map(|_| b.next_in_range(100)).collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn reseeding_switches_mode() {
        let mut rng = ZRand::new_uniform();
        assert!(!rng.is_predictable());
        rng.seed(42);
        assert!(rng.is_predictable());
        rng.reseed_random();
        assert!(!rng.is_predictable());
    }
}
