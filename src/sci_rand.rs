use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// RandMode controls random generator behaviour. May be predictable for testing or truly random for gameplay
pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct SciRand {
    rng: Box<dyn RngCore>,
    rand_mode: RandMode,
}

impl SciRand {
    pub fn new_uniform() -> SciRand {
        SciRand {
            rng: Box::new(rand::thread_rng()),
            rand_mode: RandMode::RandomUniform,
        }
    }

    pub fn new_predictable(seed: u64) -> SciRand {
        SciRand {
            rng: Box::new(StdRng::seed_from_u64(seed)),
            rand_mode: RandMode::Predictable,
        }
    }

    /// Seeded when a seed is configured, otherwise uniform
    pub fn from_seed(seed: Option<u64>) -> SciRand {
        match seed {
            Some(seed) => SciRand::new_predictable(seed),
            None => SciRand::new_uniform(),
        }
    }

    pub fn is_predictable(&self) -> bool {
        matches!(self.rand_mode, RandMode::Predictable)
    }

    /// Value in the inclusive range between `a` and `b`, in either order
    pub fn range(&mut self, a: u16, b: u16) -> u16 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        self.rng.gen_range(lo..=hi)
    }
}
