use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Randomized idle sleep for loops that poll without blocking.
///
/// Each loop owns its own instance, so workers back off independently and do
/// not wake in lockstep.
#[derive(Debug)]
pub(crate) struct Backoff {
    rng: StdRng,
    range_us: RangeInclusive<u64>,
}

impl Backoff {
    pub fn new(range_us: RangeInclusive<u64>) -> Self {
        Backoff {
            rng: StdRng::from_entropy(),
            range_us,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        Duration::from_micros(self.rng.gen_range(self.range_us.clone()))
    }

    pub fn pause(&mut self) {
        thread::sleep(self.next_delay());
    }
}
