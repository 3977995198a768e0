//! Injectable sources of time and randomness
//!
//! The only nondeterminism a turn has is the `now`/`today` family of
//! set-variable values and the `random` value type. Both come through here.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const RANDOM_VALUE_LEN: usize = 10;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[allow(dead_code)] // Used in tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Generator for `random` set-variable values
#[derive(Debug, Clone)]
pub struct RandomIds {
    rng: StdRng,
}

impl RandomIds {
    #[allow(dead_code)] // Used in tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Alphanumeric token
    pub fn token(&mut self) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(RANDOM_VALUE_LEN)
            .map(char::from)
            .collect()
    }
}
