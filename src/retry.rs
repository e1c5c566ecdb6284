//! Retry policy for lock conflicts
//!
//! Concurrent DDL contends on the system catalog. A transaction that hits a
//! deadlock or lock timeout is rolled back and retried after a random sleep
//! so that competing workers drift apart. The randomness is injected through
//! [`JitterSource`] so tests can run without sleeping.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces the sleep between two attempts
pub trait JitterSource: Send + Sync {
    /// A delay in `[0, ceiling)`
    fn next_delay(&self, ceiling: Duration) -> Duration;
}

/// Uniformly random delay from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn next_delay(&self, ceiling: Duration) -> Duration {
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..ceiling_ms))
    }
}

/// Reproducible random delays
#[derive(Debug)]
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn next_delay(&self, ceiling: Duration) -> Duration {
        let ceiling_ms = ceiling.as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Duration::from_millis(rng.gen_range(0..ceiling_ms))
    }
}

/// Never sleeps
#[derive(Debug, Default, Clone, Copy)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next_delay(&self, _ceiling: Duration) -> Duration {
        Duration::ZERO
    }
}

/// How often and how patiently a conflicting transaction is retried
#[derive(Clone)]
pub struct RetryPolicy {
    /// Transactions attempted before giving up
    pub max_attempts: u32,
    /// Exclusive upper bound of the sleep between attempts
    pub max_backoff: Duration,
    jitter: Arc<dyn JitterSource>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_backoff,
            jitter: Arc::new(RandomJitter),
        }
    }

    /// Same budget, no sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO).with_jitter(Arc::new(NoJitter))
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the next attempt
    pub fn next_delay(&self) -> Duration {
        self.jitter.next_delay(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(10, Duration::from_millis(5000))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("max_backoff", &self.max_backoff)
            .finish_non_exhaustive()
    }
}
