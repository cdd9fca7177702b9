use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::Duration;

/// Bounded exponential backoff for adapters that retry internally.
///
/// The fan-out engine never retries; an adapter that opts in owns its own
/// policy and stays within `max_attempts`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy {
            policy: self.clone(),
            attempts: 0,
            rng: self.jitter.then(StdRng::from_entropy),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    policy: RetryPolicy,
    attempts: usize,
    rng: Option<StdRng>,
}

impl RetryStrategy {
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Delay before the next retry, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }

        self.attempts += 1;

        let exp = self
            .policy
            .exponential_base
            .powi((self.attempts - 1) as i32);
        let mut delay = self.policy.initial_delay.mul_f64(exp);
        if delay > self.policy.max_delay {
            delay = self.policy.max_delay;
        }

        if let Some(rng) = &mut self.rng {
            let jitter: f64 = rng.gen_range(0.5..1.5);
            delay = delay.mul_f64(jitter).min(self.policy.max_delay);
        }

        Some(delay)
    }
}
