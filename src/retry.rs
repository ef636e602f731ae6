use embedded_hal_async::delay::DelayNs;

/// Fixed-interval retry policy shared by the connectivity guards and the GPS wait.
///
/// Without `max_attempts` the caller keeps retrying forever, which is what an
/// unattended node does when its network is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval_ms: u32,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub const fn new(interval_ms: u32, max_attempts: Option<u32>) -> Self {
        Self {
            interval_ms,
            max_attempts,
        }
    }

    pub const fn forever(interval_ms: u32) -> Self {
        Self::new(interval_ms, None)
    }

    pub const fn limited(interval_ms: u32, max_attempts: u32) -> Self {
        Self::new(interval_ms, Some(max_attempts))
    }
}

/// Returned once a capped policy ran out of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
}

/// Attempt counter for one retry loop.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval_ms(&self) -> u32 {
        self.policy.interval_ms
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Records a failed attempt and sleeps for the policy interval.
    pub async fn wait<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Exhausted> {
        self.attempts = self.attempts.saturating_add(1);

        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return Err(Exhausted {
                    attempts: self.attempts,
                });
            }
        }

        delay.delay_ms(self.policy.interval_ms).await;
        Ok(())
    }
}
