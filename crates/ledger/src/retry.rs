//! Bounded backoff for CAS retry loops. The ledger never read-modify-writes
//! a balance; every mutator reads the current value, computes the new one,
//! and submits a CAS. Under contention the CAS loses and must retry — this
//! helper bounds how many times and how long that retry can take.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with full jitter, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max_delay.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}

/// Retries `op` up to `policy.max_attempts` times whenever it returns
/// `Ok(None)` (the CAS-conflict sentinel from the caller's perspective).
/// Returns `Err(RetriesExhausted)` if the budget runs out.
pub async fn with_cas_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, crate::error::LedgerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, crate::error::LedgerError>>,
{
    for attempt in 0..policy.max_attempts {
        match op().await? {
            Some(value) => return Ok(value),
            None => {
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }
    Err(crate::error::LedgerError::RetriesExhausted(policy.max_attempts))
}
