use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use crate::shared::config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_env() -> Self {
        let cfg = config::retry_config();
        Self::new(cfg.max_attempts, cfg.base_delay)
    }

    /// Delay after the given failed attempt (1-based): `base * 2^(attempt-1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Runs `op` until it succeeds or `policy.max_attempts` is exhausted, sleeping with
/// exponential backoff in between. The closure receives the 1-based attempt number.
/// Returns the last error after exhaustion.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.max_attempts => {
                log::warn!(
                    "[retry] {} failed after {} attempts: {}",
                    label,
                    attempt,
                    err
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                log::warn!(
                    "[retry] {} attempt {}/{} failed: {} (retrying in {}ms)",
                    label,
                    attempt,
                    policy.max_attempts,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let calls_for_op = calls.clone();
        let result: Result<&str, String> =
            retry_with_backoff(RetryPolicy::default(), "test", move |attempt| {
                let calls = calls_for_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(format!("boom {}", attempt))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_after_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_for_op = calls.clone();
        let result: Result<(), String> =
            retry_with_backoff(RetryPolicy::default(), "test", move |attempt| {
                let calls = calls_for_op.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(format!("attempt {}", attempt))
                }
            })
            .await;
        assert_eq!(result, Err("attempt 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
