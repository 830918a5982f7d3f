//! Retry with exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Runs `operation` until it succeeds, fails with a non-transient error, or
/// the policy runs out of retries.
///
/// `operation` receives the zero-based attempt number. The last error is
/// returned unchanged.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay();

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    log::info!("{label}: succeeded after {} attempts", attempt + 1);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                attempt += 1;
                log::warn!(
                    "{label}: attempt {attempt}/{} failed ({e}), retrying in {}ms",
                    config.max_attempts + 1,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, config);
            }
            Err(e) => {
                if matches!(e, Error::Cancelled) {
                    log::debug!("{label}: cancelled");
                } else if attempt > 0 {
                    log::error!("{label}: giving up after {} attempts: {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}

fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let scaled = Duration::from_secs_f64(current.as_secs_f64() * config.backoff_multiplier.max(1.0));
    scaled.min(config.max_delay())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .with_max_attempts(max_attempts)
            .with_initial_delay_ms(1)
    }

    fn transient() -> Error {
        Error::Filesystem(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"))
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(3), "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err(transient()) } else { Ok(n) } }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(2), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&fast(5), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::PageStructure("missing".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::PageStructure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_policy_tries_once() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryConfig::disabled(), "test", |attempt| {
            assert_eq!(attempt, 0);
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 1_000,
            max_delay_ms: 3_000,
            backoff_multiplier: 4.0,
        };
        let d = next_delay(config.initial_delay(), &config);
        assert_eq!(d, Duration::from_secs(3));
    }
}
