//! Retry and backoff for MBS / Koji / Pulp HTTP calls.
//!
//! Per spec §5: "bounded attempts, exponential back-off, only on transient
//! network errors". `classify` decides whether a given `OdcsError` is worth
//! retrying (`Transient`) or should propagate immediately.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::OdcsError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay: Duration::from_millis(200),
      max_delay: Duration::from_secs(10),
    }
  }
}

impl RetryConfig {
  fn delay(&self, attempt: u32) -> Duration {
    let exponential =
      self.base_delay.as_millis().saturating_mul(1u128 << attempt);
    let capped = exponential.min(self.max_delay.as_millis()) as u64;
    let jittered = rand::rng().random_range(0..=capped.max(1));
    Duration::from_millis(jittered)
  }
}

/// Retries `operation` up to `config.max_attempts` additional times,
/// backing off between attempts, but only when the error is `Transient`.
/// Any other `OdcsError` variant propagates on the first failure.
pub async fn retry_transient<T, Op, Fut>(
  config: &RetryConfig,
  operation: Op,
) -> Result<T, OdcsError>
where
  Op: Fn() -> Fut,
  Fut: std::future::Future<Output = Result<T, OdcsError>>,
{
  let mut last_err = None;
  for attempt in 0..=config.max_attempts {
    match operation().await {
      Ok(value) => return Ok(value),
      Err(e) if !e.is_transient() => return Err(e),
      Err(e) => {
        debug!(
          "transient error on attempt {attempt}/{} | {e:#}",
          config.max_attempts
        );
        last_err = Some(e);
        if attempt < config.max_attempts {
          tokio::time::sleep(config.delay(attempt)).await;
        }
      }
    }
  }
  let e = last_err.expect("at least one attempt was made");
  warn!("all {} retry attempts exhausted | {e:#}", config.max_attempts + 1);
  Err(e)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn succeeds_immediately() {
    let config = RetryConfig::default();
    let result =
      retry_transient(&config, || async { Ok::<_, OdcsError>(42) })
        .await
        .unwrap();
    assert_eq!(result, 42);
  }

  #[tokio::test]
  async fn does_not_retry_non_transient() {
    let config = RetryConfig {
      max_attempts: 5,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
    };
    let attempts = std::sync::atomic::AtomicU32::new(0);
    let result = retry_transient(&config, || {
      attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      async {
        Err::<i32, _>(OdcsError::InvalidInput("bad".to_string()))
      }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn retries_transient_then_succeeds() {
    let config = RetryConfig {
      max_attempts: 3,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
    };
    let attempts = std::sync::atomic::AtomicU32::new(0);
    let result = retry_transient(&config, || {
      let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      async move {
        if n < 2 {
          Err(OdcsError::Transient("flaky".to_string()))
        } else {
          Ok(7)
        }
      }
    })
    .await
    .unwrap();
    assert_eq!(result, 7);
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
  }
}
