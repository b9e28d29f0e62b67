//! Retry with exponential backoff for transient backend failures.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::{ApiError, Classify, ErrorKind};
use crate::config::RetryConfig;

/// Predicate deciding whether a classified failure is worth another attempt.
pub type RetryPredicate = Arc<dyn Fn(&ApiError) -> bool + Send + Sync>;

/// Parameters for one retried operation.
#[derive(Clone)]
pub struct RetryContext {
  max_attempts: u32,
  initial_delay: Duration,
  should_retry: RetryPredicate,
}

impl RetryContext {
  /// Create a context with the default predicate (server and network failures only).
  ///
  /// `max_attempts` counts every try including the first; zero is treated as one.
  pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      initial_delay,
      should_retry: Arc::new(default_should_retry),
    }
  }

  /// Replace the retry predicate.
  ///
  /// Validation and auth failures stay non-retryable whatever the predicate says.
  pub fn with_should_retry<P>(mut self, predicate: P) -> Self
  where
    P: Fn(&ApiError) -> bool + Send + Sync + 'static,
  {
    self.should_retry = Arc::new(predicate);
    self
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  pub fn initial_delay(&self) -> Duration {
    self.initial_delay
  }

  /// Whether `error` may be retried: the caller predicate AND-ed with the floor.
  pub fn should_retry(&self, error: &ApiError) -> bool {
    is_ever_retryable(error) && (self.should_retry)(error)
  }

  /// Delay to wait after the failed attempt with the given 0-based index.
  pub fn delay_for(&self, attempt_index: u32) -> Duration {
    backoff_delay(self.initial_delay, attempt_index)
  }
}

impl Default for RetryContext {
  fn default() -> Self {
    RetryContext::from(&RetryConfig::default())
  }
}

impl From<&RetryConfig> for RetryContext {
  fn from(config: &RetryConfig) -> Self {
    Self::new(
      config.max_attempts,
      Duration::from_millis(config.initial_delay_ms),
    )
  }
}

impl fmt::Debug for RetryContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryContext")
      .field("max_attempts", &self.max_attempts)
      .field("initial_delay", &self.initial_delay)
      .finish_non_exhaustive()
  }
}

/// Retry server and network failures, nothing else.
pub fn default_should_retry(error: &ApiError) -> bool {
  matches!(error.kind, ErrorKind::Server | ErrorKind::Network)
}

/// Validation and auth failures are never retried.
fn is_ever_retryable(error: &ApiError) -> bool {
  !matches!(error.kind, ErrorKind::Validation | ErrorKind::Auth)
}

/// `initial * 2^attempt_index`, saturating instead of overflowing.
pub fn backoff_delay(initial: Duration, attempt_index: u32) -> Duration {
  let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
  initial.saturating_mul(factor)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts. The error returned is the one from the last attempt.
pub async fn execute<T, E, F, Fut>(mut operation: F, context: &RetryContext) -> Result<T, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: Classify + fmt::Display,
{
  let mut attempt = 0u32;

  loop {
    match operation().await {
      Ok(value) => {
        if attempt > 0 {
          debug!(attempts = attempt + 1, "operation succeeded after retry");
        }
        return Ok(value);
      }
      Err(err) => {
        let classified = err.classify();
        let tries = attempt + 1;

        if tries >= context.max_attempts || !context.should_retry(&classified) {
          debug!(
            attempts = tries,
            kind = %classified.kind,
            "giving up: {}",
            err
          );
          return Err(err);
        }

        let delay = context.delay_for(attempt);
        warn!(
          "Retry attempt {}/{} after {} failure, waiting {:?}: {}",
          tries + 1,
          context.max_attempts,
          classified.kind,
          delay,
          err
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
  use crate::api::error::RawFailure;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Mutex;
  use tokio::time::Instant;

  fn server_error(attempt: u32) -> ApiError {
    ApiError::new(ErrorKind::Server, 500).with_message(format!("attempt {}", attempt))
  }

  #[tokio::test]
  async fn test_success_on_first_attempt() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(3, Duration::from_millis(10));

    let result = execute(
      || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, ApiError>(42) }
      },
      &context,
    )
    .await;

    assert_eq!(result, Ok(42));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_after_transient_failures() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(4, Duration::from_millis(100));

    let result = execute(
      || {
        let count = counter.fetch_add(1, Ordering::SeqCst);
        async move {
          if count < 2 {
            Err(RawFailure::Timeout)
          } else {
            Ok("done")
          }
        }
      },
      &context,
    )
    .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ceiling_returns_last_error() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(3, Duration::from_millis(1000));

    let result: Result<(), ApiError> = execute(
      || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Err(server_error(attempt)) }
      },
      &context,
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(result.unwrap_err().message, "attempt 3");
  }

  #[tokio::test(start_paused = true)]
  async fn test_last_error_kind_propagates() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(2, Duration::from_millis(50));

    let result: Result<(), RawFailure> = execute(
      || {
        let count = counter.fetch_add(1, Ordering::SeqCst);
        async move {
          if count == 0 {
            Err(RawFailure::Timeout)
          } else {
            Err(RawFailure::Response {
              status: 502,
              body: None,
            })
          }
        }
      },
      &context,
    )
    .await;

    assert!(matches!(
      result,
      Err(RawFailure::Response { status: 502, .. })
    ));
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_growth() {
    let calls = Mutex::new(Vec::new());
    let context = RetryContext::new(4, Duration::from_millis(1000));

    let _: Result<(), ApiError> = execute(
      || {
        calls.lock().unwrap().push(Instant::now());
        async { Err(server_error(0)) }
      },
      &context,
    )
    .await;

    let calls = calls.into_inner().unwrap();
    assert_eq!(calls.len(), 4);

    let gaps: Vec<u128> = calls.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
    for (gap, expected) in gaps.iter().zip([1000u128, 2000, 4000]) {
      assert!(
        *gap >= expected && *gap < expected + 50,
        "gap {}ms, expected {}ms",
        gap,
        expected
      );
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_validation_and_auth_never_retried() {
    for status in [400u16, 401, 403] {
      let counter = AtomicU32::new(0);
      let context = RetryContext::new(5, Duration::from_millis(10));

      let result: Result<(), RawFailure> = execute(
        || {
          counter.fetch_add(1, Ordering::SeqCst);
          async move { Err(RawFailure::Response { status, body: None }) }
        },
        &context,
      )
      .await;

      assert!(result.is_err());
      assert_eq!(counter.load(Ordering::SeqCst), 1, "status {}", status);
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_custom_predicate_cannot_lift_floor() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(5, Duration::from_millis(10)).with_should_retry(|_| true);

    let _: Result<(), ApiError> = execute(
      || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::new(ErrorKind::Auth, 401)) }
      },
      &context,
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_custom_predicate_can_retry_not_found() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(3, Duration::from_millis(10))
      .with_should_retry(|e| e.kind == ErrorKind::NotFound);

    let _: Result<(), ApiError> = execute(
      || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::new(ErrorKind::NotFound, 404)) }
      },
      &context,
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_not_found_not_retried_by_default() {
    let counter = AtomicU32::new(0);
    let context = RetryContext::new(3, Duration::from_millis(10));

    let _: Result<(), ApiError> = execute(
      || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::new(ErrorKind::NotFound, 404)) }
      },
      &context,
    )
    .await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_zero_attempts_clamped() {
    assert_eq!(RetryContext::new(0, Duration::ZERO).max_attempts(), 1);
  }

  #[test]
  fn test_backoff_delay_saturates() {
    assert_eq!(backoff_delay(Duration::from_millis(1000), 0), Duration::from_millis(1000));
    assert_eq!(backoff_delay(Duration::from_millis(1000), 2), Duration::from_millis(4000));
    assert_eq!(backoff_delay(Duration::from_secs(1), 64), Duration::from_secs(1) * u32::MAX);
  }
}
