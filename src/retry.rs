//! Retry of transient failures
//!
//! The operation is handed the zero-based attempt index so it can change
//! strategy between calls; the downloader uses this to drop the logged-in
//! session on its retry.
//!
//! ```no_run
//! use instagram_scraper::config::RetryConfig;
//! use instagram_scraper::retry::with_retry;
//! use instagram_scraper::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let (body, calls) = with_retry(&RetryConfig::default(), |attempt| async move {
//!     if attempt == 0 {
//!         Err(Error::Connection("reset by peer".into()))
//!     } else {
//!         Ok(b"jpeg".to_vec())
//!     }
//! })
//! .await?;
//! assert_eq!(calls, 2);
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;

/// Classifies failures as transient (worth another attempt) or permanent
pub trait IsRetryable {
    /// Whether the same request may succeed if sent again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Connection(_) => true,
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            // The server answered; asking again gets the same answer
            Error::UnexpectedStatus { .. } => false,
            Error::Config { .. }
            | Error::TargetNotFound(_)
            | Error::TargetPrivateOrEmpty(_)
            | Error::AuthenticationFailed(_)
            | Error::ResolutionFailed { .. }
            | Error::InvalidResponse(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Pause schedule between attempts
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            next: config.initial_delay,
        }
    }

    /// The pause before the upcoming retry; advances the schedule
    fn pause(&mut self) -> Duration {
        let current = self.next;
        let grown = current.as_secs_f64() * self.config.backoff_multiplier.max(1.0);
        self.next = Duration::from_secs_f64(grown).min(self.config.max_delay);
        if self.config.jitter {
            add_jitter(current)
        } else {
            current
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of retries.
///
/// `operation` receives the zero-based attempt index. At most
/// `config.max_attempts` retries follow the first call, each after a pause.
/// Returns the value together with the number of calls made.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<(T, u32), E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut attempt: u32 = 0;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(calls = attempt + 1, "Succeeded on retry");
                }
                return Ok((value, attempt + 1));
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, "Permanent failure, not retrying");
            return Err(error);
        }
        if attempt >= config.max_attempts {
            tracing::warn!(error = %error, calls = attempt + 1, "Giving up after retries");
            return Err(error);
        }

        let pause = backoff.pause();
        attempt += 1;
        tracing::info!(
            error = %error,
            retry = attempt,
            pause_ms = pause.as_millis() as u64,
            "Transient failure, retrying"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        }
    }

    fn reset() -> Error {
        Error::Connection("reset by peer".into())
    }

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let (value, calls) = with_retry(&quick(1), |_| async { Ok::<_, Error>("body") })
            .await
            .unwrap();
        assert_eq!((value, calls), ("body", 1));
    }

    #[tokio::test]
    async fn attempt_index_is_passed_to_each_call() {
        let seen = Mutex::new(Vec::new());
        let result = with_retry(&quick(1), |attempt| {
            seen.lock().unwrap().push(attempt);
            async move { if attempt == 0 { Err(reset()) } else { Ok(7) } }
        })
        .await;

        assert_eq!(result.unwrap(), (7, 2));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[tokio::test]
    async fn default_config_retries_exactly_once() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(10),
            ..RetryConfig::default()
        };
        let calls = Mutex::new(0u32);
        let result = with_retry(&config, |_| {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>(reset()) }
        })
        .await;

        assert!(matches!(result, Err(Error::Connection(_))));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn permanent_failure_is_returned_immediately() {
        let calls = Mutex::new(0u32);
        let result = with_retry(&quick(3), |_| {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>(Error::TargetNotFound("ghost".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::TargetNotFound(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_call() {
        let calls = Mutex::new(0u32);
        let result = with_retry(&quick(0), |_| {
            *calls.lock().unwrap() += 1;
            async { Err::<(), _>(reset()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn pauses_before_retrying() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(50),
            ..quick(1)
        };
        let start = std::time::Instant::now();
        let _ = with_retry(&config, |_| async { Err::<(), _>(reset()) }).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(50), "waited {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[test]
    fn backoff_grows_up_to_the_cap() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        };
        let mut backoff = Backoff::new(&config);
        let pauses: Vec<_> = (0..4).map(|_| backoff.pause()).collect();
        assert_eq!(
            pauses,
            [1, 2, 3, 3].map(Duration::from_secs).to_vec()
        );
    }

    #[test]
    fn fixed_backoff_by_default() {
        let config = RetryConfig::default();
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.pause(), Duration::from_secs(5));
        assert_eq!(backoff.pause(), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(40);
        for _ in 0..100 {
            let stretched = add_jitter(delay);
            assert!(stretched >= delay && stretched <= delay * 2, "{stretched:?}");
        }
        assert_eq!(add_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn classification() {
        assert!(reset().is_retryable());
        assert!(Error::Io(std::io::Error::new(ErrorKind::TimedOut, "slow")).is_retryable());
        assert!(!Error::Io(std::io::Error::new(ErrorKind::PermissionDenied, "no")).is_retryable());
        assert!(
            !Error::UnexpectedStatus {
                status: 404,
                url: "https://cdn.example.com/x.jpg".into()
            }
            .is_retryable()
        );
        assert!(!Error::InvalidResponse("garbled".into()).is_retryable());
    }
}
