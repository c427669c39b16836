//! Bounded fixed-delay retry for provider calls.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ProviderSettings;
use crate::error::Result;

/// How often and how patiently a provider call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    max_attempts: u32,
    /// Pause between attempts.
    delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy; at least one attempt is always made.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay,
        }
    }

    /// Builds the policy configured for the provider: the first attempt
    /// plus `max_retries` retries.
    #[must_use]
    pub const fn from_settings(settings: &ProviderSettings) -> Self {
        Self::new(
            settings.max_retries.saturating_add(1),
            Duration::from_millis(settings.retry_delay_ms),
        )
    }

    /// A single attempt with no delay.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Total attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last error from `call`.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    if let Some(hint) = e.retry_delay_secs() {
                        debug!("{operation}: provider asked to wait {hint}s");
                    }
                    warn!(
                        "{operation} failed (attempt {attempt}/{}): {e}; retrying in {:?}",
                        self.max_attempts, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&ProviderSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BillingError, ProviderError};
    use crate::provider::{MockProductResource, ProductResource, RemoteProduct};
    use mockall::Sequence;

    fn product() -> RemoteProduct {
        RemoteProduct {
            id: "prod_1".into(),
            name: "Pro".into(),
            description: None,
            active: true,
            metadata: crate::config::Metadata::new(),
            tax_code: None,
            statement_descriptor: None,
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let mut mock = MockProductResource::new();
        let mut seq = Sequence::new();
        mock.expect_retrieve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::connection("reset").into()));
        mock.expect_retrieve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(ProviderError::RateLimited {
                    retry_after_secs: 1,
                }
                .into())
            });
        mock.expect_retrieve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(product()));

        let found = fast(3)
            .run("retrieve product", || mock.retrieve("prod_1"))
            .await
            .unwrap();
        assert_eq!(found.id, "prod_1");
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let mut mock = MockProductResource::new();
        mock.expect_retrieve().times(1).returning(|_| {
            Err(ProviderError::Authentication {
                message: "bad key".into(),
            }
            .into())
        });

        let err = fast(3)
            .run("retrieve product", || mock.retrieve("prod_1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Provider(ProviderError::Authentication { .. })
        ));
    }

    #[tokio::test]
    async fn test_surfaces_last_error_after_exhaustion() {
        let mut mock = MockProductResource::new();
        mock.expect_retrieve()
            .times(2)
            .returning(|_| Err(ProviderError::connection("timeout").into()));

        let err = fast(2)
            .run("retrieve product", || mock.retrieve("prod_1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_single_retry_survives_one_failure() {
        let settings = ProviderSettings {
            max_retries: 1,
            retry_delay_ms: 0,
            ..ProviderSettings::default()
        };
        let policy = RetryPolicy::from_settings(&settings);
        assert_eq!(policy.max_attempts(), 2);

        let mut mock = MockProductResource::new();
        let mut seq = Sequence::new();
        mock.expect_retrieve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::connection("reset").into()));
        mock.expect_retrieve()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(product()));

        let found = policy
            .run("retrieve product", || mock.retrieve("prod_1"))
            .await
            .unwrap();
        assert_eq!(found.id, "prod_1");
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let settings = ProviderSettings {
            max_retries: 0,
            ..ProviderSettings::default()
        };
        assert_eq!(RetryPolicy::from_settings(&settings).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_fixed_delay_between_attempts() {
        let mut mock = MockProductResource::new();
        mock.expect_retrieve()
            .times(3)
            .returning(|_| Err(ProviderError::connection("timeout").into()));

        let delay = Duration::from_millis(1500);
        let start = tokio::time::Instant::now();
        let err = RetryPolicy::new(3, delay)
            .run("retrieve product", || mock.retrieve("prod_1"))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        let elapsed = start.elapsed();
        assert!(elapsed >= delay * 2, "waited only {elapsed:?}");
        assert!(elapsed < delay * 2 + Duration::from_millis(10), "waited {elapsed:?}");
    }
}
