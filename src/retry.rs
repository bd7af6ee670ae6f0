use log::{error, warn};
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::error::Error;
use crate::snapshot::{ResourceIdentity, Snapshot, SnapshotFetcher};

/// Bounds for the acquisition step: how often to retry, how long to back off,
/// and an upper-bound timeout around each attempt so a hung fetch cannot
/// stall the schedule indefinitely.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Fetches a snapshot, retrying failed attempts with linear backoff
/// (`base_delay * attempt_number`). Attempts are independent; no state is
/// carried between them. After exhausting the retries the last cause is
/// propagated inside [`Error::Acquisition`].
pub async fn fetch_with_retry(
    fetcher: &dyn SnapshotFetcher,
    identity: &ResourceIdentity,
    policy: &RetryPolicy,
) -> Result<Snapshot, Error> {
    let timeout_ms = u64::try_from(policy.attempt_timeout.as_millis()).unwrap_or(u64::MAX);
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let outcome = match timeout(
            policy.attempt_timeout,
            fetcher.fetch(identity, policy.attempt_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout_ms)),
        };

        match outcome {
            Ok(snapshot) => return Ok(snapshot),
            Err(cause) => {
                if attempt > policy.max_retries {
                    error!(
                        "acquisition for {} failed after {attempt} attempt(s): {cause}",
                        identity.url
                    );
                    return Err(Error::Acquisition {
                        attempts: attempt,
                        cause: Box::new(cause),
                    });
                }

                warn!(
                    "acquisition attempt {attempt}/{} for {} failed: {cause}",
                    policy.total_attempts(),
                    identity.url
                );
                sleep(policy.base_delay * attempt).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ElementCapture;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity() -> ResourceIdentity {
        ResourceIdentity::new("https://example.com", "#price")
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(250),
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new(vec![ElementCapture {
            tag: "div".to_string(),
            text: "content".to_string(),
            attributes: vec![],
            child_count: 0,
        }])
    }

    /// Fails every attempt until `succeed_on`, then returns a snapshot.
    struct FlakyFetcher {
        succeed_on: usize,
        calls: AtomicUsize,
    }

    impl FlakyFetcher {
        fn failing() -> Self {
            Self {
                succeed_on: usize::MAX,
                calls: AtomicUsize::new(0),
            }
        }

        fn succeeding_on(succeed_on: usize) -> Self {
            Self {
                succeed_on,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SnapshotFetcher for FlakyFetcher {
        async fn fetch(
            &self,
            _identity: &ResourceIdentity,
            _timeout: Duration,
        ) -> Result<Snapshot, Error> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(snapshot())
            } else {
                Err(Error::HttpStatus(503))
            }
        }
    }

    /// Never completes within the attempt timeout.
    struct HangingFetcher;

    #[async_trait]
    impl SnapshotFetcher for HangingFetcher {
        async fn fetch(
            &self,
            _identity: &ResourceIdentity,
            _timeout: Duration,
        ) -> Result<Snapshot, Error> {
            sleep(Duration::from_secs(3600)).await;
            Ok(snapshot())
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_retry() {
        let fetcher = FlakyFetcher::succeeding_on(1);
        let result = fetch_with_retry(&fetcher, &identity(), &policy(3)).await;

        assert!(result.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let fetcher = FlakyFetcher::succeeding_on(3);
        let result = fetch_with_retry(&fetcher, &identity(), &policy(3)).await;

        assert!(result.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_makes_initial_plus_max_retries_attempts() {
        let fetcher = FlakyFetcher::failing();
        let result = fetch_with_retry(&fetcher, &identity(), &policy(2)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        match result {
            Err(Error::Acquisition { attempts, cause }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*cause, Error::HttpStatus(503)));
            }
            other => panic!("expected acquisition failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_retries_means_one_attempt() {
        let fetcher = FlakyFetcher::failing();
        let result = fetch_with_retry(&fetcher, &identity(), &policy(0)).await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::Acquisition { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_hung_attempt_is_bounded_by_timeout() {
        let policy = RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(20),
        };
        let result = fetch_with_retry(&HangingFetcher, &identity(), &policy).await;

        match result {
            Err(Error::Acquisition { attempts, cause }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(*cause, Error::Timeout(20)));
            }
            other => panic!("expected acquisition failure, got {other:?}"),
        }
    }
}
