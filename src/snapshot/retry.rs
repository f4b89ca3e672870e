//! Retrying wrapper around a single ledger call
//!
//! Transient failures are retried after a fixed 5s pause with no attempt
//! ceiling by default; exponential backoff and a bound are opt-in.
//! Permanent failures surface immediately. Every remote call and every
//! pause races the run's cancellation token.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::client::BlockReference;
use super::error::{LedgerError, SnapshotError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Total attempts including the first one; `None` never gives up.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        multiplier: u32,
        max_attempts: Option<u32>,
    ) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            multiplier: multiplier.max(1),
            max_attempts: max_attempts.map(|n| n.max(1)),
        }
    }

    /// Same pause every time, no attempt ceiling.
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1, None)
    }

    /// Pause after the `failures`-th consecutive failure (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have failed.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }
}

/// Fixed 5s pause, retried until the call succeeds or the run is cancelled.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

/// Retry context for one (asset, account, block) query.
///
/// `account` is only used for diagnostics, so block lookups pass a label
/// such as `#13916166` instead of an address.
pub struct RetryingQuery<'a> {
    policy: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    asset: &'a str,
    account: &'a str,
    block: BlockReference,
}

impl<'a> RetryingQuery<'a> {
    pub fn new(
        policy: &'a RetryPolicy,
        cancel: &'a CancellationToken,
        asset: &'a str,
        account: &'a str,
        block: BlockReference,
    ) -> Self {
        Self {
            policy,
            cancel,
            asset,
            account,
            block,
        }
    }

    /// Run `op` until it succeeds, fails permanently, runs out of attempts
    /// or the token is cancelled.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, SnapshotError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SnapshotError::Cancelled),
                result = op() => result,
            };

            let message = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            asset = self.asset,
                            account = self.account,
                            block = self.block.height(),
                            attempt,
                            "Fetched {} balance for {} after {} attempts",
                            self.asset,
                            self.account,
                            attempt
                        );
                    }
                    return Ok(value);
                }
                Err(LedgerError::Permanent(message)) => {
                    error!(
                        asset = self.asset,
                        account = self.account,
                        block = self.block.height(),
                        error = %message,
                        "Permanent error fetching {} balance for {}",
                        self.asset,
                        self.account
                    );
                    return Err(SnapshotError::Permanent {
                        asset: self.asset.to_string(),
                        account: self.account.to_string(),
                        block: self.block.height(),
                        message,
                    });
                }
                Err(LedgerError::Transient(message)) => message,
            };

            if !self.policy.allows_retry(attempt) {
                error!(
                    asset = self.asset,
                    account = self.account,
                    block = self.block.height(),
                    attempt,
                    error = %message,
                    "Giving up on {} balance for {}",
                    self.asset,
                    self.account
                );
                return Err(SnapshotError::RetriesExhausted {
                    asset: self.asset.to_string(),
                    account: self.account.to_string(),
                    block: self.block.height(),
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                asset = self.asset,
                account = self.account,
                block = self.block.height(),
                attempt,
                error = %message,
                "Error fetching {} balance for {} at block {}: {}. Pausing {:?} before retrying",
                self.asset,
                self.account,
                self.block,
                message,
                delay
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SnapshotError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn account() -> String {
        "0xd8da6bf26964af9d7eed9e03e53415d37aa96045".to_string()
    }

    /// Fails transiently `failures` times, then returns 7.
    fn flaky(
        failures: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u64, LedgerError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < failures {
                std::future::ready(Err(LedgerError::Transient(format!("rate limited #{n}"))))
            } else {
                std::future::ready(Ok(7))
            }
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::new(
            Duration::from_millis(100),
            Duration::from_millis(500),
            2,
            Some(10),
        );
        let delays: Vec<_> = (1..=5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[3], Duration::from_millis(500));
        assert_eq!(delays[4], Duration::from_millis(500));
        assert_eq!(policy.delay_for(200), Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_policy_never_gives_up() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(50), Duration::from_secs(5));
        assert!(policy.allows_retry(u32::MAX - 1));
    }

    #[test]
    fn test_default_policy_is_fixed_and_unbounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy, RetryPolicy::fixed(Duration::from_secs(5)));
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
        assert!(policy.allows_retry(1_000));
    }

    #[test]
    fn test_new_clamps_inputs() {
        let policy = RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(1), 0, Some(0));
        assert_eq!(policy.max_delay, Duration::from_secs(2));
        assert_eq!(policy.multiplier, 1);
        assert_eq!(policy.max_attempts, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_k_failures_cause_k_waits() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let account = account();

        for k in [0u32, 1, 3, 12] {
            let calls = Arc::new(AtomicU32::new(0));
            let query = RetryingQuery::new(&policy, &cancel, "USDT", account.as_str(), BlockReference(1));

            let start = Instant::now();
            let value = query.run(flaky(k, calls.clone())).await.unwrap();

            assert_eq!(value, 7);
            assert_eq!(calls.load(Ordering::SeqCst), k + 1);
            assert_eq!(start.elapsed(), Duration::from_secs(5) * k);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let account = account();
        let calls = AtomicU32::new(0);

        let query = RetryingQuery::new(&policy, &cancel, "ETH", account.as_str(), BlockReference(9));
        let err = query
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::ready(Err::<u64, _>(LedgerError::Permanent(
                    "invalid argument".to_string(),
                )))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            SnapshotError::Permanent { asset, block, .. } => {
                assert_eq!(asset, "ETH");
                assert_eq!(block, 9);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts() {
        let policy = RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(4), 2, Some(4));
        let cancel = CancellationToken::new();
        let account = account();
        let calls = Arc::new(AtomicU32::new(0));

        let query = RetryingQuery::new(&policy, &cancel, "DAI", account.as_str(), BlockReference(1));
        let start = Instant::now();
        let err = query.run(flaky(100, calls.clone())).await.unwrap_err();

        assert!(matches!(err, SnapshotError::RetriesExhausted { attempts: 4, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1 + 2 + 4 seconds between the four attempts
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_unbounded_retry() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let account = account();
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(23)).await;
            canceller.cancel();
        });

        let query = RetryingQuery::new(&policy, &cancel, "USDT", account.as_str(), BlockReference(1));
        let err = query.run(flaky(u32::MAX, calls.clone())).await.unwrap_err();

        assert!(matches!(err, SnapshotError::Cancelled));
        // attempts at t = 0, 5, 10, 15, 20
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_skips_call() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let account = account();
        let calls = Arc::new(AtomicU32::new(0));

        let query = RetryingQuery::new(&policy, &cancel, "USDT", account.as_str(), BlockReference(1));
        let err = query.run(flaky(0, calls.clone())).await.unwrap_err();

        assert!(matches!(err, SnapshotError::Cancelled));
        // select! builds every arm before polling, so the closure has run once
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
