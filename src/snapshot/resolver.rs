//! Date to block resolution
//!
//! Binary search over block timestamps. Every remote lookup goes through
//! [`RetryingQuery`] so a flaky endpoint behaves the same here as during
//! the balance run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::BlockReference;
use super::error::{LedgerError, SnapshotError};
use super::retry::{RetryPolicy, RetryingQuery};

/// Block metadata needed to map a timestamp to a height
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_block(&self) -> Result<BlockReference, LedgerError>;

    /// Unix timestamp (seconds) of `block`
    async fn block_timestamp(&self, block: BlockReference) -> Result<i64, LedgerError>;
}

/// Which side of the target time to land on when no block matches exactly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolveMode {
    /// First block with timestamp >= target
    #[default]
    AtOrAfter,
    /// Last block with timestamp <= target
    AtOrBefore,
}

pub struct BlockResolver<'a, S: BlockSource + ?Sized> {
    source: &'a S,
    policy: RetryPolicy,
    cancel: CancellationToken,
    mode: ResolveMode,
}

impl<'a, S: BlockSource + ?Sized> BlockResolver<'a, S> {
    pub fn new(source: &'a S, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            source,
            policy,
            cancel,
            mode: ResolveMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    /// Resolve an RFC 3339 timestamp such as `2021-12-31T16:59:59Z`.
    pub async fn resolve_str(&self, at: &str) -> Result<BlockReference, SnapshotError> {
        let at = DateTime::parse_from_rfc3339(at)
            .map_err(|e| SnapshotError::Configuration(format!("invalid timestamp {}: {}", at, e)))?
            .with_timezone(&Utc);
        self.resolve(at).await
    }

    pub async fn resolve(&self, at: DateTime<Utc>) -> Result<BlockReference, SnapshotError> {
        let target = at.timestamp();
        let latest = self.latest().await?;
        let latest_ts = self.timestamp(latest).await?;

        if latest_ts < target {
            warn!(
                "Target {} is after the latest block {} ({}); using the latest block",
                at, latest, latest_ts
            );
            return Ok(latest);
        }

        // Smallest height whose timestamp is >= target
        let (mut lo, mut hi) = (0u64, latest.height());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let ts = self.timestamp(BlockReference(mid)).await?;
            debug!("Block {} has timestamp {} (target {})", mid, ts, target);
            if ts >= target {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        let first_at_or_after = BlockReference(lo);
        let block = match self.mode {
            ResolveMode::AtOrAfter => first_at_or_after,
            ResolveMode::AtOrBefore => {
                if lo == 0 || self.timestamp(first_at_or_after).await? == target {
                    first_at_or_after
                } else {
                    BlockReference(lo - 1)
                }
            }
        };

        info!("Resolved {} to block {}", at, block);
        Ok(block)
    }

    async fn latest(&self) -> Result<BlockReference, SnapshotError> {
        RetryingQuery::new(&self.policy, &self.cancel, "block", "latest", BlockReference(0))
            .run(|| self.source.latest_block())
            .await
    }

    async fn timestamp(&self, block: BlockReference) -> Result<i64, SnapshotError> {
        let label = format!("#{}", block);
        RetryingQuery::new(&self.policy, &self.cancel, "block timestamp", &label, block)
            .run(|| self.source.block_timestamp(block))
            .await
    }
}
