//! Balance snapshot engine
//!
//! Accounts are processed strictly one after another. For each account one
//! query per tracked token plus one native query are dispatched together and
//! joined before the next account starts, so at most `tracked + 1` requests
//! are in flight and records come out in input order.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::amount::{NATIVE_DECIMALS, RawBalance, normalize};
use super::client::{Account, Asset, AssetQuery, BlockReference, LedgerClient};
use super::error::SnapshotError;
use super::progress::ProgressSink;
use super::registry::{TokenDescriptor, TokenRegistry};
use super::retry::{RetryPolicy, RetryingQuery};

/// Balances of one account at the snapshot block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub account: Account,
    pub native_amount: String,
    /// symbol -> decimal string
    pub token_amounts: BTreeMap<String, String>,
}

/// One record per input account, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub block: BlockReference,
    /// Tracked symbols in the order they were requested
    pub tracked: Vec<String>,
    pub records: Vec<BalanceRecord>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct BalanceSnapshotEngine<'a, C: LedgerClient + ?Sized> {
    client: &'a C,
    registry: &'a TokenRegistry,
    policy: RetryPolicy,
    cancel: CancellationToken,
    native_symbol: String,
    native_decimals: u32,
}

impl<'a, C: LedgerClient + ?Sized> BalanceSnapshotEngine<'a, C> {
    pub fn new(client: &'a C, registry: &'a TokenRegistry) -> Self {
        Self {
            client,
            registry,
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            native_symbol: "ETH".to_string(),
            native_decimals: NATIVE_DECIMALS,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token checked by every retry loop; cancel it to abort the run.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Name used for the native asset in diagnostics.
    pub fn with_native_symbol(mut self, symbol: &str) -> Self {
        self.native_symbol = symbol.to_string();
        self
    }

    /// Precision of the native asset; 18 (wei) unless the ledger differs.
    pub fn with_native_decimals(mut self, decimals: u32) -> Self {
        self.native_decimals = decimals;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch every tracked balance for every account at `block`.
    ///
    /// Unknown or repeated symbols fail before any remote call. Any query
    /// failure aborts the whole run; no partial snapshot is returned.
    pub async fn run<S, P>(
        &self,
        accounts: &[Account],
        tracked: &[S],
        block: BlockReference,
        progress: &mut P,
    ) -> Result<Snapshot, SnapshotError>
    where
        S: AsRef<str>,
        P: ProgressSink + ?Sized,
    {
        let tokens = self.registry.resolve(tracked)?;

        info!(
            accounts = accounts.len(),
            tokens = tokens.len(),
            block = block.height(),
            "Retrieving balances for {} addresses at block {}",
            accounts.len(),
            block
        );

        let mut records = Vec::with_capacity(accounts.len());
        for account in accounts {
            let record = self.fetch_account(account, &tokens, block).await?;
            debug!("Fetched {} balances for {}", tokens.len() + 1, account);
            records.push(record);
            progress.tick();
        }

        info!("Retrieved balances for {} addresses", records.len());

        Ok(Snapshot {
            block,
            tracked: tokens.into_iter().map(|t| t.symbol).collect(),
            records,
        })
    }

    /// Fan out all asset queries for one account and wait for every one.
    pub async fn fetch_account(
        &self,
        account: &Account,
        tokens: &[TokenDescriptor],
        block: BlockReference,
    ) -> Result<BalanceRecord, SnapshotError> {
        let token_queries = tokens.iter().map(|token| {
            self.fetch(AssetQuery {
                account,
                asset: Asset::Token(token),
                block,
            })
        });
        let native_query = self.fetch(AssetQuery {
            account,
            asset: Asset::Native,
            block,
        });

        let (token_balances, native_balance) =
            futures::try_join!(try_join_all(token_queries), native_query)?;

        let token_amounts = tokens
            .iter()
            .zip(&token_balances)
            .map(|(token, raw)| (token.symbol.clone(), normalize(raw, token.decimals)))
            .collect();

        Ok(BalanceRecord {
            account: account.clone(),
            native_amount: normalize(&native_balance, self.native_decimals),
            token_amounts,
        })
    }

    async fn fetch(&self, query: AssetQuery<'_>) -> Result<RawBalance, SnapshotError> {
        let asset = query.asset.label(&self.native_symbol);
        RetryingQuery::new(
            &self.policy,
            &self.cancel,
            asset,
            query.account.as_str(),
            query.block,
        )
        .run(|| query.fetch(self.client))
        .await
    }
}
