//! In-memory ledger for tests and dry runs
//!
//! Balances, per-query latency and scripted failures are configured up
//! front; every call is counted so tests can check that nothing reached
//! the "remote" side.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::amount::RawBalance;
use super::client::{Account, BlockReference, LedgerClient};
use super::error::LedgerError;

/// Key for the native asset in the mock tables
pub const NATIVE_KEY: &str = "native";

type Key = (String, String);

#[derive(Debug, Default)]
pub struct MockLedger {
    balances: HashMap<Key, RawBalance>,
    delays: HashMap<Key, Duration>,
    /// Remaining transient failures per key
    transient_failures: Mutex<HashMap<Key, u32>>,
    permanent_accounts: Vec<String>,
    expected_block: Option<BlockReference>,
    calls: AtomicUsize,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject queries made at any other block.
    pub fn expect_block(mut self, block: BlockReference) -> Self {
        self.expected_block = Some(block);
        self
    }

    pub fn with_native(mut self, account: &str, raw: impl Into<RawBalance>) -> Self {
        self.balances.insert(key(account, NATIVE_KEY), raw.into());
        self
    }

    pub fn with_token(mut self, contract_id: &str, account: &str, raw: impl Into<RawBalance>) -> Self {
        self.balances.insert(key(account, contract_id), raw.into());
        self
    }

    /// Delay one (account, asset) query; `asset` is a contract id or [`NATIVE_KEY`].
    pub fn with_delay(mut self, account: &str, asset: &str, delay: Duration) -> Self {
        self.delays.insert(key(account, asset), delay);
        self
    }

    /// Fail the next `times` queries for (account, asset) with a transient error.
    pub fn with_transient_failures(mut self, account: &str, asset: &str, times: u32) -> Self {
        if let Ok(failures) = self.transient_failures.get_mut() {
            failures.insert(key(account, asset), times);
        }
        self
    }

    /// Every query for `account` fails permanently.
    pub fn with_permanent_failure(mut self, account: &str) -> Self {
        self.permanent_accounts.push(account.to_lowercase());
        self
    }

    /// Total queries received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn lookup(
        &self,
        account: &Account,
        asset: &str,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = key(account.as_str(), asset);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(expected) = self.expected_block
            && expected != block
        {
            return Err(LedgerError::Permanent(format!(
                "queried block {} but snapshot is at {}",
                block, expected
            )));
        }

        if self.permanent_accounts.iter().any(|a| a == account.as_str()) {
            return Err(LedgerError::Permanent(format!(
                "invalid argument: bad address {}",
                account
            )));
        }

        let should_fail = match self.transient_failures.lock() {
            Ok(mut failures) => match failures.get_mut(&key) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };
        if should_fail {
            return Err(LedgerError::Transient("429 Too Many Requests".to_string()));
        }

        Ok(self.balances.get(&key).cloned().unwrap_or_default())
    }
}

fn key(account: &str, asset: &str) -> Key {
    (account.to_lowercase(), asset.to_lowercase())
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_native_balance(
        &self,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        self.lookup(account, NATIVE_KEY, block).await
    }

    async fn get_token_balance(
        &self,
        contract_id: &str,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        self.lookup(account, contract_id, block).await
    }
}
