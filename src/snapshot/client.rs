use async_trait::async_trait;
use std::fmt;

use super::amount::RawBalance;
use super::error::LedgerError;
use super::registry::{TokenDescriptor, is_hex_address};

/// Lowercased ledger address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Account(String);

impl Account {
    /// Trim and lowercase. No shape check; see [`Account::parse`].
    pub fn new(address: &str) -> Self {
        Self(address.trim().to_lowercase())
    }

    /// Normalize and require `0x` + 40 hex digits.
    pub fn parse(address: &str) -> Option<Self> {
        let account = Self::new(address);
        is_hex_address(&account.0).then_some(account)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Historical ledger height shared by every query in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockReference(pub u64);

impl BlockReference {
    pub fn height(self) -> u64 {
        self.0
    }

    /// JSON-RPC `blockTag` form
    pub fn to_block_tag(self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl fmt::Display for BlockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a single query asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset<'a> {
    Native,
    Token(&'a TokenDescriptor),
}

impl Asset<'_> {
    /// Label used in diagnostics
    pub fn label<'s>(&'s self, native_symbol: &'s str) -> &'s str {
        match self {
            Asset::Native => native_symbol,
            Asset::Token(token) => &token.symbol,
        }
    }
}

/// One pending (account, asset, block) lookup
#[derive(Debug, Clone)]
pub struct AssetQuery<'a> {
    pub account: &'a Account,
    pub asset: Asset<'a>,
    pub block: BlockReference,
}

impl AssetQuery<'_> {
    pub async fn fetch<C: LedgerClient + ?Sized>(&self, client: &C) -> Result<RawBalance, LedgerError> {
        match self.asset {
            Asset::Native => client.get_native_balance(self.account, self.block).await,
            Asset::Token(token) => {
                client
                    .get_token_balance(&token.contract_id, self.account, self.block)
                    .await
            }
        }
    }
}

/// Balance lookups against a ledger at a fixed historical block
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Native currency balance (wei)
    async fn get_native_balance(
        &self,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError>;

    /// ERC-20 `balanceOf(account)` on `contract_id`
    async fn get_token_balance(
        &self,
        contract_id: &str,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError>;
}

#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for std::sync::Arc<T> {
    async fn get_native_balance(
        &self,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        (**self).get_native_balance(account, block).await
    }

    async fn get_token_balance(
        &self,
        contract_id: &str,
        account: &Account,
        block: BlockReference,
    ) -> Result<RawBalance, LedgerError> {
        (**self).get_token_balance(contract_id, account, block).await
    }
}
