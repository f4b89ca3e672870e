//! Token registry
//!
//! Maps a token symbol to its contract address and decimal precision.
//! Precision always comes from configuration; nothing here looks at the
//! symbol name to decide how many decimals a token has.

use std::collections::{BTreeMap, HashSet};

use super::config::TokenEntry;
use super::error::SnapshotError;

/// Immutable description of one tracked ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub symbol: String,
    /// Lowercase `0x`-prefixed contract address
    pub contract_id: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, TokenDescriptor>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `tokens:` table of the config file.
    pub fn from_entries(entries: &BTreeMap<String, TokenEntry>) -> Result<Self, SnapshotError> {
        let mut registry = Self::new();
        for (symbol, entry) in entries {
            registry.insert(symbol, &entry.address, entry.decimals)?;
        }
        Ok(registry)
    }

    pub fn insert(
        &mut self,
        symbol: &str,
        contract_id: &str,
        decimals: u32,
    ) -> Result<(), SnapshotError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(SnapshotError::Configuration(
                "token symbol must not be empty".to_string(),
            ));
        }
        if !is_hex_address(contract_id) {
            return Err(SnapshotError::Configuration(format!(
                "token {symbol}: invalid contract address {contract_id}"
            )));
        }
        if self.tokens.contains_key(symbol) {
            return Err(SnapshotError::Configuration(format!(
                "token {symbol} is defined twice"
            )));
        }

        self.tokens.insert(
            symbol.to_string(),
            TokenDescriptor {
                symbol: symbol.to_string(),
                contract_id: contract_id.to_lowercase(),
                decimals,
            },
        );
        Ok(())
    }

    pub fn describe(&self, symbol: &str) -> Result<&TokenDescriptor, SnapshotError> {
        self.tokens
            .get(symbol)
            .ok_or_else(|| SnapshotError::UnknownSymbol(symbol.to_string()))
    }

    /// Resolve the tracked symbol list, keeping the caller's order.
    ///
    /// Fails on the first unknown or repeated symbol.
    pub fn resolve<S: AsRef<str>>(&self, tracked: &[S]) -> Result<Vec<TokenDescriptor>, SnapshotError> {
        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(tracked.len());
        for symbol in tracked {
            let symbol = symbol.as_ref();
            if !seen.insert(symbol) {
                return Err(SnapshotError::Configuration(format!(
                    "token {symbol} is tracked twice"
                )));
            }
            descriptors.push(self.describe(symbol)?.clone());
        }
        Ok(descriptors)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tokens.keys().map(String::as_str)
    }
}

/// `0x` followed by exactly 40 hex digits, any case.
pub fn is_hex_address(value: &str) -> bool {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(digits) => digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
