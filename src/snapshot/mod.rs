//! Balance Snapshot Module
//!
//! Fetches native and ERC-20 balances for a list of accounts at one
//! historical block:
//! - Token registry with configured precision per symbol
//! - Ledger client trait with an Ethereum JSON-RPC implementation
//! - Retry with backoff, transient/permanent classification and cancellation
//! - Sequential account loop with per-account concurrent fan-out
//! - Exact decimal normalization of uint256 amounts
//! - Date to block resolution

pub mod amount;
pub mod assembler;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod eth;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod retry;

// Re-exports for convenience
pub use amount::{NATIVE_DECIMALS, RawBalance, normalize, normalize_native};
pub use assembler::{Column, SnapshotAssembler, SnapshotTable};
pub use client::{Account, Asset, AssetQuery, BlockReference, LedgerClient};
pub use config::{AppConfig, LogConfig, RetryConfig, RpcConfig, SnapshotConfig, TokenEntry};
pub use engine::{BalanceRecord, BalanceSnapshotEngine, Snapshot};
pub use error::{LedgerError, SnapshotError};
pub use progress::{LogProgress, NoopProgress, ProgressSink};
pub use registry::{TokenDescriptor, TokenRegistry};
pub use resolver::{BlockResolver, BlockSource, ResolveMode};
pub use retry::{RetryPolicy, RetryingQuery};

// Ledger implementations
pub use eth::EthLedgerClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockLedger;
