//! balance_snapshot - point-in-time ledger balance snapshots
//!
//! Fetches the native balance and a configurable set of ERC-20 balances
//! for every account in a list, all pinned to one historical block.
//!
//! # Modules
//!
//! - [`snapshot`] - Registry, ledger client, retry, engine and assembler
//! - [`csv_io`] - Account CSV loading and snapshot CSV writing
//! - [`logging`] - `tracing` subscriber setup

pub mod csv_io;
pub mod logging;
pub mod snapshot;

// Convenient re-exports at crate root
pub use snapshot::{
    Account, AppConfig, BalanceRecord, BalanceSnapshotEngine, BlockReference, BlockResolver,
    EthLedgerClient, LedgerClient, LedgerError, RawBalance, RetryPolicy, Snapshot,
    SnapshotAssembler, SnapshotError, TokenDescriptor, TokenRegistry,
};
