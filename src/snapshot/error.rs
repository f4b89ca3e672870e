use thiserror::Error;

/// Failure reported by a [`LedgerClient`](super::client::LedgerClient) call.
///
/// Classification happens at the boundary so the retry loop never has to
/// inspect error messages.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Network, rate-limit or node-sync problem; worth retrying.
    #[error("transient ledger error: {0}")]
    Transient(String),

    /// Malformed request or undecodable result; retrying cannot help.
    #[error("permanent ledger error: {0}")]
    Permanent(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            LedgerError::Transient(msg) | LedgerError::Permanent(msg) => msg,
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown token symbol: {0}")]
    UnknownSymbol(String),

    #[error("Permanent failure fetching {asset} for {account} at block {block}: {message}")]
    Permanent {
        asset: String,
        account: String,
        block: u64,
        message: String,
    },

    #[error("Gave up fetching {asset} for {account} at block {block} after {attempts} attempts: {message}")]
    RetriesExhausted {
        asset: String,
        account: String,
        block: u64,
        attempts: u32,
        message: String,
    },

    #[error("Snapshot run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    /// Unknown symbols are a configuration problem from the caller's point of view.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SnapshotError::Configuration(_) | SnapshotError::UnknownSymbol(_)
        )
    }
}
