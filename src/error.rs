//! Error types for ZeroCoin

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    MalformedStatement(String),
    InvalidSignature(String),
    InsufficientFunds {
        sender: String,
        balance: i128,
        requested: u64,
    },
    AlreadyExists(String),
    MissingPredecessor(u64),
    IoError(String),
    DatabaseError(String),
    InvalidBlock(String),
    MalformedLedgerLine(String),
    /// Block was persisted but its lines could not be removed from the mempool.
    MempoolNotDrained {
        block: u64,
        reason: String,
    },
    CryptoError(String),
    WalletError(String),
    ConfigError(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::MalformedStatement(msg) => write!(f, "Malformed statement: {}", msg),
            ChainError::InvalidSignature(msg) => write!(f, "Invalid signature: {}", msg),
            ChainError::InsufficientFunds {
                sender,
                balance,
                requested,
            } => write!(
                f,
                "Insufficient funds: {} holds {} but requested {}",
                sender, balance, requested
            ),
            ChainError::AlreadyExists(name) => write!(f, "Already exists: {}", name),
            ChainError::MissingPredecessor(n) => write!(f, "Missing predecessor: block {} does not exist", n),
            ChainError::IoError(msg) => write!(f, "IO error: {}", msg),
            ChainError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ChainError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            ChainError::MalformedLedgerLine(line) => write!(f, "Malformed ledger line: {}", line),
            ChainError::MempoolNotDrained { block, reason } => write!(
                f,
                "Block {} was sealed but its lines are still in the mempool ({}); remove them from the mempool by hand",
                block, reason
            ),
            ChainError::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            ChainError::WalletError(msg) => write!(f, "Wallet error: {}", msg),
            ChainError::ConfigError(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::WalletError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

impl From<secp256k1::Error> for ChainError {
    fn from(err: secp256k1::Error) -> Self {
        ChainError::CryptoError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = ChainError::InsufficientFunds {
            sender: "abc".to_string(),
            balance: 100,
            requested: 1000,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: abc holds 100 but requested 1000"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChainError = io.into();
        assert!(matches!(err, ChainError::IoError(_)));
    }
}
