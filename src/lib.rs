//! ZeroCoin - a single-node ledger of signed transfers sealed by proof-of-work
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Block model, accounting, chain validation and the [`blockchain::Blockchain`] facade
//! - [`transaction`] - Canonical encoding, ledger lines and statements
//! - [`mempool`] - Pending ledger lines
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work nonce search
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1), wallet tags
//! - [`wallet`] - Wallet files
//!
//! ## Storage
//! - [`persistence`] - Named text documents on disk, in memory or in SQLite
//! - [`store`] - Block and mempool layout on top of a backend
//! - [`cache`] - Per-block balance cache
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - `cli` - Command-line surface (feature `cli`)

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;
pub mod wallet;

// ============================================================================
// Storage
// ============================================================================
pub mod cache;
pub mod persistence;
pub mod store;

// ============================================================================
// Configuration & Utilities
// ============================================================================
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;

pub use blockchain::{Block, Blockchain};
pub use error::{ChainError, Result};
