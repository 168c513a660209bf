//! Wallet files: a secp256k1 key pair stored as JSON.
//!
//! The ledger only ever sees a wallet through [`Wallet::public_key`],
//! [`Wallet::keypair`] (for signing) and [`Wallet::tag`].

use crate::crypto::{public_key_from_hex, public_key_to_hex, wallet_tag, KeyPair};
use crate::error::ChainError;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wallet {
    /// Compressed public key, lowercase hex
    pub public_key: String,
    /// Secret key, lowercase hex
    pub private_key: String,
}

impl Wallet {
    pub fn generate() -> Result<Self, ChainError> {
        let keypair = KeyPair::generate()?;
        Ok(Self::from_keypair(&keypair))
    }

    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Wallet {
            public_key: public_key_to_hex(&keypair.public_key),
            private_key: hex::encode(keypair.secret_key.secret_bytes()),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey, ChainError> {
        public_key_from_hex(&self.public_key)
    }

    /// Rebuilds the signing key pair. Fails when the stored halves disagree.
    pub fn keypair(&self) -> Result<KeyPair, ChainError> {
        let secret = hex::decode(self.private_key.trim())
            .map_err(|e| ChainError::WalletError(format!("Invalid hex private key: {}", e)))?;
        let keypair = KeyPair::from_secret_bytes(&secret)?;
        if keypair.public_key != self.public_key()? {
            return Err(ChainError::WalletError(
                "Private key does not match public key".to_string(),
            ));
        }
        Ok(keypair)
    }

    pub fn tag(&self) -> Result<String, ChainError> {
        Ok(wallet_tag(&self.public_key()?))
    }

    /// Save wallet to file with atomic write
    pub fn save(&self, path: &Path) -> Result<(), ChainError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::WalletError(format!("Failed to serialize wallet: {}", e)))?;

        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ChainError::WalletError(format!("Failed to create temp file: {}", e)))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ChainError::WalletError(format!("Failed to write wallet: {}", e)))?;
        file.sync_all()
            .map_err(|e| ChainError::WalletError(format!("Failed to sync file: {}", e)))?;
        drop(file);

        fs::rename(&temp_path, path)
            .map_err(|e| ChainError::WalletError(format!("Failed to finalize write: {}", e)))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ChainError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ChainError::WalletError(format!("Failed to read wallet {}: {}", path.display(), e))
        })?;
        let wallet: Wallet = serde_json::from_str(&contents)
            .map_err(|e| ChainError::WalletError(format!("Failed to parse wallet: {}", e)))?;
        wallet.public_key()?;
        Ok(wallet)
    }
}
