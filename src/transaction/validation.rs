/// Validation logic for statements separated from type definitions
use crate::crypto::{verify_signature, wallet_tag};
use crate::error::ChainError;
use crate::transaction::types::Statement;
use secp256k1::PublicKey;

/// Which admission path a statement takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Funding,
    Transfer,
}

impl Statement {
    /// Stateless checks that need neither keys nor ledger history.
    pub fn validate_shape(
        &self,
        issuer: &str,
        require_positive_amounts: bool,
    ) -> Result<StatementKind, ChainError> {
        if require_positive_amounts && self.record.amount == 0 {
            return Err(ChainError::MalformedStatement(
                "amount must be greater than zero".to_string(),
            ));
        }
        // Tags must not contain whitespace or the ledger line cannot be split back apart.
        for (label, tag) in [("From", &self.record.sender), ("To", &self.record.receiver)] {
            if tag.is_empty() || tag.chars().any(char::is_whitespace) {
                return Err(ChainError::MalformedStatement(format!(
                    "'{}' must be a single non-empty word, got '{}'",
                    label, tag
                )));
            }
        }
        if self.record.is_funding(issuer) {
            Ok(StatementKind::Funding)
        } else {
            Ok(StatementKind::Transfer)
        }
    }

    /// Checks the trailing hex signature against the canonical encoding of
    /// the statement's fields under `public_key`. The key must also belong to
    /// the wallet named in `From`.
    pub fn validate_signature(&self, public_key: &PublicKey) -> Result<(), ChainError> {
        let signature_hex = self
            .signature
            .as_deref()
            .ok_or_else(|| ChainError::InvalidSignature("statement is not signed".to_string()))?;

        let signature = hex::decode(signature_hex)
            .map_err(|e| ChainError::InvalidSignature(format!("signature is not hex: {}", e)))?;

        let signer = wallet_tag(public_key);
        if signer != self.record.sender {
            return Err(ChainError::InvalidSignature(format!(
                "wallet {} cannot sign for {}",
                signer, self.record.sender
            )));
        }

        let payload = self.record.signing_payload();
        verify_signature(&public_key.serialize(), payload.as_bytes(), &signature)
            .map_err(|e| ChainError::InvalidSignature(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    const ISSUER: &str = "ZALU";

    #[test]
    fn test_shape_classifies_funding() {
        let statement = Statement::funding(ISSUER, "abc", 10, "now");
        assert_eq!(statement.validate_shape(ISSUER, true).unwrap(), StatementKind::Funding);
    }

    #[test]
    fn test_zero_amount_rejected_only_when_required() {
        let statement = Statement::funding(ISSUER, "abc", 0, "now");
        assert!(statement.validate_shape(ISSUER, true).is_err());
        assert!(statement.validate_shape(ISSUER, false).is_ok());
    }

    #[test]
    fn test_tags_with_spaces_rejected() {
        let statement = Statement::funding(ISSUER, "a transferred 9 to b", 10, "now");
        assert!(matches!(
            statement.validate_shape(ISSUER, true),
            Err(ChainError::MalformedStatement(_))
        ));
    }

    #[test]
    fn test_valid_signature() {
        let keypair = KeyPair::generate().unwrap();
        let statement = Statement::signed_transfer(&keypair, "abc", 5, "now").unwrap();
        assert_eq!(statement.validate_shape(ISSUER, true).unwrap(), StatementKind::Transfer);
        assert!(statement.validate_signature(&keypair.public_key).is_ok());
    }

    #[test]
    fn test_tampered_fields_fail() {
        let keypair = KeyPair::generate().unwrap();
        let original = Statement::signed_transfer(&keypair, "abc", 5, "now").unwrap();

        let mut amount = original.clone();
        amount.record.amount = 50;
        let mut receiver = original.clone();
        receiver.record.receiver = "abd".to_string();
        let mut date = original.clone();
        date.record.timestamp = "later".to_string();

        for tampered in [amount, receiver, date] {
            let err = tampered.validate_signature(&keypair.public_key).unwrap_err();
            assert!(matches!(err, ChainError::InvalidSignature(_)));
        }
    }

    #[test]
    fn test_bad_hex_signature() {
        let keypair = KeyPair::generate().unwrap();
        let mut statement = Statement::signed_transfer(&keypair, "abc", 5, "now").unwrap();
        statement.signature = Some("not-hex".to_string());
        assert!(matches!(
            statement.validate_signature(&keypair.public_key),
            Err(ChainError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_missing_signature() {
        let keypair = KeyPair::generate().unwrap();
        let mut statement = Statement::signed_transfer(&keypair, "abc", 5, "now").unwrap();
        statement.signature = None;
        assert!(statement.validate_signature(&keypair.public_key).is_err());
    }

    #[test]
    fn test_signature_from_other_wallet_rejected() {
        let owner = KeyPair::generate().unwrap();
        let thief = KeyPair::generate().unwrap();

        let mut statement = Statement::signed_transfer(&thief, "abc", 5, "now").unwrap();
        statement.record.sender = owner.tag();
        let resigned = thief.sign(statement.record.signing_payload().as_bytes()).unwrap();
        statement.signature = Some(hex::encode(resigned));

        let err = statement.validate_signature(&thief.public_key).unwrap_err();
        assert!(err.to_string().contains("cannot sign for"));
    }
}
