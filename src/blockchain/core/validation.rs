use crate::error::ChainError;
use crate::store::LedgerStore;
use tracing::warn;

/// Walks the chain checking that every block declares the exact hash of its
/// predecessor's stored bytes. Proof-of-work is not re-derived here.
pub fn validate_chain(store: &LedgerStore) -> Result<bool, ChainError> {
    let Some(highest) = store.highest_block()? else {
        return Ok(true);
    };

    for number in 1..=highest {
        let declared = match store.read_block(number) {
            Ok(block) => block.previous_hash,
            Err(ChainError::InvalidBlock(msg)) => {
                warn!(block = number, %msg, "unreadable block");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let actual = store.hash_of_block(number - 1)?;
        if declared != actual {
            warn!(
                block = number,
                %declared,
                %actual,
                "predecessor hash mismatch"
            );
            return Ok(false);
        }
    }
    Ok(true)
}
