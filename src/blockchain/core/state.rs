use crate::cache::BlockStateCache;
use crate::error::ChainError;
use crate::store::LedgerStore;
use crate::transaction::TransactionLine;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::chain::Block;

/// Net balance change per wallet tag over some run of ledger lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub balances: HashMap<String, i128>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_balance(&self, tag: &str) -> i128 {
        self.balances.get(tag).copied().unwrap_or(0)
    }

    /// Credits the receiver and debits the sender of a parsed line. Lines that
    /// do not parse are skipped, or rejected when `strict`.
    pub fn apply_line(&mut self, line: &TransactionLine, strict: bool) -> Result<(), ChainError> {
        match line {
            TransactionLine::Transfer(record) => {
                let amount = i128::from(record.amount);
                *self.balances.entry(record.receiver.clone()).or_insert(0) += amount;
                *self.balances.entry(record.sender.clone()).or_insert(0) -= amount;
                Ok(())
            }
            TransactionLine::Unparsed(raw) if strict => {
                Err(ChainError::MalformedLedgerLine(raw.clone()))
            }
            TransactionLine::Unparsed(raw) => {
                if !raw.trim().is_empty() {
                    debug!(line = %raw, "skipping unparseable ledger line");
                }
                Ok(())
            }
        }
    }

    pub fn from_lines<'a>(
        lines: impl IntoIterator<Item = &'a str>,
        strict: bool,
    ) -> Result<Self, ChainError> {
        let mut state = LedgerState::new();
        for line in lines {
            state.apply_line(&TransactionLine::parse(line.trim()), strict)?;
        }
        Ok(state)
    }

    /// Folds another state into this one.
    pub fn merge(&mut self, other: &LedgerState) {
        for (tag, delta) in &other.balances {
            *self.balances.entry(tag.clone()).or_insert(0) += delta;
        }
    }
}

/// Ledger state contributed by sealed block `number`.
///
/// In lenient mode a block whose layout does not parse still contributes
/// every line between its first and last line, and undecodable bytes are
/// replaced rather than rejected.
pub fn block_state(store: &LedgerStore, number: u64, strict: bool) -> Result<LedgerState, ChainError> {
    let text = if strict {
        store.read_block_text(number)?
    } else {
        String::from_utf8_lossy(&store.read_block_bytes(number)?).into_owned()
    };
    match Block::parse(&text) {
        Ok(block) => LedgerState::from_lines(block.lines.iter().map(String::as_str), strict),
        Err(e) if strict => Err(e),
        Err(e) => {
            warn!(block = number, error = %e, "block layout invalid, replaying raw lines");
            let lines: Vec<&str> = text.lines().collect();
            let inner = if lines.len() > 2 { &lines[1..lines.len() - 1] } else { &[][..] };
            LedgerState::from_lines(inner.iter().copied(), strict)
        }
    }
}

/// Replays blocks `1..=highest` and then the mempool into one state.
/// Genesis contributes nothing.
pub fn replay_state(
    store: &LedgerStore,
    strict: bool,
    cache: &BlockStateCache,
) -> Result<LedgerState, ChainError> {
    let mut state = LedgerState::new();
    if let Some(highest) = store.highest_block()? {
        for number in 1..=highest {
            let block = cache.get_or_try_insert(number, || {
                block_state(store, number, strict).map(Arc::new)
            })?;
            state.merge(&block);
        }
    }

    let mempool = store.read_mempool()?;
    state.merge(&LedgerState::from_lines(
        mempool.lines().iter().map(String::as_str),
        strict,
    )?);
    Ok(state)
}

/// Balance of `tag` over the whole chain plus the pending mempool.
pub fn balance_of(
    store: &LedgerStore,
    tag: &str,
    strict: bool,
    cache: &BlockStateCache,
) -> Result<i128, ChainError> {
    Ok(replay_state(store, strict, cache)?.get_balance(tag))
}
