//! Ledger store: blocks and the mempool on top of a [`Persistence`] backend.
//!
//! Nothing else in the crate knows how blocks are named or laid out in storage.

use crate::blockchain::Block;
use crate::crypto::sha256_hex;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::persistence::{LedgerLock, Persistence};

pub const MEMPOOL_NAME: &str = "mempool.txt";

pub fn block_name(number: u64) -> String {
    format!("block_{number}.txt")
}

pub struct LedgerStore {
    backend: Box<dyn Persistence>,
}

impl LedgerStore {
    pub fn new(backend: Box<dyn Persistence>) -> Self {
        LedgerStore { backend }
    }

    /// Exclusive write lock over the whole ledger, across handles and processes.
    pub fn lock(&self) -> Result<LedgerLock, ChainError> {
        self.backend.lock()
    }

    pub fn block_exists(&self, number: u64) -> Result<bool, ChainError> {
        self.backend.exists(&block_name(number))
    }

    /// Highest block number with no gap below it, or `None` without a genesis block.
    pub fn highest_block(&self) -> Result<Option<u64>, ChainError> {
        let mut highest = None;
        let mut next = 0u64;
        while self.block_exists(next)? {
            highest = Some(next);
            next += 1;
        }
        Ok(highest)
    }

    /// `0..=N` for the contiguous run of blocks starting at genesis.
    pub fn list_block_numbers(&self) -> Result<Vec<u64>, ChainError> {
        Ok(match self.highest_block()? {
            Some(highest) => (0..=highest).collect(),
            None => Vec::new(),
        })
    }

    /// Number the next sealed block will take.
    pub fn next_block_number(&self) -> Result<u64, ChainError> {
        Ok(self.highest_block()?.map_or(0, |highest| highest + 1))
    }

    /// Exact stored bytes of block `number`.
    pub fn read_block_bytes(&self, number: u64) -> Result<Vec<u8>, ChainError> {
        self.backend
            .load_bytes(&block_name(number))?
            .ok_or(ChainError::MissingPredecessor(number))
    }

    /// Stored text of block `number`. Bytes that are not UTF-8 make the block invalid.
    pub fn read_block_text(&self, number: u64) -> Result<String, ChainError> {
        String::from_utf8(self.read_block_bytes(number)?).map_err(|e| {
            ChainError::InvalidBlock(format!("block {}: not valid UTF-8: {}", number, e))
        })
    }

    pub fn read_block(&self, number: u64) -> Result<Block, ChainError> {
        Block::parse(&self.read_block_text(number)?).map_err(|e| match e {
            ChainError::InvalidBlock(msg) => ChainError::InvalidBlock(format!("block {}: {}", number, msg)),
            other => other,
        })
    }

    /// Persists `block` as block `number`. Blocks are append-only: an existing
    /// block is never replaced and block `number - 1` must already exist.
    pub fn write_block(&self, number: u64, block: &Block) -> Result<(), ChainError> {
        if number > 0 && !self.block_exists(number - 1)? {
            return Err(ChainError::MissingPredecessor(number - 1));
        }
        self.backend.create(&block_name(number), &block.serialize())
    }

    /// SHA-256 over the stored bytes of block `number`.
    pub fn hash_of_block(&self, number: u64) -> Result<String, ChainError> {
        Ok(sha256_hex(&self.read_block_bytes(number)?))
    }

    pub fn read_mempool(&self) -> Result<Mempool, ChainError> {
        Ok(self
            .backend
            .load(MEMPOOL_NAME)?
            .map(|contents| Mempool::parse(&contents))
            .unwrap_or_default())
    }

    pub fn append_mempool(&self, line: &str) -> Result<(), ChainError> {
        self.backend.append(MEMPOOL_NAME, &format!("{line}\n"))
    }

    pub fn clear_mempool(&self) -> Result<(), ChainError> {
        self.backend.remove(MEMPOOL_NAME)
    }

    /// Removes the first `count` mempool lines, keeping anything appended after
    /// them. The entry is deleted once nothing remains.
    pub fn drain_mempool(&self, count: usize) -> Result<(), ChainError> {
        self.backend.update(MEMPOOL_NAME, &mut |contents| {
            let mut mempool = Mempool::parse(contents.as_deref().unwrap_or_default());
            mempool.drain_front(count);
            (!mempool.is_empty()).then(|| mempool.render())
        })
    }
}
