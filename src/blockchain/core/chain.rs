use crate::cache::BlockStateCache;
use crate::config::{BackendKind, Config};
use crate::crypto::sha256_hex;
use crate::error::ChainError;
use crate::miner::{CancelFlag, Miner, Solution, MAX_DIFFICULTY};
use crate::persistence::{Database, FilePersistence, InMemoryPersistence, Persistence};
use crate::store::{block_name, LedgerStore};
use crate::transaction::{Statement, StatementKind, TransactionRecord};
use secp256k1::PublicKey;
use tracing::{debug, info, warn};

use super::state::{balance_of, replay_state, LedgerState};
use super::validation::validate_chain;

/// Predecessor placeholder stored in the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Body text of the genesis block. It is not a ledger line.
pub const GENESIS_MOTTO: &str =
    "In the beginning, there was Zerocoin - forged in the digital realm where trust meets cryptography.";

const NONCE_LABEL: &str = "nonce: ";

/// A block as stored: predecessor hash, blank line, body lines, blank line, nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub previous_hash: String,
    pub lines: Vec<String>,
    pub nonce: u64,
}

impl Block {
    pub fn new(previous_hash: impl Into<String>, lines: Vec<String>, nonce: u64) -> Self {
        Block {
            previous_hash: previous_hash.into(),
            lines,
            nonce,
        }
    }

    pub fn genesis() -> Self {
        Block::new(GENESIS_PREVIOUS_HASH, vec![GENESIS_MOTTO.to_string()], 0)
    }

    /// Everything up to and including `"nonce: "`. Appending the decimal nonce
    /// yields the serialized block.
    pub fn sealing_prefix(previous_hash: &str, lines: &[String]) -> String {
        let mut prefix = format!("{previous_hash}\n\n");
        for line in lines {
            prefix.push_str(line);
            prefix.push('\n');
        }
        prefix.push('\n');
        prefix.push_str(NONCE_LABEL);
        prefix
    }

    /// Exact stored text. No trailing newline.
    pub fn serialize(&self) -> String {
        format!(
            "{}{}",
            Self::sealing_prefix(&self.previous_hash, &self.lines),
            self.nonce
        )
    }

    pub fn hash(&self) -> String {
        sha256_hex(self.serialize().as_bytes())
    }

    /// Parses stored block text. A single trailing newline is tolerated.
    pub fn parse(text: &str) -> Result<Self, ChainError> {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        if lines.len() < 4 {
            return Err(ChainError::InvalidBlock(format!(
                "expected at least 4 lines, found {}",
                lines.len()
            )));
        }
        let last = lines.len() - 1;
        if !lines[1].trim().is_empty() || !lines[last - 1].trim().is_empty() {
            return Err(ChainError::InvalidBlock(
                "missing blank separator line".to_string(),
            ));
        }

        let nonce = lines[last]
            .trim()
            .strip_prefix(NONCE_LABEL)
            .and_then(|n| n.parse::<u64>().ok())
            .ok_or_else(|| ChainError::InvalidBlock(format!("bad nonce line '{}'", lines[last])))?;

        Ok(Block {
            previous_hash: lines[0].trim().to_string(),
            lines: lines[2..last - 1].iter().map(|l| l.to_string()).collect(),
            nonce,
        })
    }
}

/// A block that was sealed and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    pub number: u64,
    pub block: Block,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    Sealed(SealedBlock),
    Cancelled,
}

/// How a statement got into the mempool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    UnsignedFunding(TransactionRecord),
    VerifiedTransfer(TransactionRecord),
}

/// Block contents fixed under the ledger lock before the nonce search.
#[derive(Debug, Clone)]
struct Candidate {
    number: u64,
    previous_hash: String,
    lines: Vec<String>,
}

/// The ledger engine: one store plus the settings around it.
///
/// Every mempool mutation, block allocation and read that needs a consistent
/// chain + mempool view runs under the store's [`LedgerStore::lock`], which
/// also excludes other handles and processes on the same ledger.
pub struct Blockchain {
    store: LedgerStore,
    config: Config,
    miner: Miner,
    block_states: BlockStateCache,
}

impl Blockchain {
    pub fn new(persistence: Box<dyn Persistence>, config: Config) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Blockchain {
            store: LedgerStore::new(persistence),
            miner: Miner::new(config.miner.threads, config.miner.cancel_check_interval),
            block_states: BlockStateCache::new(config.ledger.balance_cache_blocks),
            config,
        })
    }

    /// Opens the backend named by `config.ledger`.
    pub fn open(config: Config) -> Result<Self, ChainError> {
        let persistence: Box<dyn Persistence> = match config.ledger.backend {
            BackendKind::File => Box::new(FilePersistence::open(&config.ledger.path)?),
            BackendKind::Memory => Box::new(InMemoryPersistence::new()),
            BackendKind::Sqlite => Box::new(Database::open(&config.ledger.path)?),
        };
        Self::new(persistence, config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Writes the fixed genesis block as block 0.
    pub fn create_genesis(&self) -> Result<Block, ChainError> {
        let _lock = self.store.lock()?;
        let genesis = Block::genesis();
        self.store.write_block(0, &genesis)?;
        info!(hash = %genesis.hash(), "genesis block created");
        Ok(genesis)
    }

    /// Balance of `tag` across every sealed block and the pending mempool.
    pub fn balance(&self, tag: &str) -> Result<i128, ChainError> {
        let _lock = self.store.lock()?;
        balance_of(
            &self.store,
            tag,
            self.config.ledger.strict_parsing,
            &self.block_states,
        )
    }

    /// Net position of every tag that appears in the ledger.
    pub fn ledger_state(&self) -> Result<LedgerState, ChainError> {
        let _lock = self.store.lock()?;
        replay_state(&self.store, self.config.ledger.strict_parsing, &self.block_states)
    }

    /// Checks a statement and, only if every check passes, appends its ledger
    /// line to the mempool. Issuer statements skip signature and balance checks.
    pub fn verify_and_admit(
        &self,
        public_key: &PublicKey,
        statement: &str,
    ) -> Result<Admission, ChainError> {
        let statement = Statement::parse(statement)?;
        let ledger = &self.config.ledger;
        let kind = statement.validate_shape(&ledger.issuer, ledger.require_positive_amounts)?;
        if kind == StatementKind::Transfer {
            statement.validate_signature(public_key)?;
        }

        let record = statement.record;
        let _lock = self.store.lock()?;
        if kind == StatementKind::Transfer {
            let balance = balance_of(
                &self.store,
                &record.sender,
                ledger.strict_parsing,
                &self.block_states,
            )?;
            if balance < i128::from(record.amount) {
                return Err(ChainError::InsufficientFunds {
                    sender: record.sender,
                    balance,
                    requested: record.amount,
                });
            }
        }
        self.store.append_mempool(&record.ledger_line())?;

        info!(
            from = %record.sender,
            to = %record.receiver,
            amount = record.amount,
            "transaction admitted to mempool"
        );
        Ok(match kind {
            StatementKind::Funding => Admission::UnsignedFunding(record),
            StatementKind::Transfer => Admission::VerifiedTransfer(record),
        })
    }

    /// Seals the current mempool into the next block. Runs until a nonce is found.
    pub fn mine(&self, difficulty: usize) -> Result<SealedBlock, ChainError> {
        match self.mine_with_cancel(difficulty, &CancelFlag::new())? {
            MineOutcome::Sealed(sealed) => Ok(sealed),
            MineOutcome::Cancelled => Err(ChainError::InvalidBlock(
                "mining cancelled".to_string(),
            )),
        }
    }

    /// Like [`Blockchain::mine`] but stops without persisting anything once
    /// `cancel` is triggered.
    pub fn mine_with_cancel(
        &self,
        difficulty: usize,
        cancel: &CancelFlag,
    ) -> Result<MineOutcome, ChainError> {
        if difficulty > MAX_DIFFICULTY {
            return Err(ChainError::InvalidBlock(format!(
                "difficulty {} exceeds the {} hex digits of a SHA-256 hash",
                difficulty, MAX_DIFFICULTY
            )));
        }

        let candidate = self.snapshot_candidate()?;
        debug!(
            block = candidate.number,
            difficulty,
            transactions = candidate.lines.len(),
            threads = self.miner.threads(),
            "searching for nonce"
        );

        let Some(solution) =
            self.miner
                .search(&candidate.previous_hash, &candidate.lines, difficulty, cancel)
        else {
            if cancel.is_cancelled() {
                info!(block = candidate.number, "mining cancelled");
                return Ok(MineOutcome::Cancelled);
            }
            return Err(ChainError::InvalidBlock(format!(
                "no nonce seals block {} at difficulty {}",
                candidate.number, difficulty
            )));
        };

        let sealed = self.commit(candidate, solution)?;
        info!(
            block = sealed.number,
            nonce = sealed.block.nonce,
            hash = %sealed.hash,
            transactions = sealed.block.lines.len(),
            "block sealed"
        );
        Ok(MineOutcome::Sealed(sealed))
    }

    fn snapshot_candidate(&self) -> Result<Candidate, ChainError> {
        let _lock = self.store.lock()?;
        let number = self.store.next_block_number()?;
        if number == 0 {
            return Err(ChainError::MissingPredecessor(0));
        }
        Ok(Candidate {
            number,
            previous_hash: self.store.hash_of_block(number - 1)?,
            lines: self.store.read_mempool()?.lines().to_vec(),
        })
    }

    /// Persists the sealed candidate and drains exactly its lines from the
    /// front of the mempool. Lines admitted during the search stay pending.
    fn commit(&self, candidate: Candidate, solution: Solution) -> Result<SealedBlock, ChainError> {
        let _lock = self.store.lock()?;
        let number = candidate.number;
        if self.store.block_exists(number)? {
            return Err(ChainError::AlreadyExists(block_name(number)));
        }
        if !self.store.read_mempool()?.starts_with(&candidate.lines) {
            return Err(ChainError::InvalidBlock(format!(
                "mempool changed while sealing block {}",
                number
            )));
        }

        let block = Block::new(candidate.previous_hash, candidate.lines, solution.nonce);
        self.store.write_block(number, &block)?;
        if let Err(e) = self.store.drain_mempool(block.lines.len()) {
            warn!(block = number, error = %e, "sealed block left its lines in the mempool");
            return Err(ChainError::MempoolNotDrained {
                block: number,
                reason: e.to_string(),
            });
        }

        Ok(SealedBlock {
            number,
            block,
            hash: solution.hash,
        })
    }

    pub fn validate(&self) -> Result<bool, ChainError> {
        let _lock = self.store.lock()?;
        validate_chain(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn ledger() -> Blockchain {
        let chain = Blockchain::new(Box::new(InMemoryPersistence::new()), Config::ephemeral()).unwrap();
        chain.create_genesis().unwrap();
        chain
    }

    #[test]
    fn test_genesis_serialization() {
        let expected = format!("{}\n\n{}\n\nnonce: 0", GENESIS_PREVIOUS_HASH, GENESIS_MOTTO);
        assert_eq!(Block::genesis().serialize(), expected);
        assert_eq!(Block::parse(&expected).unwrap(), Block::genesis());
    }

    #[test]
    fn test_empty_block_layout() {
        let block = Block::new("ab", Vec::new(), 7);
        assert_eq!(block.serialize(), "ab\n\n\nnonce: 7");
        assert_eq!(Block::parse("ab\n\n\nnonce: 7\n").unwrap(), block);
    }

    #[test]
    fn test_block_parse_rejects_bad_layout() {
        assert!(Block::parse("ab\nnonce: 1").is_err());
        assert!(Block::parse("ab\nx\n\nnonce: 1").is_err());
        assert!(Block::parse("ab\n\nx\n\nnonce: many").is_err());
        assert!(Block::parse("ab\n\nx\ny\nnonce: 1").is_err());
    }

    #[test]
    fn test_genesis_is_never_rewritten() {
        let chain = ledger();
        assert!(matches!(chain.create_genesis(), Err(ChainError::AlreadyExists(_))));
    }

    #[test]
    fn test_mine_without_genesis() {
        let chain = Blockchain::new(Box::new(InMemoryPersistence::new()), Config::ephemeral()).unwrap();
        assert_eq!(chain.mine(0), Err(ChainError::MissingPredecessor(0)));
    }

    #[test]
    fn test_mine_zero_uses_nonce_zero() {
        let chain = ledger();
        let sealed = chain.mine(0).unwrap();
        assert_eq!(sealed.number, 1);
        assert_eq!(sealed.block.nonce, 0);
        assert!(sealed.block.lines.is_empty());
        assert_eq!(sealed.block.previous_hash, chain.store().hash_of_block(0).unwrap());
    }

    #[test]
    fn test_mine_rejects_impossible_difficulty() {
        let chain = ledger();
        assert!(chain.mine(MAX_DIFFICULTY + 1).is_err());
    }

    #[test]
    fn test_cancelled_mine_persists_nothing() {
        let chain = ledger();
        chain.store().append_mempool("ZALU transferred 1 to X on t").unwrap();
        let cancel = CancelFlag::new();
        cancel.trigger();

        assert_eq!(chain.mine_with_cancel(8, &cancel).unwrap(), MineOutcome::Cancelled);
        assert_eq!(chain.store().list_block_numbers().unwrap(), vec![0]);
        assert_eq!(chain.store().read_mempool().unwrap().len(), 1);
    }

    #[test]
    fn test_funding_admitted_without_signature() {
        let chain = ledger();
        let anyone = KeyPair::generate().unwrap();
        let admission = chain
            .verify_and_admit(&anyone.public_key, "From: ZALU\nTo: abc\nAmount: 100\nDate: now\n")
            .unwrap();
        assert!(matches!(admission, Admission::UnsignedFunding(_)));
        assert_eq!(chain.balance("abc").unwrap(), 100);
    }

    #[test]
    fn test_insufficient_funds_leaves_mempool_untouched() {
        let chain = ledger();
        let alice = KeyPair::generate().unwrap();
        chain
            .verify_and_admit(
                &alice.public_key,
                &Statement::funding("ZALU", &alice.tag(), 100, "t0").render(),
            )
            .unwrap();
        let before = chain.store().read_mempool().unwrap();

        let transfer = Statement::signed_transfer(&alice, "bob", 1000, "t1").unwrap();
        let err = chain
            .verify_and_admit(&alice.public_key, &transfer.render())
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::InsufficientFunds {
                sender: alice.tag(),
                balance: 100,
                requested: 1000,
            }
        );
        assert_eq!(chain.store().read_mempool().unwrap(), before);
    }

    fn admit_funding(chain: &Blockchain, to: &str, amount: u64, date: &str) {
        let anyone = KeyPair::generate().unwrap();
        let statement = Statement::funding("ZALU", to, amount, date);
        chain.verify_and_admit(&anyone.public_key, &statement.render()).unwrap();
    }

    #[test]
    fn test_lines_admitted_during_search_stay_pending() {
        let chain = ledger();
        admit_funding(&chain, "A", 1, "t0");
        let candidate = chain.snapshot_candidate().unwrap();
        admit_funding(&chain, "B", 2, "t1");

        let solution = chain
            .miner
            .search(&candidate.previous_hash, &candidate.lines, 1, &CancelFlag::new())
            .unwrap();
        let sealed = chain.commit(candidate, solution).unwrap();

        assert_eq!(sealed.block.lines, vec!["ZALU transferred 1 to A on t0".to_string()]);
        assert_eq!(
            chain.store().read_mempool().unwrap().lines(),
            ["ZALU transferred 2 to B on t1".to_string()]
        );
        assert_eq!(chain.balance("A").unwrap(), 1);
        assert_eq!(chain.balance("B").unwrap(), 2);
    }

    #[test]
    fn test_commit_rejects_changed_mempool() {
        let chain = ledger();
        admit_funding(&chain, "A", 1, "t0");
        let candidate = chain.snapshot_candidate().unwrap();
        chain.store().clear_mempool().unwrap();

        let solution = chain
            .miner
            .search(&candidate.previous_hash, &candidate.lines, 0, &CancelFlag::new())
            .unwrap();
        assert!(matches!(
            chain.commit(candidate, solution),
            Err(ChainError::InvalidBlock(_))
        ));
        assert_eq!(chain.store().list_block_numbers().unwrap(), vec![0]);
    }

    /// Memory backend whose mempool rewrites always fail.
    struct StuckMempool(InMemoryPersistence);

    impl Persistence for StuckMempool {
        fn load(&self, name: &str) -> Result<Option<String>, ChainError> {
            self.0.load(name)
        }
        fn create(&self, name: &str, contents: &str) -> Result<(), ChainError> {
            self.0.create(name, contents)
        }
        fn save(&self, name: &str, contents: &str) -> Result<(), ChainError> {
            self.0.save(name, contents)
        }
        fn append(&self, name: &str, contents: &str) -> Result<(), ChainError> {
            self.0.append(name, contents)
        }
        fn remove(&self, name: &str) -> Result<(), ChainError> {
            self.0.remove(name)
        }
        fn lock(&self) -> Result<crate::persistence::LedgerLock, ChainError> {
            self.0.lock()
        }
        fn update(
            &self,
            name: &str,
            _edit: crate::persistence::DocumentEdit<'_>,
        ) -> Result<(), ChainError> {
            Err(ChainError::IoError(format!("{} is read-only", name)))
        }
    }

    #[test]
    fn test_failed_drain_names_sealed_block() {
        let chain = Blockchain::new(
            Box::new(StuckMempool(InMemoryPersistence::new())),
            Config::ephemeral(),
        )
        .unwrap();
        chain.create_genesis().unwrap();
        admit_funding(&chain, "A", 1, "t0");

        let err = chain.mine(0).unwrap_err();
        assert!(matches!(err, ChainError::MempoolNotDrained { block: 1, .. }));
        assert!(err.to_string().contains("Block 1"));
        assert!(chain.store().block_exists(1).unwrap());
    }

    #[test]
    fn test_ledger_state_lists_every_tag() {
        let chain = ledger();
        chain.store().append_mempool("ZALU transferred 3 to X on t").unwrap();
        let state = chain.ledger_state().unwrap();
        assert_eq!(state.get_balance("X"), 3);
        assert_eq!(state.get_balance("ZALU"), -3);
    }
}
