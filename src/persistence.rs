//! Storage backends for ZeroCoin
//!
//! The ledger persists nothing but named blocks of text (`block_<n>.txt`,
//! `mempool.txt`). [`Persistence`] is that contract; [`FilePersistence`]
//! keeps one file per name, [`InMemoryPersistence`] a map, and [`Database`]
//! a single SQLite table.
//!
//! Every backend also hands out a [`LedgerLock`]. For the file and SQLite
//! backends it is an advisory lock on a lock file, so separate processes and
//! separate handles on the same ledger exclude each other.

use crate::error::ChainError;
use fs2::FileExt;
use parking_lot::{Condvar, Mutex as MapLock};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Lock file kept next to the ledger documents.
pub const LOCK_FILE_NAME: &str = ".ledger.lock";

/// Rewrites a document. Receives the current contents (`None` when absent) and
/// returns the new contents, or `None` to remove the document.
pub type DocumentEdit<'a> = &'a mut dyn FnMut(Option<String>) -> Option<String>;

/// Abstraction for persistence backends. Implementations must make `create`
/// fail with [`ChainError::AlreadyExists`] instead of overwriting.
pub trait Persistence: Send + Sync {
    /// Contents stored under `name`, or `None` when absent.
    fn load(&self, name: &str) -> Result<Option<String>, ChainError>;
    /// Stores `contents` under a name that must not exist yet.
    fn create(&self, name: &str, contents: &str) -> Result<(), ChainError>;
    /// Stores `contents` under `name`, replacing any previous value.
    fn save(&self, name: &str, contents: &str) -> Result<(), ChainError>;
    /// Appends `contents`, creating the entry if needed.
    fn append(&self, name: &str, contents: &str) -> Result<(), ChainError>;
    /// Removes `name`. Removing an absent entry is not an error.
    fn remove(&self, name: &str) -> Result<(), ChainError>;
    /// Blocks until this handle holds the ledger's exclusive write lock.
    fn lock(&self) -> Result<LedgerLock, ChainError>;

    fn exists(&self, name: &str) -> Result<bool, ChainError> {
        Ok(self.load(name)?.is_some())
    }

    /// Raw stored bytes. Unlike [`Persistence::load`] this never fails on
    /// contents that are not UTF-8.
    fn load_bytes(&self, name: &str) -> Result<Option<Vec<u8>>, ChainError> {
        Ok(self.load(name)?.map(String::into_bytes))
    }

    /// Read-modify-write of one document. Callers hold the [`LedgerLock`];
    /// backends with their own transactions also apply the edit atomically.
    fn update(&self, name: &str, edit: DocumentEdit<'_>) -> Result<(), ChainError> {
        match edit(self.load(name)?) {
            Some(contents) => self.save(name, &contents),
            None => self.remove(name),
        }
    }
}

/// Exclusive write lock on a ledger. Released when dropped.
#[must_use = "the ledger is unlocked as soon as the lock is dropped"]
pub enum LedgerLock {
    /// Advisory lock on a lock file.
    File(File),
    /// Lock shared by every clone of an in-process backend.
    Process(Arc<ProcessLock>),
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        match self {
            // Closing the descriptor releases the advisory lock.
            LedgerLock::File(_) => {}
            LedgerLock::Process(lock) => lock.release(),
        }
    }
}

/// Writer flag for backends that live inside one process.
#[derive(Debug, Default)]
pub struct ProcessLock {
    held: MapLock<bool>,
    released: Condvar,
}

impl ProcessLock {
    fn acquire(self: &Arc<Self>) -> LedgerLock {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
        LedgerLock::Process(Arc::clone(self))
    }

    fn release(&self) {
        *self.held.lock() = false;
        self.released.notify_one();
    }
}

fn lock_file(path: &Path) -> Result<LedgerLock, ChainError> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| ChainError::IoError(format!("Failed to open lock file {}: {}", path.display(), e)))?;
    FileExt::lock_exclusive(&file)
        .map_err(|e| ChainError::IoError(format!("Failed to lock {}: {}", path.display(), e)))?;
    Ok(LedgerLock::File(file))
}

/// One plain-text file per name inside a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ChainError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            ChainError::IoError(format!("Failed to create ledger dir {}: {}", dir.display(), e))
        })?;
        Ok(FilePersistence { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl Persistence for FilePersistence {
    fn load(&self, name: &str) -> Result<Option<String>, ChainError> {
        match fs::read_to_string(self.path(name)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChainError::IoError(format!("Failed to read {}: {}", name, e))),
        }
    }

    fn create(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ChainError::AlreadyExists(name.to_string()),
                _ => ChainError::IoError(format!("Failed to create {}: {}", name, e)),
            })?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ChainError::IoError(format!("Failed to write {}: {}", name, e)))?;
        file.sync_all()
            .map_err(|e| ChainError::IoError(format!("Failed to sync {}: {}", name, e)))?;
        Ok(())
    }

    fn save(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let path = self.path(name);
        let temp_path = path.with_extension("tmp");
        let mut file = File::create(&temp_path)
            .map_err(|e| ChainError::IoError(format!("Failed to create temp file: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ChainError::IoError(format!("Failed to write {}: {}", name, e)))?;
        file.sync_all()
            .map_err(|e| ChainError::IoError(format!("Failed to sync {}: {}", name, e)))?;
        drop(file);

        fs::rename(&temp_path, &path)
            .map_err(|e| ChainError::IoError(format!("Failed to finalize {}: {}", name, e)))?;
        Ok(())
    }

    fn append(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))
            .map_err(|e| ChainError::IoError(format!("Failed to open {}: {}", name, e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| ChainError::IoError(format!("Failed to append to {}: {}", name, e)))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), ChainError> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChainError::IoError(format!("Failed to remove {}: {}", name, e))),
        }
    }

    fn lock(&self) -> Result<LedgerLock, ChainError> {
        lock_file(&self.path(LOCK_FILE_NAME))
    }

    fn exists(&self, name: &str) -> Result<bool, ChainError> {
        self.path(name)
            .try_exists()
            .map_err(|e| ChainError::IoError(format!("Failed to stat {}: {}", name, e)))
    }

    fn load_bytes(&self, name: &str) -> Result<Option<Vec<u8>>, ChainError> {
        match fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChainError::IoError(format!("Failed to read {}: {}", name, e))),
        }
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    documents: Arc<MapLock<HashMap<String, String>>>,
    writer: Arc<ProcessLock>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn load(&self, name: &str) -> Result<Option<String>, ChainError> {
        Ok(self.documents.lock().get(name).cloned())
    }

    fn create(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let mut documents = self.documents.lock();
        if documents.contains_key(name) {
            return Err(ChainError::AlreadyExists(name.to_string()));
        }
        documents.insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn save(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        self.documents
            .lock()
            .insert(name.to_string(), contents.to_string());
        Ok(())
    }

    fn append(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        self.documents
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), ChainError> {
        self.documents.lock().remove(name);
        Ok(())
    }

    fn lock(&self) -> Result<LedgerLock, ChainError> {
        Ok(self.writer.acquire())
    }

    fn update(&self, name: &str, edit: DocumentEdit<'_>) -> Result<(), ChainError> {
        let mut documents = self.documents.lock();
        match edit(documents.get(name).cloned()) {
            Some(contents) => {
                documents.insert(name.to_string(), contents);
            }
            None => {
                documents.remove(name);
            }
        }
        Ok(())
    }
}

/// SQLite-backed persistence: one row per name.
pub struct Database {
    conn: Mutex<Connection>,
    /// `<database>.lock`, or `None` for an in-memory database.
    lock_path: Option<PathBuf>,
    writer: Arc<ProcessLock>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                contents TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to create documents table: {}", e)))?;

        let lock_path = match path {
            "" | ":memory:" => None,
            _ => Some(PathBuf::from(format!("{path}.lock"))),
        };
        Ok(Database {
            conn: Mutex::new(conn),
            lock_path,
            writer: Arc::default(),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))
    }
}

impl Persistence for Database {
    fn load(&self, name: &str) -> Result<Option<String>, ChainError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT contents FROM documents WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| ChainError::DatabaseError(format!("Failed to load {}: {}", name, e)))
    }

    fn create(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (name, contents) VALUES (?1, ?2)",
            params![name, contents],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => ChainError::AlreadyExists(name.to_string()),
            _ => ChainError::DatabaseError(format!("Failed to create {}: {}", name, e)),
        })?;
        Ok(())
    }

    fn save(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents (name, contents) VALUES (?1, ?2)",
            params![name, contents],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to save {}: {}", name, e)))?;
        Ok(())
    }

    fn append(&self, name: &str, contents: &str) -> Result<(), ChainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (name, contents) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET contents = contents || excluded.contents",
            params![name, contents],
        )
        .map_err(|e| ChainError::DatabaseError(format!("Failed to append to {}: {}", name, e)))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), ChainError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM documents WHERE name = ?1", params![name])
            .map_err(|e| ChainError::DatabaseError(format!("Failed to remove {}: {}", name, e)))?;
        Ok(())
    }

    fn lock(&self) -> Result<LedgerLock, ChainError> {
        match &self.lock_path {
            Some(path) => lock_file(path),
            None => Ok(self.writer.acquire()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool, ChainError> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM documents WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to check {}: {}", name, e)))?;
        Ok(found.is_some())
    }

    /// Runs the read and the write inside one `BEGIN IMMEDIATE` transaction.
    fn update(&self, name: &str, edit: DocumentEdit<'_>) -> Result<(), ChainError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let current: Option<String> = tx
            .query_row(
                "SELECT contents FROM documents WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to load {}: {}", name, e)))?;

        let written = match edit(current) {
            Some(contents) => tx.execute(
                "INSERT OR REPLACE INTO documents (name, contents) VALUES (?1, ?2)",
                params![name, contents],
            ),
            None => tx.execute("DELETE FROM documents WHERE name = ?1", params![name]),
        };
        written.map_err(|e| ChainError::DatabaseError(format!("Failed to update {}: {}", name, e)))?;

        tx.commit()
            .map_err(|e| ChainError::DatabaseError(format!("Failed to commit {}: {}", name, e)))
    }
}
