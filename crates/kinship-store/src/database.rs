//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Multi-entity writes go
//! through [`Database::transaction`], the single unit-of-work boundary of
//! the backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::{Result, StoreError};
use crate::migrations;
use crate::store::Store;

/// Default number of times a conflicted transaction is re-run.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How long SQLite waits on a locked database before reporting `BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can flow out of a transaction closure.
///
/// The store only needs to know whether a failure was transient; business
/// errors are returned to the caller untouched and never retried.
pub trait TxError: From<StoreError> {
    fn is_transient(&self) -> bool;
}

impl TxError for StoreError {
    fn is_transient(&self) -> bool {
        self.is_busy()
    }
}

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
    max_retries: u32,
}

impl Database {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Override how many times a transient transaction failure is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Read-only (or single-statement) access outside a transaction.
    pub fn store(&self) -> Store<'_> {
        Store::new(&self.conn)
    }

    /// Run `op` as one all-or-nothing transaction.
    ///
    /// The transaction is opened `IMMEDIATE`, so the write lock is taken
    /// before the first read and every precondition checked inside `op`
    /// still holds at commit. Returning `Err` rolls everything back. When
    /// the failure is transient the whole closure is run again, up to the
    /// configured retry budget.
    pub fn transaction<T, E, F>(&mut self, mut op: F) -> std::result::Result<T, E>
    where
        E: TxError,
        F: FnMut(&Store<'_>) -> std::result::Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match self.run_once(&mut op) {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, "transaction hit a locked database, retrying");
                }
                outcome => return outcome,
            }
        }
    }

    fn run_once<T, E, F>(&mut self, op: &mut F) -> std::result::Result<T, E>
    where
        E: TxError,
        F: FnMut(&Store<'_>) -> std::result::Result<T, E>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        // dropping `tx` on the error path rolls back
        let value = op(&Store::new(&tx))?;

        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
