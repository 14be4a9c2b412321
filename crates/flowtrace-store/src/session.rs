//! Transactional session provider.
//!
//! [`SqliteSessionProvider`] hides three connection ownership modes behind
//! one `acquire()` call:
//!
//! - **shared** — a caller-owned connection handle; the caller decides
//!   when the underlying connection is closed.
//! - **pooled** — connections are checked out of an internal pool and
//!   returned when the [`Session`] is dropped.
//! - **owned** — the provider opens and keeps its own connection.
//!
//! A [`Session`] dereferences to [`rusqlite::Connection`]; callers open
//! transactions on it with `unchecked_transaction()`, which rolls back on
//! drop unless committed. The provider never begins or ends transactions
//! itself.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::schema;

/// Small checkout/return pool over file-backed connections.
///
/// Popping an empty pool opens a new connection; there is no upper bound.
/// Not usable with `:memory:` databases, where each connection would see
/// its own empty database.
struct ConnectionPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            idle: Mutex::new(Vec::new()),
        }
    }

    fn checkout(&self) -> Result<Connection> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .pop();
        match reused {
            Some(conn) => Ok(conn),
            None => open_connection(&self.path),
        }
    }

    fn give_back(&self, conn: Connection) {
        // A poisoned pool just drops the connection instead of reusing it.
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    schema::init(&conn)?;
    Ok(conn)
}

enum Mode {
    Shared(Arc<Mutex<Connection>>),
    Pooled(ConnectionPool),
    Owned(Mutex<Connection>),
}

/// Provides transactional sessions to coordinator operations.
///
/// Ownership mode is an internal detail; every mode exposes the same
/// [`acquire`](Self::acquire) interface. Release is drop-based.
pub struct SqliteSessionProvider {
    mode: Mode,
}

impl SqliteSessionProvider {
    /// Self-managed provider over a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory cannot be
    /// created, or [`StoreError::Sqlite`] if opening or DDL fails.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            mode: Mode::Owned(Mutex::new(open_connection(path)?)),
        })
    }

    /// Self-managed in-memory provider (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            mode: Mode::Owned(Mutex::new(conn)),
        })
    }

    /// Provider over a caller-owned connection handle.
    ///
    /// The caller keeps the other `Arc` and decides when the connection
    /// is closed; the provider only serializes access to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] or [`StoreError::Sqlite`] if
    /// the handle cannot be initialized with the coordinator DDL.
    pub fn shared(conn: Arc<Mutex<Connection>>) -> Result<Self> {
        {
            let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
            schema::init(&guard)?;
        }
        Ok(Self {
            mode: Mode::Shared(conn),
        })
    }

    /// Provider that pools connections to the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Sqlite`] if the first
    /// connection cannot be opened.
    pub fn pooled(path: &Path) -> Result<Self> {
        let pool = ConnectionPool::new(path.to_path_buf());
        // Open eagerly so configuration errors surface at construction.
        let conn = pool.checkout()?;
        pool.give_back(conn);
        Ok(Self {
            mode: Mode::Pooled(pool),
        })
    }

    /// Acquire a session for one coordinator operation.
    ///
    /// The session is released on drop: shared/owned sessions unlock the
    /// connection, pooled sessions return it to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if a guarding mutex was
    /// poisoned, or [`StoreError::Sqlite`] if a pooled connection cannot
    /// be opened.
    pub fn acquire(&self) -> Result<Session<'_>> {
        match &self.mode {
            Mode::Shared(conn) => {
                let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
                Ok(Session(SessionInner::Guard(guard)))
            }
            Mode::Owned(conn) => {
                let guard = conn.lock().map_err(|_| StoreError::LockPoisoned)?;
                Ok(Session(SessionInner::Guard(guard)))
            }
            Mode::Pooled(pool) => {
                let conn = pool.checkout()?;
                Ok(Session(SessionInner::Pooled {
                    conn: Some(conn),
                    pool,
                }))
            }
        }
    }
}

enum SessionInner<'a> {
    Guard(MutexGuard<'a, Connection>),
    Pooled {
        conn: Option<Connection>,
        pool: &'a ConnectionPool,
    },
}

/// A checked-out store session.
///
/// Dereferences to [`rusqlite::Connection`]. Dropping the session
/// releases it back to its provider.
pub struct Session<'a>(SessionInner<'a>);

impl Deref for Session<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.0 {
            SessionInner::Guard(guard) => guard,
            SessionInner::Pooled { conn, .. } => {
                conn.as_ref().expect("connection present until drop")
            }
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let SessionInner::Pooled { conn, pool } = &mut self.0 {
            if let Some(conn) = conn.take() {
                pool.give_back(conn);
            }
        }
    }
}
