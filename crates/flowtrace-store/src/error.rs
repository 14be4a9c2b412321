//! Failures raised while acquiring sessions or touching the database.

/// What can go wrong below the coordinator: the embedded database
/// itself, the filesystem it lives on, or the provider's own locking.
/// Domain outcomes never originate here.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a statement or could not be opened.
    #[error("database failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file or its parent directory could not be created.
    #[error("database file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the provider's connection lock;
    /// the session cannot be handed out safely.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

/// Result alias for session-provider and schema operations.
pub type Result<T> = std::result::Result<T, StoreError>;
