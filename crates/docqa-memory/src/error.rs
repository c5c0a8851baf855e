use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index is locked: {0}")]
    Locked(String),

    #[error("no index at {}", .0.display())]
    Missing(PathBuf),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot build an index from zero chunks")]
    Empty,

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("index task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("integer conversion: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}
