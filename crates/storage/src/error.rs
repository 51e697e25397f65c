use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid row at line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },

    #[error("Load failed after {attempts} attempts: {last}")]
    LoadExhausted { attempts: u32, last: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
