use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] bincode::Error),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
