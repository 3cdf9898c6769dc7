use thiserror::Error;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment gateway error: {0}")]
    Gateway(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

impl EscrowError {
    /// Only gateway failures are worth retrying; every other variant is terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EscrowError::Gateway(_))
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
