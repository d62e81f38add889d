/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid record key `{0}`")]
    InvalidKey(String),

    /// Lock contention outlasted the retry budget.
    #[error("record `{key}` unavailable: lock still held after {attempts} attempt(s)")]
    Unavailable { key: String, attempts: u32 },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("corrupted record blob: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("store operation cancelled")]
    Cancelled,
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
