use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    /// Lookup or refresh by primary key matched no row.
    #[error("Row not found in '{table}': {detail}")]
    NotFound { table: String, detail: String },

    #[error("Insert not allowed: {0}")]
    InsertNotAllowed(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Identity-cache lookup on an unregistered or disabled key. Callers usually
    /// fall back to storage.
    #[error("Cache miss on '{criteria}': {key}")]
    CacheMiss { criteria: String, key: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

impl PersistError {
    pub fn not_found(table: &str, detail: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.to_string(),
            detail: detail.into(),
        }
    }

    pub fn cache_miss(criteria: &str, key: &str) -> Self {
        Self::CacheMiss {
            criteria: criteria.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Self::CacheMiss { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
