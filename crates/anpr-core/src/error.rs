use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row failed validation when read back into a `Report`.
    #[error("Invalid report record {id}: {reason}")]
    InvalidRecord { id: i64, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Report {0} not found")]
    NotFound(i64),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures coming from the report store (connectivity, query, bad rows).
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::InvalidRecord { .. } | Error::Lock(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
