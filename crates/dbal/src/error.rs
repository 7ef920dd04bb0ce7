//! Error types for dbal

use thiserror::Error;

/// Result type alias for dbal operations
pub type DbalResult<T> = Result<T, DbalError>;

/// Boxed backend error carried by [`DbalError::QueryFailed`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for building, generating and executing statements
#[derive(Debug, Error)]
pub enum DbalError {
    /// Malformed builder usage (missing clause, bad enum token, unknown placeholder)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested clause has no representation in the target dialect
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The backend rejected or failed to execute the statement
    #[error("Query failed: {message}")]
    QueryFailed {
        message: String,
        /// SQLSTATE code, when the backend reported one
        code: Option<String>,
        #[source]
        source: BackendError,
    },

    /// Any error raised inside a `transactional` block; rollback already happened
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[source] Box<DbalError>),

    /// `begin_transaction` while a transaction is active
    #[error("A transaction is already active")]
    AlreadyActive,

    /// `commit`/`rollback` without an active transaction
    #[error("No active transaction")]
    NoActiveTransaction,

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Cache layer error
    #[error("Cache error: {0}")]
    Cache(String),
}

impl DbalError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unsupported feature error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Wrap an arbitrary backend failure.
    ///
    /// Falls back to a generic message when the backend's own text is empty.
    pub fn query_failed<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = source.to_string();
        let message = if message.trim().is_empty() {
            "statement execution failed".to_string()
        } else {
            message
        };
        Self::QueryFailed {
            message,
            code: None,
            source: Box::new(source),
        }
    }

    /// Wrap `cause` as a transaction failure.
    pub fn transaction_failed(cause: DbalError) -> Self {
        Self::TransactionFailed(Box::new(cause))
    }

    /// Check if this is an invalid argument error
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Check if this is an unsupported feature error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Check if this is a backend execution failure
    pub fn is_query_failed(&self) -> bool {
        matches!(self, Self::QueryFailed { .. })
    }

    /// Check if this is a transaction failure
    pub fn is_transaction_failed(&self) -> bool {
        matches!(self, Self::TransactionFailed(_))
    }

    /// The error a `TransactionFailed` wraps, if any.
    pub fn cause(&self) -> Option<&DbalError> {
        match self {
            Self::TransactionFailed(inner) => Some(inner),
            _ => None,
        }
    }

    /// Parse a tokio_postgres error into a `QueryFailed` with a readable message.
    ///
    /// `tokio_postgres::Error`'s `Display` is often just "db error"; the server
    /// message and detail are pulled out of the `DbError` when present.
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        let (message, code) = match err.as_db_error() {
            Some(db_err) => {
                let mut message = db_err.message().to_string();
                if let Some(detail) = db_err.detail() {
                    message.push_str(": ");
                    message.push_str(detail);
                }
                (message, Some(db_err.code().code().to_string()))
            }
            None => (err.to_string(), None),
        };
        let message = if message.trim().is_empty() {
            "statement execution failed".to_string()
        } else {
            message
        };
        Self::QueryFailed {
            message,
            code,
            source: Box::new(err),
        }
    }
}

impl From<deadpool_postgres::PoolError> for DbalError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
