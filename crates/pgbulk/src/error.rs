//! Error types for pgbulk

use thiserror::Error;

/// Result type alias for pgbulk operations
pub type BulkResult<T> = Result<T, BulkError>;

/// Error types for bulk operations.
///
/// Variants fall into three groups:
/// - expression problems ([`BulkError::UnsupportedExpression`], [`BulkError::Binding`]),
///   raised before any SQL reaches the store;
/// - caller/metadata problems ([`BulkError::Metadata`], [`BulkError::Validation`],
///   [`BulkError::Conversion`]), also raised before execution;
/// - execution problems reported by the store or the connection layer.
#[derive(Debug, Error)]
pub enum BulkError {
    /// The updater (or a compiled projection) has a shape that cannot be translated.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A member assignment could not be bound to a column.
    #[error("Binding error: {0}")]
    Binding(String),

    /// Entity metadata is inconsistent or incomplete.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Invalid input or configuration.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A value converter rejected a value.
    #[error("Conversion error on column '{column}': {message}")]
    Conversion { column: String, message: String },

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl BulkError {
    /// Create an unsupported-expression error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedExpression(message.into())
    }

    /// Create a binding error
    pub fn binding(message: impl Into<String>) -> Self {
        Self::Binding(message.into())
    }

    /// Create a metadata error
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conversion error for a specific column
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is an unsupported-expression error
    pub fn is_unsupported_expression(&self) -> bool {
        matches!(self, Self::UnsupportedExpression(_))
    }

    /// Check if this is a binding error
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Binding(_))
    }

    /// Check if this error came from the store or the connection layer.
    pub fn is_execution(&self) -> bool {
        match self {
            Self::Connection(_)
            | Self::Query(_)
            | Self::UniqueViolation(_)
            | Self::ForeignKeyViolation(_)
            | Self::CheckViolation(_) => true,
            #[cfg(feature = "pool")]
            Self::Pool(_) => true,
            _ => false,
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Parse a tokio_postgres error into a more specific BulkError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{constraint}: {message}")),
                "23503" => return Self::ForeignKeyViolation(format!("{constraint}: {message}")),
                "23514" => return Self::CheckViolation(format!("{constraint}: {message}")),
                _ => {}
            }
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::Query(err)
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for BulkError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}
