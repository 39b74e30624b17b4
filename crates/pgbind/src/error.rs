//! Error types for pgbind

use thiserror::Error;

/// Result type alias for pgbind operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// A value that cannot be rendered as a SQL literal (mixed or nested arrays,
    /// non-finite floats, strings with NUL bytes, wrong key counts).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A SQL template that cannot be scanned (unterminated quoted literal).
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// An operation requested in a state that does not allow it
    /// (row locking outside a transaction, compiling an incomplete query).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error was raised before anything reached the server.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            Self::InvalidParameter(_) | Self::MalformedQuery(_) | Self::InvalidOperation(_)
        )
    }

    /// Parse a tokio_postgres error into a more specific OrmError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
        }
        Self::Query(err)
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::OrmError;

    #[test]
    fn client_side_errors_are_classified() {
        assert!(OrmError::invalid_parameter("mixed array").is_client_side());
        assert!(OrmError::MalformedQuery("unterminated".into()).is_client_side());
        assert!(OrmError::invalid_operation("lock").is_client_side());
        assert!(!OrmError::not_found("row").is_client_side());
    }

    #[test]
    fn display_includes_category() {
        let err = OrmError::invalid_parameter("Array params must not contain other arrays");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: Array params must not contain other arrays"
        );
    }
}
