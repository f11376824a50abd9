use std::fmt;
use thiserror::Error;

/// Failures the payment and order repositories can report
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Pool timed out or closed, or the connection dropped
    #[error("Database unavailable: {message}")]
    Unavailable { message: String },

    /// A second row for one checkout id
    #[error("Duplicate record violates '{constraint}'")]
    UniqueViolation { constraint: String },

    /// Payment references an order that does not exist
    #[error("Referenced record does not exist ('{constraint}')")]
    ForeignKeyViolation { constraint: String },

    /// A stored value could not be mapped onto a domain type
    #[error("Invalid stored data: {message}")]
    InvalidData { message: String },

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    #[error("Database query failed: {message}")]
    Query { message: String },
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone)]
pub struct DatabaseError {
    pub kind: DatabaseErrorKind,
    pub context: Option<String>,
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::InvalidData {
            message: message.into(),
        })
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::Unavailable { .. })
    }

    /// Map SQLx error to our custom error type
    pub fn from_sqlx(error: sqlx::Error) -> Self {
        let kind = match error {
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::Unavailable {
                message: "connection pool exhausted".to_string(),
            },
            sqlx::Error::PoolClosed => DatabaseErrorKind::Unavailable {
                message: "connection pool is closed".to_string(),
            },
            sqlx::Error::Io(io_err) => DatabaseErrorKind::Unavailable {
                message: io_err.to_string(),
            },
            sqlx::Error::ColumnDecode { index, source } => DatabaseErrorKind::InvalidData {
                message: format!("column {}: {}", index, source),
            },
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    // unique_violation
                    Some("23505") => DatabaseErrorKind::UniqueViolation { constraint },
                    // foreign_key_violation
                    Some("23503") => DatabaseErrorKind::ForeignKeyViolation { constraint },
                    _ => DatabaseErrorKind::Query {
                        message: db_err.message().to_string(),
                    },
                }
            }
            other => DatabaseErrorKind::Query {
                message: other.to_string(),
            },
        };
        Self::new(kind)
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for DatabaseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(DatabaseError::from_sqlx(sqlx::Error::PoolClosed).is_retryable());
        assert!(!DatabaseError::invalid_data("status 'PAID'").is_retryable());
    }

    #[test]
    fn test_row_not_found_is_a_query_error() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(matches!(err.kind, DatabaseErrorKind::Query { .. }));
    }

    #[test]
    fn test_display_with_context() {
        let err = DatabaseError::new(DatabaseErrorKind::UniqueViolation {
            constraint: "payments_checkout_request_id_key".to_string(),
        })
        .with_context("insert_pending");
        assert_eq!(
            err.to_string(),
            "Duplicate record violates 'payments_checkout_request_id_key' (insert_pending)"
        );
    }
}
