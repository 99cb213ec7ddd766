use domain::RepositoryError;
use thiserror::Error;

/// Errors that can occur when talking to PostgreSQL.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A column held a value the domain does not accept.
    #[error("Invalid stored value in {column}: {value}")]
    InvalidColumn { column: &'static str, value: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Name of the unique constraint this error violated, if any.
    pub fn violated_constraint(&self) -> Option<&str> {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Some(db_err.constraint().unwrap_or("unique"))
            }
            _ => None,
        }
    }
}

impl From<StoreError> for RepositoryError {
    fn from(err: StoreError) -> Self {
        RepositoryError::Backend(err.to_string())
    }
}

/// Maps a unique violation to `Duplicate`, anything else to `Backend`.
pub(crate) fn duplicate_or_backend(err: StoreError, entity: &'static str, key: String) -> RepositoryError {
    if err.violated_constraint().is_some() {
        return RepositoryError::Duplicate { entity, key };
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_become_backend() {
        let err = StoreError::InvalidColumn {
            column: "status",
            value: "lost".to_string(),
        };
        assert!(err.violated_constraint().is_none());

        let repo = duplicate_or_backend(err, "Order", "ORD-1".to_string());
        assert!(matches!(repo, RepositoryError::Backend(msg) if msg.contains("status")));
    }
}
