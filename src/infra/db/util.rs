use sqlx::error::DatabaseError;

use crate::application::repos::RepoError;

// SQLSTATE codes the listing schema can raise.
const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";
const NOT_NULL_VIOLATION: &str = "23502";
const STRING_TOO_LONG: &str = "22001";
const NUMERIC_OVERFLOW: &str = "22003";
const INVALID_TEXT: &str = "22P02";
const QUERY_CANCELED: &str = "57014";

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => map_database_error(db.as_ref()),
        other => RepoError::from_persistence(other),
    }
}

fn map_database_error(db: &dyn DatabaseError) -> RepoError {
    let message = db.message().to_string();
    match db.code().as_deref() {
        Some(UNIQUE_VIOLATION) => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        // Amenity rows pointing at a listing deleted concurrently.
        Some(FOREIGN_KEY_VIOLATION) => RepoError::NotFound,
        Some(CHECK_VIOLATION | STRING_TOO_LONG | NUMERIC_OVERFLOW | INVALID_TEXT) => {
            RepoError::InvalidInput { message }
        }
        Some(NOT_NULL_VIOLATION) => RepoError::Integrity { message },
        Some(QUERY_CANCELED) => RepoError::Timeout,
        _ => RepoError::Persistence(message),
    }
}
