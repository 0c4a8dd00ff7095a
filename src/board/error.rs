use crate::core_state::CoreError;
use crate::db::DatabaseError;
use crate::storage::StorageError;

/// Failure of a board operation.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Core error: {0}")]
    Core(CoreError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl BoardError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

impl From<DatabaseError> for BoardError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, id } => Self::NotFound {
                entity: entity_type,
                id,
            },
            DatabaseError::ConstraintViolation(detail) => Self::Conflict(detail),
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(code, detail))
                if code.code == rusqlite::ErrorCode::ConstraintViolation
                    && matches!(
                        code.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                Self::Conflict(detail.unwrap_or_else(|| "duplicate entry".into()))
            }
            other => Self::Database(other),
        }
    }
}

impl From<rusqlite::Error> for BoardError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::from(err).into()
    }
}

impl From<CoreError> for BoardError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Database(e) => e.into(),
            CoreError::Storage(e) => Self::Storage(e),
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_not_found_keeps_entity_and_id() {
        let err: BoardError = DatabaseError::not_found("referral", "abc").into();
        match err {
            BoardError::NotFound { entity, id } => {
                assert_eq!(entity, "referral");
                assert_eq!(id, "abc");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn primary_key_collision_is_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert!(matches!(BoardError::from(err), BoardError::Conflict(_)));
    }

    #[test]
    fn unique_violation_is_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE); INSERT INTO t (name) VALUES ('a');",
        )
        .unwrap();
        let err = conn.execute("INSERT INTO t (name) VALUES ('a')", []).unwrap_err();
        assert!(matches!(BoardError::from(err), BoardError::Conflict(_)));
    }

    #[test]
    fn other_constraint_failures_stay_internal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT NOT NULL);").unwrap();
        let err = conn.execute("INSERT INTO t VALUES (NULL)", []).unwrap_err();
        assert!(matches!(BoardError::from(err), BoardError::Database(_)));
    }

    #[test]
    fn core_database_errors_unwrap() {
        let err: BoardError = CoreError::Database(DatabaseError::not_found("user", "u1")).into();
        assert!(matches!(err, BoardError::NotFound { .. }));
    }
}
