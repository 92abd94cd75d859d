//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y éstas a
//! `StoreError` del núcleo.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use eval_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("version conflict")]
    VersionConflict,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("row decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Decode(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<eval_domain::DomainError> for PersistenceError {
    fn from(err: eval_domain::DomainError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::UniqueViolation(msg) => StoreError::UniqueViolation(msg),
            PersistenceError::NotFound => StoreError::NotFound("row".into()),
            PersistenceError::VersionConflict => StoreError::VersionConflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_to_store_errors() {
        assert_eq!(StoreError::from(PersistenceError::VersionConflict), StoreError::VersionConflict);
        assert_eq!(StoreError::from(PersistenceError::UniqueViolation("evaluations_evaluation_number_key".into())),
                   StoreError::UniqueViolation("evaluations_evaluation_number_key".into()));
        assert!(matches!(StoreError::from(PersistenceError::from(DieselError::NotFound)), StoreError::NotFound(_)));
        assert!(matches!(StoreError::from(PersistenceError::SerializationConflict), StoreError::Backend(_)));
    }
}
