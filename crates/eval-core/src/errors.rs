//! Errores del motor y su clasificación.
//!
//! Clases (no tipos): validación, permiso, estado, no-encontrado e
//! infraestructura. Sólo `Conflict` es reintentable por el cliente.

use eval_domain::{DomainError, EvaluationStatus, FieldError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum WorkflowError {
    #[error("validation failed: {}", join(.fields))] Validation { fields: Vec<FieldError> },
    #[error("authentication required")] Unauthenticated,
    #[error("account disabled")] AccountDisabled,
    #[error("forbidden: {0}")] Forbidden(String),
    #[error("invalid transition {from} -> {to}")] InvalidTransition { from: EvaluationStatus, to: EvaluationStatus },
    #[error("evaluation is in terminal state {0}")] Terminal(EvaluationStatus),
    #[error("concurrent modification, reload and retry")] Conflict,
    #[error("{entity} {id} not found")] NotFound { entity: String, id: String },
    #[error("exhausted: {0}")] Exhausted(String),
    #[error("infrastructure: {0}")] Infrastructure(String),
}

fn join(fields: &[FieldError]) -> String {
    fields.iter().map(|f| format!("{}: {}", f.field, f.message)).collect::<Vec<_>>().join("; ")
}

impl WorkflowError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WorkflowError::Validation { fields: vec![FieldError::new(field, message)] }
    }

    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        WorkflowError::NotFound { entity: entity.to_string(), id: id.to_string() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        WorkflowError::Forbidden(reason.into())
    }

    /// Código corto estable (para auditoría y respuestas).
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Validation { .. } => "VALIDATION",
            WorkflowError::Unauthenticated => "UNAUTHENTICATED",
            WorkflowError::AccountDisabled => "ACCOUNT_DISABLED",
            WorkflowError::Forbidden(_) => "FORBIDDEN",
            WorkflowError::InvalidTransition { .. } => "INVALID_TRANSITION",
            WorkflowError::Terminal(_) => "TERMINAL",
            WorkflowError::Conflict => "CONFLICT",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::Exhausted(_) => "EXHAUSTED",
            WorkflowError::Infrastructure(_) => "INFRASTRUCTURE",
        }
    }

    /// Código HTTP equivalente (lo usa el borde de transporte y la auditoría).
    pub fn status_code(&self) -> u16 {
        match self {
            WorkflowError::Validation { .. } => 400,
            WorkflowError::Unauthenticated => 401,
            WorkflowError::AccountDisabled | WorkflowError::Forbidden(_) => 403,
            WorkflowError::NotFound { .. } => 404,
            WorkflowError::Conflict | WorkflowError::Exhausted(_) => 409,
            WorkflowError::InvalidTransition { .. } | WorkflowError::Terminal(_) => 422,
            WorkflowError::Infrastructure(_) => 500,
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(e: DomainError) -> Self {
        WorkflowError::Validation { fields: e.fields() }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict => WorkflowError::Conflict,
            StoreError::UniqueViolation(_) => WorkflowError::Conflict,
            StoreError::NotFound(what) => WorkflowError::NotFound { entity: what, id: String::new() },
            StoreError::Backend(msg) => WorkflowError::Infrastructure(msg),
        }
    }
}

/// Clases de error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Validation,
    Permission,
    State,
    NotFound,
    Infrastructure,
}

pub fn classify(e: &WorkflowError) -> ErrorClass {
    match e {
        WorkflowError::Validation { .. } => ErrorClass::Validation,
        WorkflowError::Unauthenticated | WorkflowError::AccountDisabled | WorkflowError::Forbidden(_) => {
            ErrorClass::Permission
        }
        WorkflowError::InvalidTransition { .. } | WorkflowError::Terminal(_) | WorkflowError::Conflict => ErrorClass::State,
        WorkflowError::NotFound { .. } => ErrorClass::NotFound,
        WorkflowError::Exhausted(_) | WorkflowError::Infrastructure(_) => ErrorClass::Infrastructure,
    }
}

/// El cliente puede reintentar una sola vez ante `Conflict`.
pub fn is_retryable(e: &WorkflowError) -> bool {
    matches!(e, WorkflowError::Conflict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        assert_eq!(WorkflowError::from(StoreError::VersionConflict), WorkflowError::Conflict);
        assert_eq!(classify(&StoreError::Backend("boom".into()).into()), ErrorClass::Infrastructure);
        assert!(is_retryable(&WorkflowError::Conflict));
        assert!(!is_retryable(&WorkflowError::Terminal(EvaluationStatus::Completed)));
    }

    #[test]
    fn display_lists_fields() {
        let e = WorkflowError::Validation { fields: vec![FieldError::new("product_name", "is required")] };
        assert_eq!(e.to_string(), "validation failed: product_name: is required");
        assert_eq!(e.code(), "VALIDATION");
    }
}
