//! Errores de la aplicación y su forma en el borde de transporte.

use eval_core::errors::is_retryable;
use eval_core::WorkflowError;
use eval_domain::FieldError;
use eval_persistence::PersistenceError;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Fallas de arranque y cableado (no de requests).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Error de configuración: {0}")]
    Config(#[from] ConfigError),
    #[error("Error de persistencia: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Error de workflow: {0}")]
    Workflow(#[from] WorkflowError),
}

/// Cuerpo de error devuelto por el gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    /// Sólo `CONFLICT` admite un reintento tras recargar.
    pub retryable: bool,
}

pub fn status_code(e: &WorkflowError) -> u16 {
    e.status_code()
}

impl From<&WorkflowError> for ErrorResponse {
    fn from(e: &WorkflowError) -> Self {
        let fields = match e {
            WorkflowError::Validation { fields } => fields.clone(),
            _ => Vec::new(),
        };
        // los detalles de infraestructura se quedan en el log
        let message = match e {
            WorkflowError::Infrastructure(_) => "internal error".to_string(),
            _ => e.to_string(),
        };
        Self { status: status_code(e),
               code: e.code(),
               message,
               fields,
               retryable: is_retryable(e) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_domain::EvaluationStatus;

    #[test]
    fn status_codes_per_kind() {
        use EvaluationStatus::*;
        assert_eq!(status_code(&WorkflowError::validation("product_name", "is required")), 400);
        assert_eq!(status_code(&WorkflowError::Unauthenticated), 401);
        assert_eq!(status_code(&WorkflowError::AccountDisabled), 403);
        assert_eq!(status_code(&WorkflowError::forbidden("role")), 403);
        assert_eq!(status_code(&WorkflowError::not_found("evaluation", 7)), 404);
        assert_eq!(status_code(&WorkflowError::Conflict), 409);
        assert_eq!(status_code(&WorkflowError::Exhausted("evaluation_number".into())), 409);
        assert_eq!(status_code(&WorkflowError::InvalidTransition { from: Draft, to: Completed }), 422);
        assert_eq!(status_code(&WorkflowError::Terminal(Cancelled)), 422);
        assert_eq!(status_code(&WorkflowError::Infrastructure("pool".into())), 500);
    }

    #[test]
    fn validation_body_lists_fields() {
        let body = ErrorResponse::from(&WorkflowError::validation("part_number", "is required"));
        assert_eq!(body.status, 400);
        assert_eq!(body.code, "VALIDATION");
        assert_eq!(body.fields, vec![FieldError::new("part_number", "is required")]);
        assert!(!body.retryable);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["fields"][0]["field"], "part_number");
    }

    #[test]
    fn infrastructure_message_is_generic() {
        let body = ErrorResponse::from(&WorkflowError::Infrastructure("connection refused 10.1.2.3".into()));
        assert_eq!(body.message, "internal error");
        assert!(ErrorResponse::from(&WorkflowError::Conflict).retryable);
    }
}
