use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Campo inválido dentro de un comando (ruta tipo `details[0].material_name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("unknown {kind} value: {value}")]
    UnknownTag { kind: &'static str, value: String },
}

impl DomainError {
    /// Lista de campos afectados (vacía para `UnknownTag` sin contexto).
    pub fn fields(&self) -> Vec<FieldError> {
        match self {
            DomainError::Validation(fields) => fields.clone(),
            DomainError::UnknownTag { kind, value } => vec![FieldError::new(*kind, format!("unknown value '{value}'"))],
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields.iter().map(|f| format!("{}: {}", f.field, f.message)).collect::<Vec<_>>().join("; ")
}

/// Acumulador de errores de campo; `finish` devuelve `Validation` si hubo alguno.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, fields: impl IntoIterator<Item = FieldError>) {
        self.0.extend(fields);
    }

    /// Exige texto no vacío (tras trim) y longitud máxima.
    pub fn require_text(&mut self, field: &str, value: &str, max_len: usize) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            self.push(field, "is required");
        } else if trimmed.chars().count() > max_len {
            self.push(field, format!("must be at most {max_len} characters"));
        }
    }

    /// Longitud máxima para campos opcionales.
    pub fn limit_text(&mut self, field: &str, value: Option<&str>, max_len: usize) {
        if let Some(v) = value {
            if v.chars().count() > max_len {
                self.push(field, format!("must be at most {max_len} characters"));
            }
        }
    }

    /// Parsea un tag; registra el error de campo y devuelve `None` si no aplica.
    pub fn parse_tag<T: std::str::FromStr>(&mut self, field: &str, raw: &str) -> Option<T> {
        match raw.trim().parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                self.push(field, format!("invalid value '{}'", raw.trim()));
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_fields(self) -> Vec<FieldError> {
        self.0
    }

    pub fn finish(self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self.0))
        }
    }
}

/// Normaliza opcionales: `Some("  ")` → `None`, el resto se recorta.
pub fn clean_opt(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
