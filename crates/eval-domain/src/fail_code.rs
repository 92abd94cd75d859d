use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FailCodeId;

string_tag! {
    /// Origen de una entrada del diccionario.
    pub enum FailCodeSource : "fail_code_source" {
        TextExtract => "text-extract",
        LegacyText => "legacy-text",
        Manual => "manual",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailCode {
    pub id: FailCodeId,
    pub code: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub is_provisional: bool,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFailCode {
    pub code: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub is_provisional: bool,
    pub source: Option<FailCodeSource>,
}

/// Longitud máxima de `code` (slug LEGACY incluido).
pub const FAIL_CODE_MAX_LEN: usize = 64;
/// Longitud máxima de `fail_code_text` en una falla de step.
pub const FAIL_TEXT_MAX_LEN: usize = 32;
