use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Violations;
use crate::role::{Principal, Role};
use crate::UserId;

/// Usuario del directorio de identidad (externo al núcleo del workflow).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub department: Option<String>,
    pub position: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal { id: self.id, username: self.username.clone(), role: self.role, is_active: self.is_active }
    }
}

/// Alta de usuario; `password_hash` ya viene derivado por el servicio de identidad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: Role,
    pub department: Option<String>,
    pub position: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), crate::DomainError> {
        let mut v = Violations::new();
        v.require_text("username", &self.username, 80);
        if self.username.chars().any(|c| !(c.is_alphanumeric() || c == '_')) {
            v.push("username", "only letters, digits and '_' are allowed");
        }
        v.require_text("email", &self.email, 120);
        if !self.email.contains('@') {
            v.push("email", "must be an email address");
        }
        v.require_text("full_name", &self.full_name, 100);
        v.finish()
    }
}
