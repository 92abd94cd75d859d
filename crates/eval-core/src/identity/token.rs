//! Tokens de identidad firmados con HS256.
//!
//! Claims: `sub` (id numérico como string), `role`, `kind` (access/refresh),
//! `jti`, `iat`, `exp`. La expiración se valida contra el `Clock`
//! inyectado, no contra el reloj del sistema.

use chrono::{DateTime, Duration, Utc};
use eval_domain::{Role, User, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub kind: TokenKind,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, WorkflowError> {
        self.sub.parse().map_err(|_| WorkflowError::Unauthenticated)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

pub struct TokenIssuer {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(access_secret: &str, refresh_secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self { access_secret: access_secret.as_bytes().to_vec(),
               refresh_secret: refresh_secret.as_bytes().to_vec(),
               access_ttl,
               refresh_ttl }
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        }
    }

    pub fn issue(&self, user: &User, kind: TokenKind, now: DateTime<Utc>) -> Result<(String, Claims), WorkflowError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims { sub: user.id.to_string(),
                              role: user.role,
                              kind,
                              jti: Uuid::new_v4().to_string(),
                              iat: now.timestamp(),
                              exp: (now + ttl).timestamp() };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(self.secret(kind)))
            .map_err(|e| WorkflowError::Infrastructure(format!("token encode: {e}")))?;
        Ok((token, claims))
    }

    /// Verifica firma, tipo y expiración.
    pub fn verify(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<Claims, WorkflowError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret(kind)), &validation)
            .map_err(|_| WorkflowError::Unauthenticated)?;
        let claims = data.claims;
        if claims.kind != kind || claims.exp <= now.timestamp() {
            return Err(WorkflowError::Unauthenticated);
        }
        Ok(claims)
    }
}
