//! Flujo de autenticación: login con contraseña, refresh, logout y alta de
//! usuarios.

use std::sync::Arc;

use eval_domain::{NewUser, OperationType, Principal, Role, User};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::denylist::TokenDenylist;
use super::password::PasswordHasher;
use super::token::{TokenIssuer, TokenKind};
use super::RoleResolver;
use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::store::UserDirectory;

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

fn default_role() -> Role {
    Role::User
}

pub struct AuthService {
    users: Arc<dyn UserDirectory>,
    resolver: RoleResolver,
    hasher: PasswordHasher,
    issuer: TokenIssuer,
    denylist: Arc<dyn TokenDenylist>,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserDirectory>, hasher: PasswordHasher, issuer: TokenIssuer,
               denylist: Arc<dyn TokenDenylist>, clock: Arc<dyn Clock>, audit: AuditTrail)
               -> Self {
        Self { resolver: RoleResolver::new(users.clone()), users, hasher, issuer, denylist, clock, audit }
    }

    pub fn login(&self, ctx: &RequestContext, username: &str, password: &str) -> Result<LoginResponse, WorkflowError> {
        let entry = AuditEntry::new(OperationType::Login, "user").describe(username.to_string());
        let outcome = self.login_inner(username, password);
        // el actor de un login exitoso es el propio usuario
        let ctx = match &outcome {
            Ok(resp) => RequestContext { principal: Some(resp.user.principal()), ..ctx.clone() },
            Err(_) => ctx.clone(),
        };
        self.audit.track(&ctx, entry, outcome, |resp, e| e.target(resp.user.id))
    }

    fn login_inner(&self, username: &str, password: &str) -> Result<LoginResponse, WorkflowError> {
        let user = self.users.find_by_username(username.trim())?.ok_or(WorkflowError::Unauthenticated)?;
        if !self.hasher.verify(password, &user.password_hash) {
            warn!("login_rejected username={}", username);
            return Err(WorkflowError::Unauthenticated);
        }
        if !user.is_active {
            return Err(WorkflowError::AccountDisabled);
        }
        let now = self.clock.now();
        self.users.touch_last_login(user.id, now)?;
        let (access, _) = self.issuer.issue(&user, TokenKind::Access, now)?;
        let (refresh, _) = self.issuer.issue(&user, TokenKind::Refresh, now)?;
        info!("login user_id={} role={}", user.id, user.role);
        Ok(LoginResponse { access, refresh, user: User { last_login: Some(now), ..user } })
    }

    /// Nuevo token de acceso, sólo si el usuario sigue activo.
    pub fn refresh(&self, refresh_token: &str) -> Result<String, WorkflowError> {
        let now = self.clock.now();
        let claims = self.issuer.verify(refresh_token, TokenKind::Refresh, now)?;
        if self.denylist.is_revoked(&claims.jti)? {
            return Err(WorkflowError::Unauthenticated);
        }
        let user = self.users.find_user(claims.user_id()?)?.ok_or(WorkflowError::Unauthenticated)?;
        if !user.is_active {
            return Err(WorkflowError::AccountDisabled);
        }
        let (access, _) = self.issuer.issue(&user, TokenKind::Access, now)?;
        Ok(access)
    }

    /// Principal de un token de acceso vigente y no revocado.
    pub fn authenticate(&self, access_token: &str) -> Result<Principal, WorkflowError> {
        let claims = self.issuer.verify(access_token, TokenKind::Access, self.clock.now())?;
        if self.denylist.is_revoked(&claims.jti)? {
            return Err(WorkflowError::Unauthenticated);
        }
        self.resolver.resolve(claims.user_id()?)
    }

    pub fn logout(&self, ctx: &RequestContext, access_token: &str) -> Result<(), WorkflowError> {
        let entry = AuditEntry::new(OperationType::Logout, "user");
        let outcome = self.issuer
                          .verify(access_token, TokenKind::Access, self.clock.now())
                          .and_then(|claims| {
                              let expires = claims.expires_at().unwrap_or_else(|| self.clock.now());
                              self.denylist.revoke(&claims.jti, expires)?;
                              claims.user_id()
                          });
        self.audit.track(ctx, entry, outcome, |id, e| e.target(*id)).map(|_| ())
    }

    /// Alta de usuario (sólo admin).
    pub fn register_user(&self, ctx: &RequestContext, cmd: &RegisterUser) -> Result<User, WorkflowError> {
        let entry = AuditEntry::new(OperationType::Create, "user").describe(cmd.username.clone()).created();
        let outcome = self.resolver.require(ctx, Role::Admin).and_then(|_| self.provision(cmd));
        self.audit.track(ctx, entry, outcome, |user, e| {
                      e.target(user.id).new_data(json!({"username": user.username, "role": user.role}))
                  })
    }

    /// Alta sin compuerta de rol (bootstrap de instalaciones y tests).
    pub fn provision(&self, cmd: &RegisterUser) -> Result<User, WorkflowError> {
        if cmd.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(WorkflowError::validation("password",
                                                 format!("must be at least {MIN_PASSWORD_LEN} characters")));
        }
        let new = NewUser { username: cmd.username.trim().to_string(),
                            email: cmd.email.trim().to_string(),
                            full_name: cmd.full_name.trim().to_string(),
                            password_hash: self.hasher.hash(&cmd.password),
                            role: cmd.role,
                            department: cmd.department.clone(),
                            position: cmd.position.clone() };
        new.validate()?;
        Ok(self.users.insert_user(&new, self.clock.now())?)
    }
}
