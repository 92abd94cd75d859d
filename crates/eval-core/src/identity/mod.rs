//! Identity & Role Resolver.
//!
//! - `RoleResolver`: principal → rol vigente y `has_permission`.
//! - `password`: KDF con sal (`pbkdf2_sha256$iters$salt$hash`).
//! - `token`: tokens de acceso/refresh firmados (HS256).
//! - `denylist`: `jti` revocados (logout).
//! - `auth`: login, refresh, logout, alta de usuarios.

pub mod auth;
pub mod denylist;
pub mod password;
pub mod token;

use std::sync::Arc;

use eval_domain::{Principal, Role, UserId};
use log::debug;

use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::store::UserDirectory;

pub use auth::{AuthService, LoginResponse, RegisterUser};
pub use denylist::{InMemoryDenylist, TokenDenylist};
pub use password::PasswordHasher;
pub use token::{Claims, TokenIssuer, TokenKind};

/// Resuelve el principal contra el directorio (rol y estado actuales, no los
/// del token).
#[derive(Clone)]
pub struct RoleResolver {
    users: Arc<dyn UserDirectory>,
}

impl RoleResolver {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    pub fn resolve(&self, user_id: UserId) -> Result<Principal, WorkflowError> {
        let user = self.users.find_user(user_id)?.ok_or(WorkflowError::Unauthenticated)?;
        if !user.is_active {
            return Err(WorkflowError::AccountDisabled);
        }
        Ok(user.principal())
    }

    /// Principal del contexto, refrescado desde el directorio.
    pub fn authenticated(&self, ctx: &RequestContext) -> Result<Principal, WorkflowError> {
        let claimed = ctx.principal.as_ref().ok_or(WorkflowError::Unauthenticated)?;
        let principal = self.resolve(claimed.id)?;
        if principal.role != claimed.role {
            debug!("role_refreshed user={} claimed={} current={}", principal.id, claimed.role, principal.role);
        }
        Ok(principal)
    }

    pub fn require(&self, ctx: &RequestContext, required: Role) -> Result<Principal, WorkflowError> {
        let principal = self.authenticated(ctx)?;
        check_permission(&principal, required)?;
        Ok(principal)
    }
}

pub fn check_permission(principal: &Principal, required: Role) -> Result<(), WorkflowError> {
    if !principal.is_active {
        return Err(WorkflowError::AccountDisabled);
    }
    if !principal.has_permission(required) {
        return Err(WorkflowError::forbidden(format!("requires role {required} or higher")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use chrono::Utc;
    use eval_domain::NewUser;

    fn new_user(name: &str, role: Role) -> NewUser {
        NewUser { username: name.into(),
                  email: format!("{name}@example.com"),
                  full_name: name.into(),
                  password_hash: String::new(),
                  role,
                  department: None,
                  position: None }
    }

    #[test]
    fn resolver_rejects_missing_disabled_and_insufficient() {
        let store = Arc::new(InMemoryStore::new());
        let lead = store.insert_user(&new_user("lead", Role::PartLeader), Utc::now()).unwrap();
        let resolver = RoleResolver::new(store.clone());

        assert_eq!(resolver.authenticated(&RequestContext::default()), Err(WorkflowError::Unauthenticated));
        let ctx = RequestContext::for_principal(lead.principal());
        assert!(resolver.require(&ctx, Role::PartLeader).is_ok());
        assert!(matches!(resolver.require(&ctx, Role::GroupLeader), Err(WorkflowError::Forbidden(_))));

        store.set_active(lead.id, false).unwrap();
        assert_eq!(resolver.authenticated(&ctx), Err(WorkflowError::AccountDisabled));
    }
}
