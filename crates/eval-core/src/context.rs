//! Contexto por request entregado por el gateway.

use eval_domain::Principal;
use serde::{Deserialize, Serialize};

/// Principal (si ya fue resuelto) y metadatos de transporte usados por la
/// auditoría.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub ip_address: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
}

impl RequestContext {
    pub fn for_principal(principal: Principal) -> Self {
        Self { principal: Some(principal), ..Default::default() }
    }

    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self { ip_address: Some(ip.into()), ..Default::default() }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_path = Some(path.into());
        self
    }

    pub fn actor_id(&self) -> Option<i64> {
        self.principal.as_ref().map(|p| p.id)
    }
}
