//! Audit Log (C6).
//!
//! Cada llamada mutante registra exactamente una entrada (éxito o falla).
//! El append es best-effort: si el sink falla se loguea con `warn!` y la
//! operación sigue su curso.

use std::sync::Arc;

use eval_domain::{NewOperationLog, OperationLog, OperationType, Principal, Role};
use log::warn;
use serde_json::Value;

use crate::clock::Clock;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::identity::check_permission;
use crate::store::{AuditSink, LogFilter};

/// Entrada en construcción.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub operation_type: OperationType,
    pub target_type: &'static str,
    pub target_id: Option<i64>,
    pub target_description: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub status_code: u16,
}

impl AuditEntry {
    pub fn new(operation_type: OperationType, target_type: &'static str) -> Self {
        Self { operation_type,
               target_type,
               target_id: None,
               target_description: None,
               old_data: None,
               new_data: None,
               status_code: 200 }
    }

    pub fn target(mut self, id: i64) -> Self {
        self.target_id = Some(id);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.target_description = Some(description.into());
        self
    }

    pub fn old(mut self, data: Value) -> Self {
        self.old_data = Some(data);
        self
    }

    pub fn new_data(mut self, data: Value) -> Self {
        self.new_data = Some(data);
        self
    }

    pub fn created(mut self) -> Self {
        self.status_code = 201;
        self
    }
}

#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self { sink, clock }
    }

    fn append(&self, ctx: &RequestContext, entry: AuditEntry, success: bool, error: Option<String>) {
        let row = NewOperationLog { user_id: ctx.actor_id(),
                                    operation_type: entry.operation_type,
                                    target_type: entry.target_type.to_string(),
                                    target_id: entry.target_id,
                                    target_description: entry.target_description,
                                    old_data: entry.old_data,
                                    new_data: entry.new_data,
                                    ip_address: ctx.ip_address.clone(),
                                    request_method: ctx.request_method.clone(),
                                    request_path: ctx.request_path.clone(),
                                    status_code: Some(i32::from(entry.status_code)),
                                    success,
                                    error_message: error };
        if let Err(e) = self.sink.append_log(&row, self.clock.now()) {
            warn!("audit_append_failed op={} target={} error={}", row.operation_type, row.target_type, e);
        }
    }

    pub fn success(&self, ctx: &RequestContext, entry: AuditEntry) {
        self.append(ctx, entry, true, None);
    }

    pub fn failure(&self, ctx: &RequestContext, mut entry: AuditEntry, err: &WorkflowError) {
        entry.status_code = err.status_code();
        self.append(ctx, entry, false, Some(err.to_string()));
    }

    /// Registra el resultado de `outcome` y lo devuelve intacto.
    pub fn track<T>(&self, ctx: &RequestContext, entry: AuditEntry, outcome: Result<T, WorkflowError>,
                    finish: impl FnOnce(&T, AuditEntry) -> AuditEntry)
                    -> Result<T, WorkflowError> {
        match &outcome {
            Ok(value) => self.success(ctx, finish(value, entry)),
            Err(e) => self.failure(ctx, entry, e),
        }
        outcome
    }

    /// Consulta del registro (sólo admin).
    pub fn logs(&self, principal: &Principal, filter: &LogFilter) -> Result<Vec<OperationLog>, WorkflowError> {
        check_permission(principal, Role::Admin)?;
        let mut logs = self.sink.query_logs(filter)?;
        logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::memory::InMemoryStore;
    use eval_domain::Role;
    use serde_json::json;

    fn admin() -> Principal {
        Principal { id: 1, username: "root".into(), role: Role::Admin, is_active: true }
    }

    #[test]
    fn failures_are_recorded_and_sink_errors_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        let trail = AuditTrail::new(store.clone(), Arc::new(SystemClock));
        let ctx = RequestContext::for_principal(admin()).with_ip("10.0.0.1");

        trail.success(&ctx, AuditEntry::new(OperationType::Create, "evaluation").target(5).new_data(json!({"a": 1})));
        trail.failure(&ctx, AuditEntry::new(OperationType::Update, "evaluation").target(5), &WorkflowError::Conflict);
        store.set_audit_failure(true);
        trail.success(&ctx, AuditEntry::new(OperationType::Delete, "evaluation"));
        store.set_audit_failure(false);

        let all = trail.logs(&admin(), &LogFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        let failed = trail.logs(&admin(), &LogFilter { success: Some(false), ..Default::default() }).unwrap();
        assert_eq!(failed[0].status_code, Some(409));
        assert_eq!(failed[0].ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn anonymous_actor_is_ip_only() {
        let store = Arc::new(InMemoryStore::new());
        let trail = AuditTrail::new(store.clone(), Arc::new(SystemClock));
        trail.failure(&RequestContext::anonymous("192.168.1.9"),
                      AuditEntry::new(OperationType::Login, "user"),
                      &WorkflowError::Unauthenticated);
        let logs = trail.logs(&admin(), &LogFilter::default()).unwrap();
        assert_eq!(logs[0].user_id, None);
        assert_eq!(logs[0].ip_address.as_deref(), Some("192.168.1.9"));
        let p = Principal { role: Role::GroupLeader, ..admin() };
        assert!(trail.logs(&p, &LogFilter::default()).is_err());
    }
}
