//! Motor de transiciones.
//!
//! Secuencia por llamada: resolver principal → cargar raíz → decidir con la
//! `TransitionPolicy` → aplicar efectos (aprobadores, fecha de cierre,
//! remarks) → guardar con `expected_version` → notificar → auditar.
//!
//! Ante `VersionConflict` se recarga la raíz: si el estado cambió desde la
//! primera lectura la llamada falla con `Conflict`; si no, se revalida y se
//! reintenta una vez.

use std::sync::Arc;

use eval_domain::{Evaluation, EvaluationId, EvaluationStatus, Principal};
use eval_policies::{TransitionDecision, TransitionPolicy, TransitionRequest};
use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use super::operation_for;
use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::constants::CONFLICT_RETRIES;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::event::{EventStore, EvaluationEventKind};
use crate::identity::RoleResolver;
use crate::notify::{FanoutReport, Notifier};
use crate::store::{EvaluationStore, EvaluationWrite, StoreError, Stores};

/// Transición confirmada.
struct Committed {
    before: Evaluation,
    after: Evaluation,
    notifications: FanoutReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub id: EvaluationId,
    pub success: bool,
    pub status: Option<EvaluationStatus>,
    pub error: Option<WorkflowError>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<BulkItem>,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) evaluations: Arc<dyn EvaluationStore>,
    pub(crate) events: Arc<dyn EventStore>,
    pub(crate) resolver: RoleResolver,
    pub(crate) policy: Arc<dyn TransitionPolicy>,
    notifier: Notifier,
    audit: AuditTrail,
    pub(crate) clock: Arc<dyn Clock>,
}

fn snapshot(e: &Evaluation) -> Value {
    json!({
        "status": e.status,
        "version": e.version,
        "part_approver_id": e.part_approver_id,
        "group_approver_id": e.group_approver_id,
        "completion_date": e.completion_date,
    })
}

impl WorkflowEngine {
    pub fn new(stores: &Stores, policy: Arc<dyn TransitionPolicy>, notifier: Notifier, audit: AuditTrail,
               clock: Arc<dyn Clock>)
               -> Self {
        Self { evaluations: stores.evaluations.clone(),
               events: stores.events.clone(),
               resolver: RoleResolver::new(stores.users.clone()),
               policy,
               notifier,
               audit,
               clock }
    }

    pub fn policy_id(&self) -> &'static str {
        self.policy.id()
    }

    pub(crate) fn load(&self, id: EvaluationId) -> Result<Evaluation, WorkflowError> {
        self.evaluations.find_evaluation(id)?.ok_or_else(|| WorkflowError::not_found("evaluation", id))
    }

    /// Transición genérica `id → to`. `comment` es obligatorio al rechazar
    /// (motivo) y se guarda como `cancel_reason` al cancelar.
    pub fn transition(&self, ctx: &RequestContext, id: EvaluationId, to: EvaluationStatus, comment: Option<&str>)
                      -> Result<Evaluation, WorkflowError> {
        let mut from_seen = None;
        let result = self.resolver
                         .authenticated(ctx)
                         .and_then(|actor| self.run(&actor, id, to, comment, &mut from_seen));
        let entry = AuditEntry::new(operation_for(from_seen, to), "evaluation").target(id);
        match result {
            Ok(c) => {
                let mut new_data = snapshot(&c.after);
                new_data["notifications"] = json!({
                    "recipients": c.notifications.recipients,
                    "delivered": c.notifications.delivered,
                    "failed": c.notifications.failed,
                });
                if let Some(text) = comment {
                    new_data["comment"] = json!(text);
                }
                self.audit.success(ctx,
                                   entry.describe(c.after.evaluation_number.clone())
                                        .old(snapshot(&c.before))
                                        .new_data(new_data));
                Ok(c.after)
            }
            Err(e) => {
                self.audit.failure(ctx, entry, &e);
                Err(e)
            }
        }
    }

    /// Aprueba la etapa pendiente actual (part → group, group → completed).
    pub fn approve(&self, ctx: &RequestContext, id: EvaluationId, comment: Option<&str>)
                   -> Result<Evaluation, WorkflowError> {
        let target = self.load(id).and_then(|current| match current.status {
                                      EvaluationStatus::PendingPartApproval => {
                                          Ok(EvaluationStatus::PendingGroupApproval)
                                      }
                                      EvaluationStatus::PendingGroupApproval => Ok(EvaluationStatus::Completed),
                                      s if s.is_terminal() => Err(WorkflowError::Terminal(s)),
                                      s => Err(WorkflowError::InvalidTransition { from: s,
                                                                                  to: EvaluationStatus::Completed }),
                                  });
        match target {
            Ok(to) => self.transition(ctx, id, to, comment),
            Err(e) => {
                let entry = AuditEntry::new(eval_domain::OperationType::Approve, "evaluation").target(id);
                self.audit.failure(ctx, entry, &e);
                Err(e)
            }
        }
    }

    pub fn reject(&self, ctx: &RequestContext, id: EvaluationId, reason: &str) -> Result<Evaluation, WorkflowError> {
        self.transition(ctx, id, EvaluationStatus::Rejected, Some(reason))
    }

    /// Aplica la transición a cada id; los errores no cortan el lote.
    pub fn bulk_transition(&self, ctx: &RequestContext, ids: &[EvaluationId], to: EvaluationStatus,
                           comment: Option<&str>)
                           -> BulkReport {
        let mut report = BulkReport::default();
        for &id in ids {
            let item = match self.transition(ctx, id, to, comment) {
                Ok(e) => {
                    report.succeeded += 1;
                    BulkItem { id, success: true, status: Some(e.status), error: None }
                }
                Err(err) => {
                    report.failed += 1;
                    BulkItem { id, success: false, status: None, error: Some(err) }
                }
            };
            report.items.push(item);
        }
        info!("bulk_transition to={} succeeded={} failed={}", to, report.succeeded, report.failed);
        report
    }

    /// Destinos que `actor` puede ejecutar desde el estado actual.
    pub fn available_transitions(&self, ctx: &RequestContext, id: EvaluationId)
                                 -> Result<Vec<EvaluationStatus>, WorkflowError> {
        let actor = self.resolver.authenticated(ctx)?;
        let current = self.load(id)?;
        let is_owner = current.is_owned_by(actor.id);
        Ok(self.policy
               .targets(current.status, current.evaluation_type)
               .into_iter()
               .filter(|to| {
                   let req = TransitionRequest { from: current.status,
                                                 to: *to,
                                                 evaluation_type: current.evaluation_type,
                                                 actor: &actor,
                                                 is_owner };
                   matches!(self.policy.decide(&req), TransitionDecision::Allowed(_))
               })
               .collect())
    }

    fn run(&self, actor: &Principal, id: EvaluationId, to: EvaluationStatus, comment: Option<&str>,
           from_seen: &mut Option<EvaluationStatus>)
           -> Result<Committed, WorkflowError> {
        let mut current = self.load(id)?;
        let observed = current.status;
        *from_seen = Some(observed);

        for attempt in 0..=CONFLICT_RETRIES {
            let next = self.plan(actor, &current, to, comment)?;
            let write = EvaluationWrite { evaluation: next,
                                          expected_version: current.version,
                                          actor_id: Some(actor.id),
                                          event: EvaluationEventKind::StatusChanged { from: current.status,
                                                                                      to,
                                                                                      comment: comment.map(str::to_string),
                                                                                      policy_id: self.policy.id()
                                                                                                     .to_string() },
                                          details: None };
            match self.evaluations.save_evaluation(&write) {
                Ok(after) => {
                    info!("transition id={} {}->{} actor={} version={}",
                          id, current.status, after.status, actor.id, after.version);
                    let notifications = self.notifier.transition(&after, current.status, actor, comment);
                    return Ok(Committed { before: current, after, notifications });
                }
                Err(StoreError::VersionConflict) => {
                    warn!("transition_conflict id={} to={} attempt={}", id, to, attempt);
                    let reloaded = self.load(id)?;
                    if reloaded.status != observed {
                        return Err(WorkflowError::Conflict);
                    }
                    current = reloaded;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkflowError::Conflict)
    }

    /// Valida y devuelve el estado siguiente (sin persistir).
    fn plan(&self, actor: &Principal, current: &Evaluation, to: EvaluationStatus, comment: Option<&str>)
            -> Result<Evaluation, WorkflowError> {
        let from = current.status;
        let req = TransitionRequest { from,
                                      to,
                                      evaluation_type: current.evaluation_type,
                                      actor,
                                      is_owner: current.is_owned_by(actor.id) };
        match self.policy.decide(&req) {
            TransitionDecision::Allowed(_) => {}
            TransitionDecision::Terminal => return Err(WorkflowError::Terminal(from)),
            TransitionDecision::NotInTable => return Err(WorkflowError::InvalidTransition { from, to }),
            TransitionDecision::Forbidden(gate) => {
                return Err(WorkflowError::forbidden(format!("{from} -> {to} requires {}", gate.describe())))
            }
        }
        let note = comment.map(str::trim).filter(|c| !c.is_empty());

        let mut next = current.clone();
        next.status = to;
        next.updated_at = self.clock.now();
        match (from, to) {
            (EvaluationStatus::PendingPartApproval, EvaluationStatus::PendingGroupApproval) => {
                next.part_approver_id = Some(actor.id);
            }
            (EvaluationStatus::PendingGroupApproval, EvaluationStatus::Completed) => {
                next.group_approver_id = Some(actor.id);
            }
            (EvaluationStatus::PendingGroupApproval, EvaluationStatus::PendingPartApproval) => {
                next.part_approver_id = None;
            }
            (EvaluationStatus::Rejected, EvaluationStatus::InProgress) => {
                next.part_approver_id = None;
                next.group_approver_id = None;
            }
            _ => {}
        }
        match to {
            EvaluationStatus::Completed => next.completion_date = Some(self.clock.today()),
            EvaluationStatus::Rejected => {
                let reason = note.ok_or_else(|| WorkflowError::validation("reason", "is required to reject"))?;
                next.append_remark(&format!("[Rejected by {}] {}", actor.username, reason));
            }
            EvaluationStatus::Cancelled => next.cancel_reason = note.map(str::to_string),
            _ => {}
        }
        Ok(next)
    }
}
