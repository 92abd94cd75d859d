use std::collections::HashSet;
use std::sync::Arc;

use eval_domain::process::DEFAULT_RAW_SOURCE;
use eval_domain::{DetailVariant, Evaluation, EvaluationDetail, EvaluationId, EvaluationPatch, EvaluationResult,
                  EvaluationStatus, MentionType, NewEvaluation, NewEvaluationResult, NewMention, OperationType,
                  Principal, ProcessGraph, ProcessGraphPlan, ProcessPayload, RawProcessPayload, UserId};
use eval_policies::{can_delete, edit_decision, EditDecision};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use super::numbering::EvaluationNumberGenerator;
use super::processes::normalize;
use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::comments::MentionResolver;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::event::EvaluationEventKind;
use crate::fail_code::FailCodeDictionary;
use crate::hashing::hash_value;
use crate::identity::RoleResolver;
use crate::notify::Notifier;
use crate::store::{EvaluationFilter, EvaluationRecord, EvaluationStore, EvaluationWrite, MentionScope, MentionStore,
                   ProcessGraphWrite, Stores};
use crate::workflow::WorkflowEngine;

/// Vista completa del agregado.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationView {
    pub evaluation: Evaluation,
    pub details: Vec<EvaluationDetail>,
    pub results: Vec<EvaluationResult>,
    pub processes: ProcessGraph,
}

#[derive(Clone)]
pub struct EvaluationService {
    evaluations: Arc<dyn EvaluationStore>,
    mentions: Arc<dyn MentionStore>,
    roles: RoleResolver,
    mention_resolver: MentionResolver,
    dictionary: FailCodeDictionary,
    numbers: EvaluationNumberGenerator,
    workflow: WorkflowEngine,
    notifier: Notifier,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
}

/// Subconjunto que se guarda en la auditoría.
fn summary(e: &Evaluation) -> Value {
    json!({
        "evaluation_number": e.evaluation_number,
        "evaluation_type": e.evaluation_type,
        "product_name": e.product_name,
        "part_number": e.part_number,
        "status": e.status,
        "version": e.version,
    })
}

fn check_edit(evaluation: &Evaluation, actor: &Principal) -> Result<(), WorkflowError> {
    match edit_decision(evaluation.status, actor, evaluation.is_owned_by(actor.id)) {
        EditDecision::Allowed => Ok(()),
        EditDecision::Terminal => Err(WorkflowError::Terminal(evaluation.status)),
        EditDecision::Forbidden => {
            Err(WorkflowError::forbidden(format!("cannot edit an evaluation in status {}", evaluation.status)))
        }
    }
}

impl EvaluationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(stores: &Stores, numbers: EvaluationNumberGenerator, dictionary: FailCodeDictionary,
               workflow: WorkflowEngine, notifier: Notifier, audit: AuditTrail, clock: Arc<dyn Clock>)
               -> Self {
        Self { evaluations: stores.evaluations.clone(),
               mentions: stores.mentions.clone(),
               roles: RoleResolver::new(stores.users.clone()),
               mention_resolver: MentionResolver::new(stores.users.clone()),
               dictionary,
               numbers,
               workflow,
               notifier,
               audit,
               clock }
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    fn load(&self, id: EvaluationId) -> Result<Evaluation, WorkflowError> {
        self.evaluations.find_evaluation(id)?.ok_or_else(|| WorkflowError::not_found("evaluation", id))
    }

    pub fn create(&self, ctx: &RequestContext, cmd: &NewEvaluation) -> Result<Evaluation, WorkflowError> {
        let outcome = self.create_inner(ctx, cmd);
        self.audit.track(ctx, AuditEntry::new(OperationType::Create, "evaluation"), outcome, |e, entry| {
                      entry.target(e.id).describe(e.evaluation_number.clone()).new_data(summary(e)).created()
                  })
    }

    fn create_inner(&self, ctx: &RequestContext, cmd: &NewEvaluation) -> Result<Evaluation, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let valid = cmd.validate()?;
        let record = EvaluationRecord { evaluation_number: String::new(),
                                        evaluation_type: valid.evaluation_type,
                                        product_name: valid.product_name,
                                        part_number: valid.part_number,
                                        evaluator_id: actor.id,
                                        status: valid.status,
                                        start_date: valid.start_date,
                                        fields: valid.fields,
                                        details: valid.details,
                                        results: valid.results,
                                        created_at: self.clock.now() };
        let evaluation = self.numbers.insert_numbered(self.evaluations.as_ref(), self.clock.today(), record)?;
        info!("evaluation_created id={} number={} type={} status={}",
              evaluation.id, evaluation.evaluation_number, evaluation.evaluation_type, evaluation.status);
        self.sync_description_mentions(&actor, &evaluation);
        Ok(evaluation)
    }

    /// Menciones en `evaluation_reason`/`remarks`. Sólo se notifica a los
    /// usuarios que no estaban mencionados antes.
    fn sync_description_mentions(&self, actor: &Principal, evaluation: &Evaluation) {
        let text = evaluation.fields.mention_sources().join("\n");
        let scope = MentionScope::EvaluationDescription(evaluation.id);
        let previous: HashSet<UserId> = match self.mentions.mentions_in(scope) {
            Ok(rows) => rows.into_iter().map(|m| m.mentioned_user_id).collect(),
            Err(e) => {
                warn!("mention_lookup_failed evaluation={} error={}", evaluation.id, e);
                HashSet::new()
            }
        };
        let resolution = self.mention_resolver.resolve(&text, actor);
        if !resolution.unresolved.is_empty() {
            debug!("mention_unresolved evaluation={} names={:?}", evaluation.id, resolution.unresolved);
        }
        let rows: Vec<NewMention> = resolution.targets
                                              .iter()
                                              .map(|t| NewMention { mention_type: MentionType::EvaluationDescription,
                                                                    mentioned_user_id: t.user_id,
                                                                    mentioner_id: actor.id,
                                                                    evaluation_id: Some(evaluation.id),
                                                                    comment_id: None,
                                                                    message_id: None,
                                                                    context_text: text.clone(),
                                                                    mention_position: t.position })
                                              .collect();
        if rows.is_empty() && previous.is_empty() {
            return;
        }
        match self.mentions.replace_mentions(scope, &rows, self.clock.now()) {
            Ok(saved) => {
                for m in saved.iter().filter(|m| !previous.contains(&m.mentioned_user_id)) {
                    self.notifier.mention(&evaluation.evaluation_number,
                                          Some(evaluation.id),
                                          actor,
                                          m.mentioned_user_id,
                                          &text);
                }
            }
            Err(e) => warn!("mention_replace_failed evaluation={} error={}", evaluation.id, e),
        }
    }

    /// Patch parcial. Con `evaluation_reason`/`remarks` cambiados se
    /// recalculan las menciones de la descripción.
    pub fn update(&self, ctx: &RequestContext, id: EvaluationId, patch: &EvaluationPatch)
                  -> Result<Evaluation, WorkflowError> {
        let mut before = None;
        let outcome = self.update_inner(ctx, id, patch, &mut before);
        self.audit.track(ctx, AuditEntry::new(OperationType::Update, "evaluation").target(id), outcome, |e, entry| {
                      let entry = entry.describe(e.evaluation_number.clone()).new_data(summary(e));
                      match &before {
                          Some(b) => entry.old(summary(b)),
                          None => entry,
                      }
                  })
    }

    fn update_inner(&self, ctx: &RequestContext, id: EvaluationId, patch: &EvaluationPatch,
                    before: &mut Option<Evaluation>)
                    -> Result<Evaluation, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let current = self.load(id)?;
        check_edit(&current, &actor)?;
        *before = Some(current.clone());

        let mut next = current.clone();
        let mut applied = patch.apply(&mut next)?;
        if let Some(details) = &applied.details {
            let stored: Vec<DetailVariant> = self.evaluations.list_details(id)?.into_iter().map(|d| d.variant).collect();
            if stored == *details {
                applied.details = None;
                applied.changed.retain(|f| *f != "details");
            }
        }
        if applied.changed.is_empty() {
            debug!("evaluation_update_noop id={}", id);
            return Ok(current);
        }
        next.updated_at = self.clock.now();
        let changed: Vec<String> = applied.changed.iter().map(|s| s.to_string()).collect();
        let write = EvaluationWrite { evaluation: next,
                                      expected_version: current.version,
                                      actor_id: Some(actor.id),
                                      event: EvaluationEventKind::Updated { changed: changed.clone() },
                                      details: applied.details };
        let saved = self.evaluations.save_evaluation(&write)?;
        info!("evaluation_updated id={} version={} changed={:?}", id, saved.version, changed);
        if applied.changed.iter().any(|f| matches!(*f, "evaluation_reason" | "remarks")) {
            self.sync_description_mentions(&actor, &saved);
        }
        Ok(saved)
    }

    pub fn get(&self, ctx: &RequestContext, id: EvaluationId) -> Result<EvaluationView, WorkflowError> {
        self.roles.authenticated(ctx)?;
        let evaluation = self.load(id)?;
        Ok(EvaluationView { details: self.evaluations.list_details(id)?,
                            results: self.evaluations.list_results(id)?,
                            processes: self.evaluations.load_process_graph(id)?,
                            evaluation })
    }

    pub fn list(&self, ctx: &RequestContext, filter: &EvaluationFilter) -> Result<Vec<Evaluation>, WorkflowError> {
        self.roles.authenticated(ctx)?;
        Ok(self.evaluations.list_evaluations(filter)?)
    }

    /// Admin (salvo completadas) o el dueño en borrador. Borra en cascada.
    pub fn delete(&self, ctx: &RequestContext, id: EvaluationId) -> Result<(), WorkflowError> {
        let mut before = None;
        let outcome = (|| -> Result<(), WorkflowError> {
            let actor = self.roles.authenticated(ctx)?;
            let current = self.load(id)?;
            if !can_delete(current.status, &actor, current.is_owned_by(actor.id)) {
                return Err(WorkflowError::forbidden(format!("cannot delete an evaluation in status {}",
                                                            current.status)));
            }
            self.evaluations.delete_evaluation(id)?;
            info!("evaluation_deleted id={} number={}", id, current.evaluation_number);
            before = Some(current);
            Ok(())
        })();
        self.audit.track(ctx, AuditEntry::new(OperationType::Delete, "evaluation").target(id), outcome, |_, entry| {
                      match &before {
                          Some(b) => entry.describe(b.evaluation_number.clone()).old(summary(b)),
                          None => entry,
                      }
                  })
    }

    pub fn add_result(&self, ctx: &RequestContext, id: EvaluationId, cmd: &NewEvaluationResult)
                      -> Result<EvaluationResult, WorkflowError> {
        let outcome = (|| -> Result<EvaluationResult, WorkflowError> {
            let actor = self.roles.authenticated(ctx)?;
            let current = self.load(id)?;
            check_edit(&current, &actor)?;
            let draft = cmd.validate("result").map_err(|fields| WorkflowError::Validation { fields })?;
            Ok(self.evaluations.add_result(id, &draft, self.clock.now())?)
        })();
        self.audit.track(ctx, AuditEntry::new(OperationType::Create, "evaluation_result"), outcome, |r, entry| {
                      entry.target(r.id)
                           .describe(format!("result for evaluation {id}"))
                           .new_data(json!({
                               "evaluation_id": r.evaluation_id,
                               "result_type": r.result_type,
                               "result_status": r.result_status,
                           }))
                           .created()
                  })
    }

    pub fn list_results(&self, ctx: &RequestContext, id: EvaluationId) -> Result<Vec<EvaluationResult>, WorkflowError> {
        self.roles.authenticated(ctx)?;
        self.load(id)?;
        Ok(self.evaluations.list_results(id)?)
    }

    /// Reescritura atómica del grafo de proceso. Los fail codes se resuelven
    /// (y se mintean) antes de la escritura del grafo.
    pub fn replace_processes(&self, ctx: &RequestContext, id: EvaluationId, payload: &Value)
                             -> Result<ProcessGraph, WorkflowError> {
        let mut hash = None;
        let outcome = self.replace_processes_inner(ctx, id, payload, &mut hash);
        self.audit.track(ctx, AuditEntry::new(OperationType::Update, "evaluation").target(id), outcome, |g, entry| {
                      entry.describe("processes").new_data(json!({
                                                       "payload_hash": hash,
                                                       "lots": g.lots.len(),
                                                       "steps": g.steps.len(),
                                                   }))
                  })
    }

    fn replace_processes_inner(&self, ctx: &RequestContext, id: EvaluationId, payload: &Value,
                               hash: &mut Option<String>)
                               -> Result<ProcessGraph, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let current = self.load(id)?;
        check_edit(&current, &actor)?;
        let parsed: ProcessPayload = serde_json::from_value(payload.clone())
            .map_err(|e| WorkflowError::validation("processes", e.to_string()))?;
        let mut plan = normalize(&parsed)?;
        self.resolve_fail_codes(&mut plan)?;

        let payload_hash = hash_value(payload);
        *hash = Some(payload_hash.clone());
        let write = ProcessGraphWrite { evaluation_id: id,
                                        expected_version: current.version,
                                        actor_id: Some(actor.id),
                                        plan,
                                        raw_payload: payload.clone(),
                                        raw_source: DEFAULT_RAW_SOURCE.to_string(),
                                        payload_hash,
                                        now: self.clock.now() };
        let graph = self.evaluations.replace_process_graph(&write)?;
        info!("processes_replaced id={} lots={} steps={}", id, graph.lots.len(), graph.steps.len());
        Ok(graph)
    }

    /// Completa `fail_code_id` y, si falta, el snapshot del nombre corto.
    fn resolve_fail_codes(&self, plan: &mut ProcessGraphPlan) -> Result<(), WorkflowError> {
        for failure in plan.steps.iter_mut().flat_map(|s| s.failures.iter_mut()) {
            let code = self.dictionary.resolve(&failure.fail_code_text)?;
            failure.fail_code_id = Some(code.id);
            if failure.fail_code_name_snapshot.is_none() {
                failure.fail_code_name_snapshot = code.short_name.clone();
            }
        }
        Ok(())
    }

    /// Último payload crudo recibido.
    pub fn processes_raw(&self, ctx: &RequestContext, id: EvaluationId)
                         -> Result<Option<RawProcessPayload>, WorkflowError> {
        self.roles.authenticated(ctx)?;
        self.load(id)?;
        Ok(self.evaluations.latest_raw_payload(id)?)
    }

    pub fn transition(&self, ctx: &RequestContext, id: EvaluationId, to: EvaluationStatus, comment: Option<&str>)
                      -> Result<Evaluation, WorkflowError> {
        self.workflow.transition(ctx, id, to, comment)
    }
}
