//! Consultas de sólo lectura del workflow.
//!
//! Las estadísticas se derivan únicamente de columnas de Evaluation
//! (estado, tipo, fechas de inicio y cierre).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use eval_domain::{Evaluation, EvaluationId, EvaluationStatus, Role, UserId};
use rayon::prelude::*;
use serde::Serialize;

use super::engine::WorkflowEngine;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::event::EvaluationEventKind;
use crate::identity::check_permission;
use crate::store::EvaluationFilter;

#[derive(Debug, Clone, Serialize)]
pub struct PendingApproval {
    pub evaluation: Evaluation,
    /// "part" o "group".
    pub stage: &'static str,
    pub pending_since: DateTime<Utc>,
    pub days_pending: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub from: EvaluationStatus,
    pub to: EvaluationStatus,
    pub actor_id: Option<UserId>,
    pub comment: Option<String>,
    pub policy_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowStatistics {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub completed: usize,
    /// Promedio de días `start_date → completion_date` de las completadas.
    pub average_completion_days: Option<f64>,
}

#[derive(Default)]
struct Fold {
    by_status: BTreeMap<String, usize>,
    by_type: BTreeMap<String, usize>,
    completed: usize,
    completion_days: i64,
}

impl Fold {
    fn add(mut self, e: &Evaluation) -> Self {
        *self.by_status.entry(e.status.to_string()).or_default() += 1;
        *self.by_type.entry(e.evaluation_type.to_string()).or_default() += 1;
        if let (EvaluationStatus::Completed, Some(done)) = (e.status, e.completion_date) {
            self.completed += 1;
            self.completion_days += (done - e.start_date).num_days();
        }
        self
    }

    fn merge(mut self, other: Self) -> Self {
        for (k, v) in other.by_status {
            *self.by_status.entry(k).or_default() += v;
        }
        for (k, v) in other.by_type {
            *self.by_type.entry(k).or_default() += v;
        }
        self.completed += other.completed;
        self.completion_days += other.completion_days;
        self
    }
}

pub fn statistics_of(evaluations: &[Evaluation]) -> WorkflowStatistics {
    let fold = evaluations.par_iter().fold(Fold::default, Fold::add).reduce(Fold::default, Fold::merge);
    WorkflowStatistics { total: evaluations.len(),
                         by_status: fold.by_status,
                         by_type: fold.by_type,
                         completed: fold.completed,
                         average_completion_days: (fold.completed > 0).then(|| {
                                                                        fold.completion_days as f64
                                                                        / fold.completed as f64
                                                                    }) }
}

impl WorkflowEngine {
    /// Bandeja de aprobación: part_leader ve `pending_part_approval`,
    /// group_leader `pending_group_approval`, admin ambas.
    pub fn pending_approvals(&self, ctx: &RequestContext) -> Result<Vec<PendingApproval>, WorkflowError> {
        let actor = self.resolver.authenticated(ctx)?;
        check_permission(&actor, Role::PartLeader)?;
        let statuses = match actor.role {
            Role::PartLeader => vec![EvaluationStatus::PendingPartApproval],
            Role::GroupLeader => vec![EvaluationStatus::PendingGroupApproval],
            _ => vec![EvaluationStatus::PendingPartApproval, EvaluationStatus::PendingGroupApproval],
        };
        let filter = EvaluationFilter { statuses, ..Default::default() };
        let now = self.clock.now();
        let mut out = Vec::new();
        for evaluation in self.evaluations.list_evaluations(&filter)? {
            let pending_since = self.entered_at(evaluation.id, evaluation.status)?.unwrap_or(evaluation.updated_at);
            let stage = match evaluation.status {
                EvaluationStatus::PendingGroupApproval => "group",
                _ => "part",
            };
            out.push(PendingApproval { days_pending: (now - pending_since).num_days().max(0),
                                       pending_since,
                                       stage,
                                       evaluation });
        }
        out.sort_by(|a, b| a.pending_since.cmp(&b.pending_since));
        Ok(out)
    }

    fn entered_at(&self, id: EvaluationId, status: EvaluationStatus) -> Result<Option<DateTime<Utc>>, WorkflowError> {
        Ok(self.events
               .list_events(id)?
               .into_iter()
               .rev()
               .find(|ev| matches!(&ev.kind, EvaluationEventKind::StatusChanged { to, .. } if *to == status))
               .map(|ev| ev.ts))
    }

    pub fn statistics(&self, ctx: &RequestContext) -> Result<WorkflowStatistics, WorkflowError> {
        self.resolver.authenticated(ctx)?;
        let all = self.evaluations.list_evaluations(&EvaluationFilter::default())?;
        Ok(statistics_of(&all))
    }

    /// Cambios de estado de una evaluación, en orden.
    pub fn history(&self, ctx: &RequestContext, id: EvaluationId) -> Result<Vec<StatusChange>, WorkflowError> {
        self.resolver.authenticated(ctx)?;
        self.load(id)?;
        Ok(self.events
               .list_events(id)?
               .into_iter()
               .filter_map(|ev| match ev.kind {
                   EvaluationEventKind::StatusChanged { from, to, comment, policy_id } => {
                       Some(StatusChange { from, to, actor_id: ev.actor_id, comment, policy_id, at: ev.ts })
                   }
                   _ => None,
               })
               .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use eval_domain::{EvaluationType, ProcessFields};

    fn ev(status: EvaluationStatus, t: EvaluationType, start: u32, done: Option<u32>) -> Evaluation {
        Evaluation { id: 1,
                     evaluation_number: "EVAL-20250101-0001".into(),
                     evaluation_type: t,
                     product_name: "A".into(),
                     part_number: "P".into(),
                     evaluator_id: 1,
                     part_approver_id: None,
                     group_approver_id: None,
                     status,
                     start_date: NaiveDate::from_ymd_opt(2025, 1, start).unwrap(),
                     completion_date: done.and_then(|d| NaiveDate::from_ymd_opt(2025, 1, d)),
                     cancel_reason: None,
                     fields: ProcessFields::default(),
                     version: 1,
                     created_at: Utc::now(),
                     updated_at: Utc::now() }
    }

    #[test]
    fn statistics_count_and_average() {
        let all = vec![ev(EvaluationStatus::Completed, EvaluationType::NewProduct, 1, Some(11)),
                       ev(EvaluationStatus::Completed, EvaluationType::MassProduction, 1, Some(5)),
                       ev(EvaluationStatus::Draft, EvaluationType::NewProduct, 3, None)];
        let stats = statistics_of(&all);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("completed"), Some(&2));
        assert_eq!(stats.by_type.get("new_product"), Some(&2));
        assert_eq!(stats.average_completion_days, Some(7.0));
        assert_eq!(statistics_of(&[]).average_completion_days, None);
    }
}
