//! Derivación de destinatarios y composición de mensajes.
//!
//! Funciones puras: el `Notifier` se encarga de entregar.

use eval_domain::{Evaluation, EvaluationStatus, MessageType, NewMessage, Priority, UserId};
use indexmap::IndexSet;

/// A quién notificar una transición.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Todos los usuarios activos de ese rol (solicitud de aprobación).
    Approvers(eval_domain::Role),
    /// Participantes de la evaluación, sin el actor.
    Participants(Vec<UserId>),
}

pub fn audience(evaluation: &Evaluation, to: EvaluationStatus, actor_id: UserId) -> Audience {
    match to {
        EvaluationStatus::PendingPartApproval => Audience::Approvers(eval_domain::Role::PartLeader),
        EvaluationStatus::PendingGroupApproval => Audience::Approvers(eval_domain::Role::GroupLeader),
        _ => {
            let mut ids = IndexSet::new();
            ids.insert(evaluation.evaluator_id);
            ids.extend(evaluation.part_approver_id);
            ids.extend(evaluation.group_approver_id);
            ids.shift_remove(&actor_id);
            Audience::Participants(ids.into_iter().collect())
        }
    }
}

pub fn approval_request(evaluation: &Evaluation, actor: &str, recipient_id: UserId, sender_id: UserId) -> NewMessage {
    let stage = match evaluation.status {
        EvaluationStatus::PendingGroupApproval => "group",
        _ => "part",
    };
    NewMessage { title: format!("Approval Request: {}", evaluation.evaluation_number),
                 content: format!("{actor} requests {stage} approval for {} ({}, part {}).",
                                  evaluation.evaluation_number, evaluation.product_name, evaluation.part_number),
                 message_type: MessageType::ApprovalRequest,
                 priority: Priority::High,
                 recipient_id,
                 sender_id: Some(sender_id),
                 evaluation_id: Some(evaluation.id) }
}

pub fn status_update(evaluation: &Evaluation, from: EvaluationStatus, actor: &str, comment: Option<&str>,
                     recipient_id: UserId, sender_id: UserId)
                     -> NewMessage {
    let to = evaluation.status;
    let priority = match to {
        EvaluationStatus::Rejected | EvaluationStatus::Cancelled => Priority::High,
        _ => Priority::Normal,
    };
    let message_type = match to {
        EvaluationStatus::Completed => MessageType::EvaluationCompleted,
        _ => MessageType::StatusChange,
    };
    let mut content = format!("{} changed from {} to {} by {actor}.",
                              evaluation.evaluation_number,
                              from.label(),
                              to.label());
    if let Some(c) = comment.filter(|c| !c.trim().is_empty()) {
        content.push_str(&format!(" Comment: {}", c.trim()));
    }
    NewMessage { title: format!("Status Update: {}", evaluation.evaluation_number),
                 content,
                 message_type,
                 priority,
                 recipient_id,
                 sender_id: Some(sender_id),
                 evaluation_id: Some(evaluation.id) }
}

pub fn mention_notice(evaluation_number: &str, evaluation_id: Option<i64>, mentioner: &str, context: &str,
                      recipient_id: UserId, sender_id: UserId)
                      -> NewMessage {
    NewMessage { title: format!("You were mentioned in {evaluation_number}"),
                 content: format!("{mentioner} mentioned you: {context}"),
                 message_type: MessageType::Mention,
                 priority: Priority::Normal,
                 recipient_id,
                 sender_id: Some(sender_id),
                 evaluation_id }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use eval_domain::{EvaluationType, ProcessFields, Role};

    fn evaluation(status: EvaluationStatus) -> Evaluation {
        Evaluation { id: 9,
                     evaluation_number: "EVAL-20250115-0001".into(),
                     evaluation_type: EvaluationType::NewProduct,
                     product_name: "A".into(),
                     part_number: "P-1".into(),
                     evaluator_id: 1,
                     part_approver_id: Some(2),
                     group_approver_id: Some(1),
                     status,
                     start_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                     completion_date: None,
                     cancel_reason: None,
                     fields: ProcessFields::default(),
                     version: 1,
                     created_at: Utc::now(),
                     updated_at: Utc::now() }
    }

    #[test]
    fn participants_are_deduped_without_actor() {
        let ev = evaluation(EvaluationStatus::Rejected);
        assert_eq!(audience(&ev, EvaluationStatus::Rejected, 2), Audience::Participants(vec![1]));
        assert_eq!(audience(&ev, EvaluationStatus::Completed, 3), Audience::Participants(vec![1, 2]));
        assert_eq!(audience(&ev, EvaluationStatus::PendingGroupApproval, 2), Audience::Approvers(Role::GroupLeader));
    }

    #[test]
    fn rejection_is_high_priority() {
        let ev = evaluation(EvaluationStatus::Rejected);
        let msg = status_update(&ev, EvaluationStatus::PendingPartApproval, "p", Some("missing AQL"), 1, 2);
        assert_eq!(msg.priority, Priority::High);
        assert_eq!(msg.title, "Status Update: EVAL-20250115-0001");
        assert!(msg.content.contains("Pending Part Approval"));
        assert!(msg.content.ends_with("Comment: missing AQL"));
    }
}
