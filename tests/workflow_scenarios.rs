mod test_support;

use chrono::NaiveDate;
use eval_core::event::{EvaluationEventKind, EventStore};
use eval_core::store::{AuditSink, EvaluationStore, EvaluationWrite, LogFilter, MessageStore, UserDirectory};
use eval_core::WorkflowError;
use eval_domain::{Evaluation, EvaluationStatus as S, EvaluationStatus, EvaluationType, MessageType, OperationType,
                  Role, User};
use test_support::World;

enum Gate {
    Owner,
    OwnerOrAbove,
    AtLeast(Role),
}

/// Celdas legales de la máquina de estados, escritas a mano.
fn legal(from: S, to: S, ty: EvaluationType) -> Option<Gate> {
    let np = ty == EvaluationType::NewProduct;
    match (from, to) {
        (S::Draft, S::InProgress) => Some(Gate::Owner),
        (S::Draft | S::InProgress, S::PendingPartApproval) if np => Some(Gate::Owner),
        (S::Draft | S::InProgress, S::Completed) if !np => Some(Gate::Owner),
        (S::InProgress, S::Paused) => Some(Gate::OwnerOrAbove),
        (S::InProgress | S::Paused, S::Cancelled) => Some(Gate::AtLeast(Role::PartLeader)),
        (S::PendingPartApproval, S::PendingGroupApproval | S::Rejected) => Some(Gate::AtLeast(Role::PartLeader)),
        (S::PendingGroupApproval, S::PendingPartApproval | S::Completed | S::Rejected) => {
            Some(Gate::AtLeast(Role::GroupLeader))
        }
        (S::Paused | S::Rejected, S::InProgress) => Some(Gate::OwnerOrAbove),
        _ => None,
    }
}

fn admits(gate: &Gate, role: Role, is_owner: bool) -> bool {
    match gate {
        Gate::Owner => is_owner || role == Role::Admin,
        Gate::OwnerOrAbove => is_owner || role.level() >= Role::PartLeader.level(),
        Gate::AtLeast(min) => role.level() >= min.level(),
    }
}

/// Lleva la raíz a `status` escribiendo directo en el store.
fn force_status(w: &World, ev: Evaluation, status: S) -> Evaluation {
    let expected_version = ev.version;
    let mut next = ev;
    next.status = status;
    w.store
     .save_evaluation(&EvaluationWrite { evaluation: next,
                                         expected_version,
                                         actor_id: None,
                                         event: EvaluationEventKind::Updated { changed: vec!["status".into()] },
                                         details: None })
     .unwrap()
}

#[test]
fn new_product_goes_through_both_approvals() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let p = w.user("pleader", Role::PartLeader);
    let p2 = w.user("pleader2", Role::PartLeader);
    let retired = w.user("pleader_old", Role::PartLeader);
    w.store.set_active(retired.id, false).unwrap();
    let g = w.user("gleader", Role::GroupLeader);
    let wf = &w.app.services.workflow;

    let ev = w.create(&owner, "new_product", None);
    let (head, suffix) = ev.evaluation_number.split_at("EVAL-20250115-".len());
    assert_eq!(head, "EVAL-20250115-");
    assert!(suffix.len() == 4 && suffix.chars().all(|c| c.is_ascii_digit()), "{}", ev.evaluation_number);
    assert_eq!(ev.status, EvaluationStatus::Draft);

    wf.transition(&w.ctx(&owner), ev.id, EvaluationStatus::InProgress, None).unwrap();
    let ev = wf.transition(&w.ctx(&owner), ev.id, EvaluationStatus::PendingPartApproval, None).unwrap();
    assert_eq!(ev.status, EvaluationStatus::PendingPartApproval);
    for leader in [&p, &p2] {
        let inbox = w.store.inbox(leader.id, true).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message_type, MessageType::ApprovalRequest);
        assert_eq!(inbox[0].title, format!("Approval Request: {}", ev.evaluation_number));
    }
    assert!(w.store.inbox(retired.id, false).unwrap().is_empty());

    let ev = wf.approve(&w.ctx(&p), ev.id, None).unwrap();
    assert_eq!(ev.status, EvaluationStatus::PendingGroupApproval);
    assert_eq!(ev.part_approver_id, Some(p.id));
    assert_eq!(w.store.inbox(g.id, true).unwrap().len(), 1);

    let ev = wf.approve(&w.ctx(&g), ev.id, Some("looks good")).unwrap();
    assert_eq!(ev.status, EvaluationStatus::Completed);
    assert_eq!(ev.group_approver_id, Some(g.id));
    assert_eq!(ev.completion_date, NaiveDate::from_ymd_opt(2025, 1, 15));

    let approvals = w.store
                     .query_logs(&LogFilter { operation_type: Some(OperationType::Approve), ..Default::default() })
                     .unwrap();
    assert_eq!(approvals.len(), 2);
    assert!(approvals.iter().all(|l| l.success && l.target_id == Some(ev.id)));
    let completed = w.store.inbox(owner.id, true).unwrap();
    assert!(completed.iter().any(|m| m.message_type == MessageType::EvaluationCompleted));
}

#[test]
fn mass_production_completes_without_approvers() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let ev = w.create(&owner, "mass_production", Some("in_progress"));
    assert_eq!(ev.status, EvaluationStatus::InProgress);

    let ev = w.app.services.workflow.transition(&w.ctx(&owner), ev.id, EvaluationStatus::Completed, None).unwrap();
    assert_eq!(ev.status, EvaluationStatus::Completed);
    assert_eq!(ev.part_approver_id, None);
    assert_eq!(ev.group_approver_id, None);
    assert!(ev.completion_date.is_some());
}

#[test]
fn rejection_records_reason_and_owner_reopens() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let p = w.user("pleader", Role::PartLeader);
    let ev = w.awaiting_part(&owner);
    let before = w.store.inbox(owner.id, false).unwrap().len();

    let ev = w.app.services.workflow.reject(&w.ctx(&p), ev.id, "missing AQL").unwrap();
    assert_eq!(ev.status, EvaluationStatus::Rejected);
    let remarks = ev.fields.remarks.clone().unwrap_or_default();
    let line = remarks.lines().last().unwrap_or_default();
    assert!(line.contains("pleader") && line.contains("missing AQL"), "{remarks}");
    let inbox = w.store.inbox(owner.id, false).unwrap();
    assert_eq!(inbox.len(), before + 1);
    assert_eq!(inbox[0].message_type, MessageType::StatusChange);

    let ev = w.app.services.workflow.transition(&w.ctx(&owner), ev.id, EvaluationStatus::InProgress, None).unwrap();
    assert_eq!(ev.status, EvaluationStatus::InProgress);
    assert_eq!(ev.part_approver_id, None);
}

#[test]
fn reject_without_reason_is_a_validation_error() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let p = w.user("pleader", Role::PartLeader);
    let ev = w.awaiting_part(&owner);
    let err = w.app.services.workflow.reject(&w.ctx(&p), ev.id, "  ").unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));
    let err = w.app.services.workflow.approve(&w.ctx(&owner), ev.id, None).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}

#[test]
fn pending_approvals_follow_the_role() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let p = w.user("pleader", Role::PartLeader);
    let g = w.user("gleader", Role::GroupLeader);
    let admin = w.user("admin", Role::Admin);
    let first = w.awaiting_part(&owner);
    let second = w.awaiting_part(&owner);
    w.app.services.workflow.approve(&w.ctx(&p), second.id, None).unwrap();
    w.clock.advance(chrono::Duration::days(3));

    let wf = &w.app.services.workflow;
    let for_part: Vec<_> = wf.pending_approvals(&w.ctx(&p)).unwrap().into_iter().map(|a| a.evaluation.id).collect();
    assert_eq!(for_part, vec![first.id]);
    let for_group = wf.pending_approvals(&w.ctx(&g)).unwrap();
    assert_eq!(for_group.len(), 1);
    assert_eq!(for_group[0].stage, "group");
    assert_eq!(for_group[0].days_pending, 3);
    assert_eq!(wf.pending_approvals(&w.ctx(&admin)).unwrap().len(), 2);
    assert!(matches!(wf.pending_approvals(&w.ctx(&owner)), Err(WorkflowError::Forbidden(_))));
}

#[test]
fn cells_outside_the_table_leave_the_row_untouched() {
    let w = World::new();
    let bystander = w.user("bystander", Role::User);
    let actors: Vec<User> = Role::ALL.iter().map(|r| w.user(&format!("actor_{r}"), *r)).collect();
    let mut checked = 0;

    for ty in EvaluationType::ALL {
        for from in S::ALL {
            for actor in &actors {
                for is_owner in [true, false] {
                    let owner = if is_owner { actor } else { &bystander };
                    let ev = force_status(&w, w.create(owner, ty.as_str(), None), *from);

                    for to in S::ALL {
                        let expected = if from.is_terminal() {
                            WorkflowError::Terminal(*from)
                        } else {
                            match legal(*from, *to, *ty) {
                                None => WorkflowError::InvalidTransition { from: *from, to: *to },
                                Some(gate) if !admits(&gate, actor.role, is_owner) => {
                                    WorkflowError::forbidden("gate")
                                }
                                Some(_) => continue,
                            }
                        };
                        let events_before = w.store.list_events(ev.id).unwrap().len();
                        let err = w.app
                                   .services
                                   .workflow
                                   .transition(&w.ctx(actor), ev.id, *to, Some("sweep"))
                                   .unwrap_err();
                        match expected {
                            WorkflowError::Forbidden(_) => {
                                assert!(matches!(err, WorkflowError::Forbidden(_)),
                                        "{ty} {from}->{to} as {} owner={is_owner}: {err:?}",
                                        actor.role)
                            }
                            other => assert_eq!(err, other, "{ty} {from}->{to} as {} owner={is_owner}", actor.role),
                        }
                        let stored = w.store.find_evaluation(ev.id).unwrap().unwrap();
                        assert_eq!((stored.status, stored.version), (ev.status, ev.version));
                        assert_eq!(w.store.list_events(ev.id).unwrap().len(), events_before);
                        checked += 1;
                    }
                }
            }
        }
    }
    assert!(checked > 500, "{checked}");
}

#[test]
fn terminal_states_reject_every_move() {
    let w = World::new();
    let owner = w.user("owner", Role::User);
    let admin = w.user("admin", Role::Admin);
    let ev = w.create(&owner, "mass_production", Some("in_progress"));
    let done = w.app.services.workflow.transition(&w.ctx(&owner), ev.id, S::Completed, None).unwrap();

    for to in S::ALL {
        let err = w.app.services.workflow.transition(&w.ctx(&admin), done.id, *to, None).unwrap_err();
        assert_eq!(err, WorkflowError::Terminal(S::Completed));
    }
    let err = w.app.services.workflow.approve(&w.ctx(&admin), done.id, None).unwrap_err();
    assert_eq!(err, WorkflowError::Terminal(S::Completed));
    assert_eq!(w.store.find_evaluation(done.id).unwrap().unwrap().version, done.version);
}
