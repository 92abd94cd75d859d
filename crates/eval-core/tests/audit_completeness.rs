mod test_support;

use eval_core::event::{EvaluationEventKind, EventStore};
use eval_core::store::{AuditSink, LogFilter};
use eval_core::WorkflowError;
use eval_domain::{DetailInput, EvaluationPatch, EvaluationStatus, NewEvaluationResult, OperationType, Role};
use serde_json::json;
use test_support::Harness;

#[test]
fn every_mutation_leaves_one_entry() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ctx = h.ctx(&owner);
    let ev = h.draft(&owner, "new_product");

    h.svc.evaluations.update(&ctx, ev.id, &EvaluationPatch { capacity: Some("512GB".into()), ..Default::default() })
     .unwrap();
    h.svc.evaluations.transition(&ctx, ev.id, EvaluationStatus::InProgress, None).unwrap();
    h.svc.evaluations
     .add_result(&ctx,
                 ev.id,
                 &NewEvaluationResult { result_type: "doe".into(),
                                        result_status: None,
                                        result_data: json!({"iops": 1}),
                                        test_date: None,
                                        comments: None })
     .unwrap();

    let on_target = h.store.query_logs(&LogFilter { target_id: Some(ev.id), ..Default::default() }).unwrap();
    let ops: Vec<OperationType> = on_target.iter().map(|l| l.operation_type).collect();
    assert_eq!(ops, vec![OperationType::Create, OperationType::Update, OperationType::Update]);
    assert!(on_target.iter().all(|l| l.success && l.user_id == Some(owner.id)));
    assert_eq!(on_target[0].status_code, Some(201));
    assert_eq!(on_target[0].ip_address.as_deref(), Some("10.0.0.1"));
}

#[test]
fn details_change_is_recorded_once_and_only_when_different() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ctx = h.ctx(&owner);
    let ev = h.draft(&owner, "new_product");
    let patch = EvaluationPatch { details: Some(vec![DetailInput { detail_type: "material".into(),
                                                                   material_name: Some("NAND".into()),
                                                                   material_number: Some("M-7".into()),
                                                                   ..Default::default() }]),
                                  ..Default::default() };

    let first = h.svc.evaluations.update(&ctx, ev.id, &patch).unwrap();
    assert_eq!(first.version, ev.version + 1);
    let again = h.svc.evaluations.update(&ctx, ev.id, &patch).unwrap();
    assert_eq!(again.version, first.version);

    let updates: Vec<Vec<String>> = h.store
                                     .list_events(ev.id)
                                     .unwrap()
                                     .into_iter()
                                     .filter_map(|e| match e.kind {
                                         EvaluationEventKind::Updated { changed } => Some(changed),
                                         _ => None,
                                     })
                                     .collect();
    assert_eq!(updates, vec![vec!["details".to_string()]]);
}

#[test]
fn failed_mutation_is_recorded_once() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ev = h.draft(&owner, "new_product");

    let err = h.svc.evaluations
               .transition(&h.ctx(&owner), ev.id, EvaluationStatus::Completed, None)
               .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    let failures = h.store.query_logs(&LogFilter { success: Some(false), ..Default::default() }).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].target_id, Some(ev.id));
    assert_eq!(failures[0].status_code, Some(422));
    assert!(failures[0].error_message.as_deref().unwrap_or_default().contains("invalid transition"));
}

#[test]
fn audit_sink_failure_does_not_fail_the_call() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    h.store.set_audit_failure(true);
    let ev = h.draft(&owner, "mass_production");
    assert!(ev.id > 0);
    h.store.set_audit_failure(false);
    assert!(h.store.query_logs(&LogFilter::default()).unwrap().is_empty());
}

#[test]
fn logs_are_admin_only() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let admin = h.user("root", Role::Admin);
    h.draft(&owner, "new_product");
    assert!(h.svc.audit.logs(&owner.principal(), &LogFilter::default()).is_err());
    assert_eq!(h.svc.audit.logs(&admin.principal(), &LogFilter::default()).unwrap().len(), 1);
}
