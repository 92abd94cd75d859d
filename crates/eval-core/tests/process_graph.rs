mod test_support;

use eval_core::store::FailCodeStore;
use eval_core::WorkflowError;
use eval_domain::Role;
use serde_json::json;
use test_support::Harness;

fn payload() -> serde_json::Value {
    json!({"processes": [{
        "key": "p1",
        "name": "Reliability",
        "lots": [{"client_id": "L1", "lot_number": "LOT-1", "quantity": 100},
                 {"client_id": "L2", "lot_number": "LOT-2", "quantity": 50}],
        "steps": [{
            "step_code": "M031",
            "lot_refs": [{"client_id": "L1"}, {"client_id": "L2"}],
            "pass_units": 80,
            "fail_units": 15,
            "failures": [{"fail_code_text": "201", "serial_number": "SN1"},
                         {"fail_code_text": "SHORT", "serial_number": "SN2"}]
        }]
    }]})
}

#[test]
fn rewrite_aggregates_mints_codes_and_preserves_ids() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ev = h.draft(&owner, "new_product");
    let ctx = h.ctx(&owner);

    let graph = h.svc.evaluations.replace_processes(&ctx, ev.id, &payload()).unwrap();
    assert_eq!(graph.lots.len(), 2);
    let step = &graph.steps[0];
    assert_eq!(step.total_units, Some(97));
    assert!(step.aggregation_holds());
    assert_eq!(step.lots.len(), 2);
    assert!(step.failures.iter().all(|f| f.fail_code_id.is_some()));

    for code in ["201", "SHORT"] {
        let row = h.store.find_code(code).unwrap().expect("minted");
        assert!(row.is_provisional);
    }

    let again = h.svc.evaluations.replace_processes(&ctx, ev.id, &payload()).unwrap();
    let ids = |g: &eval_domain::ProcessGraph| {
        (g.lots.iter().map(|l| l.id).collect::<Vec<_>>(), g.steps.iter().map(|s| s.id).collect::<Vec<_>>())
    };
    assert_eq!(ids(&graph), ids(&again));
    assert_eq!(h.store.list_codes(true).unwrap().len(), 2);

    let view = h.svc.evaluations.get(&ctx, ev.id).unwrap();
    assert_eq!(view.evaluation.version, ev.version + 2);
    let raw = h.svc.evaluations.processes_raw(&ctx, ev.id).unwrap().expect("raw payload");
    assert_eq!(raw.source, "rc0");
    assert_eq!(raw.payload, payload());
}

#[test]
fn removed_lots_are_deleted_and_new_ones_get_fresh_ids() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ev = h.draft(&owner, "new_product");
    let ctx = h.ctx(&owner);
    let first = h.svc.evaluations.replace_processes(&ctx, ev.id, &payload()).unwrap();

    let mut next = payload();
    next["processes"][0]["lots"] = json!([{"client_id": "L1", "lot_number": "LOT-1", "quantity": 100},
                                          {"client_id": "L3", "lot_number": "LOT-3", "quantity": 20}]);
    next["processes"][0]["steps"][0]["lot_refs"] = json!([{"client_id": "L1"}]);
    let second = h.svc.evaluations.replace_processes(&ctx, ev.id, &next).unwrap();

    assert_eq!(second.lots.len(), 2);
    assert_eq!(second.lot_by_client_id("p1", "L1").unwrap().id, first.lot_by_client_id("p1", "L1").unwrap().id);
    assert!(second.lot_by_client_id("p1", "L2").is_none());
    let l3 = second.lot_by_client_id("p1", "L3").unwrap();
    assert!(first.lots.iter().all(|l| l.id != l3.id));
}

#[test]
fn over_capacity_payload_is_rejected_without_writes() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let ev = h.draft(&owner, "new_product");
    let ctx = h.ctx(&owner);

    let mut bad = payload();
    bad["processes"][0]["steps"][0]["pass_units"] = json!(500);
    let err = h.svc.evaluations.replace_processes(&ctx, ev.id, &bad).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));
    let view = h.svc.evaluations.get(&ctx, ev.id).unwrap();
    assert!(view.processes.steps.is_empty());
    assert_eq!(view.evaluation.version, ev.version);
    assert!(h.svc.evaluations.processes_raw(&ctx, ev.id).unwrap().is_none());
}

#[test]
fn other_users_cannot_rewrite() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let stranger = h.user("stranger", Role::User);
    let ev = h.draft(&owner, "new_product");
    let err = h.svc.evaluations.replace_processes(&h.ctx(&stranger), ev.id, &payload()).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));
}
