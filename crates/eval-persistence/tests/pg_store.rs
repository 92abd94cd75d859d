mod test_support;

use chrono::{Duration, Utc};
use eval_core::identity::TokenDenylist;
use eval_core::store::{EvaluationStore, EvaluationWrite, MentionScope, MentionStore, StoreError};
use eval_core::{EvaluationEventKind, EventStore};
use eval_domain::{EvaluationStatus, MentionType, NewEvaluation, NewMention, Role};
use eval_persistence::pg::{PgDenylist, PoolProvider};
use serde_json::json;
use test_support::{ctx, services, store, unique, user, with_pool};

fn new_evaluation() -> NewEvaluation {
    NewEvaluation { evaluation_type: "new_product".into(),
                    product_name: "SSD 2TB".into(),
                    part_number: "P-77".into(),
                    start_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 15),
                    ..Default::default() }
}

#[test]
fn stale_version_is_rejected_without_writing() {
    with_pool(|pool| {
        let store = store(pool);
        let svc = services(store.clone());
        let owner = user(&store, "owner", Role::User);
        let ev = svc.evaluations.create(&ctx(&owner), &new_evaluation()).expect("create");
        assert_eq!(ev.version, 1);

        let mut next = ev.clone();
        next.fields.remarks = Some("late writer".into());
        let stale = EvaluationWrite { evaluation: next.clone(),
                                      expected_version: 0,
                                      actor_id: Some(owner.id),
                                      event: EvaluationEventKind::Updated { changed: vec!["remarks".into()] },
                                      details: None };
        assert_eq!(store.save_evaluation(&stale), Err(StoreError::VersionConflict));

        let fresh = EvaluationWrite { expected_version: 1, ..stale };
        let saved = store.save_evaluation(&fresh).expect("save");
        assert_eq!(saved.version, 2);
        assert_eq!(saved.fields.remarks.as_deref(), Some("late writer"));

        let events = store.list_events(ev.id).expect("events");
        let names: Vec<&str> = events.iter().map(|e| e.kind.name()).collect();
        assert_eq!(names, vec!["created", "updated"]);
        assert!(events[0].seq < events[1].seq);
    });
}

#[test]
fn duplicate_number_is_unique_violation() {
    with_pool(|pool| {
        let store = store(pool);
        let svc = services(store.clone());
        let owner = user(&store, "owner", Role::User);
        let ev = svc.evaluations.create(&ctx(&owner), &new_evaluation()).expect("create");
        let record = eval_core::store::EvaluationRecord { evaluation_number: ev.evaluation_number.clone(),
                                                          evaluation_type: ev.evaluation_type,
                                                          product_name: "dup".into(),
                                                          part_number: "dup".into(),
                                                          evaluator_id: owner.id,
                                                          status: EvaluationStatus::Draft,
                                                          start_date: ev.start_date,
                                                          fields: Default::default(),
                                                          details: vec![],
                                                          results: vec![],
                                                          created_at: Utc::now() };
        assert!(matches!(store.insert_evaluation(&record), Err(StoreError::UniqueViolation(_))));
    });
}

#[test]
fn process_graph_rewrite_keeps_ids_and_drops_missing_rows() {
    with_pool(|pool| {
        let store = store(pool);
        let svc = services(store.clone());
        let owner = user(&store, "owner", Role::User);
        let c = ctx(&owner);
        let ev = svc.evaluations.create(&c, &new_evaluation()).expect("create");
        let payload = json!({"processes": [{
            "key": "p1",
            "lots": [{"client_id": "L1", "lot_number": "LOT-1", "quantity": 100},
                     {"client_id": "L2", "lot_number": "LOT-2", "quantity": 50}],
            "steps": [{"step_code": "M031", "pass_units": 80, "fail_units": 15,
                       "failures": [{"fail_code_text": "201"}, {"fail_code_text": "short"}]},
                      {"step_code": "M010", "lot_refs": [{"client_id": "L1"}]}]
        }]});
        let first = svc.evaluations.replace_processes(&c, ev.id, &payload).expect("first write");
        assert_eq!(first.lots.len(), 2);
        assert_eq!(first.steps[0].total_units, Some(97));
        assert_eq!(first.steps[0].lots.len(), 2);
        assert_eq!(first.steps[0].failures[1].fail_code_text, "SHORT");
        assert!(!first.steps[1].results_applicable);

        let smaller = json!({"processes": [{
            "key": "p1",
            "lots": [{"client_id": "L1", "lot_number": "LOT-1", "quantity": 100}],
            "steps": [{"step_code": "M031", "pass_units": 90}]
        }]});
        let second = svc.evaluations.replace_processes(&c, ev.id, &smaller).expect("second write");
        assert_eq!(second.lots.len(), 1);
        assert_eq!(second.lots[0].id, first.lots[0].id);
        assert_eq!(second.steps.len(), 1);
        assert_eq!(second.steps[0].id, first.steps[0].id);
        assert!(second.steps[0].failures.is_empty());
        assert_eq!(second.steps[0].lots.len(), 1);

        let root = store.find_evaluation(ev.id).expect("find").expect("exists");
        assert_eq!(root.version, 3);
        let raw = store.latest_raw_payload(ev.id).expect("raw").expect("present");
        assert_eq!(raw.payload, smaller);
        assert_eq!(raw.payload_hash.len(), 64);
    });
}

#[test]
fn deleting_an_evaluation_cascades() {
    with_pool(|pool| {
        let store = store(pool);
        let svc = services(store.clone());
        let owner = user(&store, "owner", Role::User);
        let c = ctx(&owner);
        let ev = svc.evaluations.create(&c, &new_evaluation()).expect("create");
        svc.comments.create(&c, ev.id, "first look", None).expect("comment");
        svc.evaluations.delete(&c, ev.id).expect("delete");
        assert_eq!(store.find_evaluation(ev.id).expect("find"), None);
        assert!(store.list_events(ev.id).expect("events").is_empty());
        assert!(matches!(store.delete_evaluation(ev.id), Err(StoreError::NotFound(_))));
    });
}

#[test]
fn mention_replacement_is_scoped() {
    with_pool(|pool| {
        let store = store(pool);
        let svc = services(store.clone());
        let owner = user(&store, "owner", Role::User);
        let peer = user(&store, "peer", Role::User);
        let ev = svc.evaluations.create(&ctx(&owner), &new_evaluation()).expect("create");
        let mention = |t: MentionType| NewMention { mention_type: t,
                                                    mentioned_user_id: peer.id,
                                                    mentioner_id: owner.id,
                                                    evaluation_id: Some(ev.id),
                                                    comment_id: None,
                                                    message_id: None,
                                                    context_text: "see @peer".into(),
                                                    mention_position: 4 };
        let now = Utc::now();
        let scope = MentionScope::EvaluationDescription(ev.id);
        store.replace_mentions(scope, &[mention(MentionType::EvaluationDescription)], now).expect("first");
        let saved = store.replace_mentions(scope, &[mention(MentionType::EvaluationDescription)], now)
                         .expect("second");
        assert_eq!(saved.len(), 1);
        assert_eq!(store.mentions_in(scope).expect("list").len(), 1);
        let inbox = store.mentions_for_user(peer.id, None).expect("for user");
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, saved[0].id);
    });
}

#[test]
fn denylist_revokes_and_purges() {
    with_pool(|pool| {
        let list = PgDenylist::new(PoolProvider { pool: pool.clone() });
        let now = Utc::now();
        let expired = unique("jti");
        let live = unique("jti");
        list.revoke(&expired, now - Duration::minutes(1)).expect("revoke");
        list.revoke(&live, now + Duration::hours(1)).expect("revoke");
        list.revoke(&live, now + Duration::hours(1)).expect("idempotent");
        assert!(list.is_revoked(&expired).expect("check"));
        assert!(list.purge_expired(now).expect("purge") >= 1);
        assert!(!list.is_revoked(&expired).expect("check"));
        assert!(list.is_revoked(&live).expect("check"));
    });
}
