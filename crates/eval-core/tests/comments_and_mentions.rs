mod test_support;

use eval_core::store::{MentionScope, MentionStore, MessageStore};
use eval_core::WorkflowError;
use eval_domain::{MentionStatus, MessageType, Priority, Role, COMMENT_TOMBSTONE};
use test_support::Harness;

#[test]
fn comment_mention_and_edit_replaces_targets() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let reviewer = h.user("reviewer", Role::User);
    let auditor = h.user("auditor", Role::User);
    let ev = h.draft(&owner, "new_product");

    let comment = h.svc.comments.create(&h.ctx(&owner), ev.id, "@reviewer please check", None).unwrap();
    let mentions = h.store.mentions_in(MentionScope::Comment(comment.id)).unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].mentioned_user_id, reviewer.id);

    let inbox = h.store.inbox(reviewer.id, false).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].message_type, MessageType::Mention);
    assert_eq!(inbox[0].priority, Priority::Normal);
    assert_eq!(inbox[0].title, format!("You were mentioned in {}", ev.evaluation_number));

    h.svc.comments.edit(&h.ctx(&owner), comment.id, "@reviewer please check again").unwrap();
    assert_eq!(h.store.inbox(reviewer.id, false).unwrap().len(), 1);

    h.svc.comments.edit(&h.ctx(&owner), comment.id, "@auditor please check").unwrap();
    let mentions = h.store.mentions_in(MentionScope::Comment(comment.id)).unwrap();
    assert_eq!(mentions.iter().map(|m| m.mentioned_user_id).collect::<Vec<_>>(), vec![auditor.id]);
    assert_eq!(h.store.inbox(auditor.id, false).unwrap().len(), 1);
    assert_eq!(h.store.inbox(reviewer.id, false).unwrap().len(), 1);
}

#[test]
fn duplicate_and_self_mentions() {
    let h = Harness::new();
    let alice = h.user("alice", Role::User);
    let bob = h.user("bob", Role::User);
    let ev = h.draft(&alice, "new_product");

    let c = h.svc.comments.create(&h.ctx(&alice), ev.id, "@alice @alice @bob", None).unwrap();
    let mentions = h.store.mentions_in(MentionScope::Comment(c.id)).unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].mentioned_user_id, bob.id);
    assert_eq!(mentions[0].mention_position, 14);
    assert!(h.store.inbox(alice.id, false).unwrap().is_empty());
}

#[test]
fn soft_delete_keeps_subtree() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let other = h.user("other", Role::User);
    let admin = h.user("root", Role::Admin);
    let ev = h.draft(&owner, "new_product");

    let root = h.svc.comments.create(&h.ctx(&owner), ev.id, "first", None).unwrap();
    let reply = h.svc.comments.create(&h.ctx(&other), ev.id, "answer", Some(root.id)).unwrap();
    assert_eq!(reply.depth, 1);

    let err = h.svc.comments.delete(&h.ctx(&other), root.id).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden(_)));

    let deleted = h.svc.comments.delete(&h.ctx(&owner), root.id).unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.content, COMMENT_TOMBSTONE);

    let tree = h.svc.comments.tree(&h.ctx(&other), ev.id, None).unwrap();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].replies[0].comment.id, reply.id);
    assert_eq!(tree[0].reply_count, 1);

    let err = h.svc.comments.create(&h.ctx(&other), ev.id, "late", Some(root.id)).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));

    let restored = h.svc.comments.restore(&h.ctx(&admin), root.id).unwrap();
    assert!(!restored.is_deleted);
    assert_eq!(restored.content, COMMENT_TOMBSTONE);
}

#[test]
fn only_author_edits_and_parent_must_match_evaluation() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let admin = h.user("root", Role::Admin);
    let a = h.draft(&owner, "new_product");
    let b = h.draft(&owner, "new_product");

    let c = h.svc.comments.create(&h.ctx(&owner), a.id, "hello", None).unwrap();
    assert!(matches!(h.svc.comments.edit(&h.ctx(&admin), c.id, "x").unwrap_err(), WorkflowError::Forbidden(_)));
    let err = h.svc.comments.create(&h.ctx(&owner), b.id, "wrong tree", Some(c.id)).unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { .. }));
    let edited = h.svc.comments.edit(&h.ctx(&owner), c.id, "  hello again ").unwrap();
    assert!(edited.is_edited);
    assert_eq!(edited.content, "hello again");
}

#[test]
fn mention_read_and_acknowledge() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let reviewer = h.user("reviewer", Role::User);
    let ev = h.draft(&owner, "new_product");
    h.svc.comments.create(&h.ctx(&owner), ev.id, "ping @reviewer", None).unwrap();

    let unread = h.svc.comments.mentions_for(&h.ctx(&reviewer), Some(MentionStatus::Unread)).unwrap();
    assert_eq!(unread.len(), 1);
    let id = unread[0].id;

    // otro usuario no ve la mención
    assert!(matches!(h.svc.comments.acknowledge(&h.ctx(&owner), id).unwrap_err(), WorkflowError::NotFound { .. }));

    let read = h.svc.comments.mark_mention_read(&h.ctx(&reviewer), id).unwrap();
    assert_eq!(read.status, MentionStatus::Read);
    let ack = h.svc.comments.acknowledge(&h.ctx(&reviewer), id).unwrap();
    assert_eq!(ack.status, MentionStatus::Acknowledged);
    assert_eq!(ack.read_at, read.read_at);
}

#[test]
fn description_mentions_on_create_and_update() {
    let h = Harness::new();
    let owner = h.user("owner", Role::User);
    let lead = h.user("lead", Role::PartLeader);
    let ev = h.draft(&owner, "new_product");

    let patch = eval_domain::EvaluationPatch { evaluation_reason: Some("asked by @lead".into()), ..Default::default() };
    h.svc.evaluations.update(&h.ctx(&owner), ev.id, &patch).unwrap();
    let rows = h.store.mentions_in(MentionScope::EvaluationDescription(ev.id)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].mentioned_user_id, lead.id);
    assert_eq!(h.store.unread_count(lead.id).unwrap(), 1);

    // volver a guardar el mismo texto no duplica el aviso
    let patch = eval_domain::EvaluationPatch { remarks: Some("still @lead".into()), ..Default::default() };
    h.svc.evaluations.update(&h.ctx(&owner), ev.id, &patch).unwrap();
    assert_eq!(h.store.unread_count(lead.id).unwrap(), 1);
}
