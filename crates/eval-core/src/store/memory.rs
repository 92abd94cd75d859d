//! Backend en memoria de todos los stores del núcleo.
//!
//! Un único `RwLock` protege el estado completo: cada método toma el lock
//! una vez, por lo que es atómico respecto de los demás. Semántica de
//! versión, unicidad y cascadas igual a la de `eval-persistence`.
//!
//! Para tests se pueden forzar fallas en los sinks de mensajes y auditoría
//! (`set_message_failure`, `set_audit_failure`).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use eval_domain::{Comment, CommentId, Evaluation, EvaluationDetail, EvaluationId, EvaluationResult, FailCode, LotPlan,
                  Mention, MentionId, MentionStatus, MentionType, Message, MessageId, NewComment, NewFailCode,
                  NewMention, NewMessage, NewOperationLog, NewUser, OperationLog, ProcessGraph, ProcessLot, ProcessStep,
                  RawProcessPayload, ResultDraft, Role, StepFailure, StepLot, User, UserId};

use super::{reuse_ids, AuditSink, CommentStore, EvaluationFilter, EvaluationRecord, EvaluationStore, EvaluationWrite,
            FailCodeStore, LogFilter, MentionScope, MentionStore, MessageStore, ProcessGraphWrite, StoreError,
            StoreResult, UserDirectory};
use crate::event::{EvaluationEvent, EvaluationEventKind, EventLog, EventStore};

#[derive(Default)]
struct MemoryState {
    seq: i64,
    users: BTreeMap<UserId, User>,
    evaluations: BTreeMap<EvaluationId, Evaluation>,
    details: Vec<EvaluationDetail>,
    results: Vec<EvaluationResult>,
    lots: Vec<ProcessLot>,
    steps: Vec<ProcessStep>,
    raw_payloads: Vec<RawProcessPayload>,
    events: EventLog,
    fail_codes: BTreeMap<String, FailCode>,
    comments: BTreeMap<CommentId, Comment>,
    mentions: BTreeMap<MentionId, Mention>,
    messages: BTreeMap<MessageId, Message>,
    logs: Vec<OperationLog>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn graph(&self, id: EvaluationId) -> ProcessGraph {
        let mut lots: Vec<ProcessLot> = self.lots.iter().filter(|l| l.evaluation_id == id).cloned().collect();
        lots.sort_by_key(|l| (l.process_order_index, l.id));
        let mut steps: Vec<ProcessStep> = self.steps.iter().filter(|s| s.evaluation_id == id).cloned().collect();
        steps.sort_by_key(|s| (s.process_order_index, s.order_index, s.id));
        ProcessGraph { lots, steps }
    }

    fn push_details(&mut self, evaluation_id: EvaluationId, details: &[eval_domain::DetailVariant], now: DateTime<Utc>) {
        for variant in details {
            let id = self.next_id();
            self.details
                .push(EvaluationDetail { id, evaluation_id, variant: variant.clone(), created_at: now });
        }
    }

    fn push_result(&mut self, evaluation_id: EvaluationId, draft: &ResultDraft, now: DateTime<Utc>) -> EvaluationResult {
        let row = EvaluationResult { id: self.next_id(),
                                     evaluation_id,
                                     result_type: draft.result_type,
                                     result_status: draft.result_status,
                                     result_data: draft.result_data.clone(),
                                     test_date: draft.test_date,
                                     comments: draft.comments.clone(),
                                     created_at: now };
        self.results.push(row.clone());
        row
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
    fail_messages: AtomicBool,
    fail_audit: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hace fallar `deliver` (simula un sink caído).
    pub fn set_message_failure(&self, fail: bool) {
        self.fail_messages.store(fail, Ordering::SeqCst);
    }

    /// Hace fallar `append_log`.
    pub fn set_audit_failure(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

impl EvaluationStore for InMemoryStore {
    fn insert_evaluation(&self, record: &EvaluationRecord) -> StoreResult<Evaluation> {
        let mut st = self.write()?;
        if st.evaluations.values().any(|e| e.evaluation_number == record.evaluation_number) {
            return Err(StoreError::UniqueViolation(format!("evaluation_number {}", record.evaluation_number)));
        }
        let id = st.next_id();
        let ev = Evaluation { id,
                              evaluation_number: record.evaluation_number.clone(),
                              evaluation_type: record.evaluation_type,
                              product_name: record.product_name.clone(),
                              part_number: record.part_number.clone(),
                              evaluator_id: record.evaluator_id,
                              part_approver_id: None,
                              group_approver_id: None,
                              status: record.status,
                              start_date: record.start_date,
                              completion_date: None,
                              cancel_reason: None,
                              fields: record.fields.clone(),
                              version: 1,
                              created_at: record.created_at,
                              updated_at: record.created_at };
        st.evaluations.insert(id, ev.clone());
        st.push_details(id, &record.details, record.created_at);
        for draft in &record.results {
            st.push_result(id, draft, record.created_at);
        }
        st.events.append(id,
                         Some(record.evaluator_id),
                         EvaluationEventKind::Created { evaluation_number: ev.evaluation_number.clone(),
                                                        status: ev.status },
                         record.created_at);
        Ok(ev)
    }

    fn latest_number(&self, prefix: &str) -> StoreResult<Option<String>> {
        let st = self.read()?;
        Ok(st.evaluations
             .values()
             .filter(|e| e.evaluation_number.starts_with(prefix))
             .map(|e| e.evaluation_number.clone())
             .max())
    }

    fn find_evaluation(&self, id: EvaluationId) -> StoreResult<Option<Evaluation>> {
        Ok(self.read()?.evaluations.get(&id).cloned())
    }

    fn list_evaluations(&self, filter: &EvaluationFilter) -> StoreResult<Vec<Evaluation>> {
        let st = self.read()?;
        Ok(st.evaluations.values().filter(|e| filter.matches(e)).cloned().collect())
    }

    fn save_evaluation(&self, write: &EvaluationWrite) -> StoreResult<Evaluation> {
        let mut st = self.write()?;
        let id = write.evaluation.id;
        let current = st.evaluations
                        .get(&id)
                        .ok_or_else(|| StoreError::NotFound(format!("evaluation {id}")))?;
        if current.version != write.expected_version {
            return Err(StoreError::VersionConflict);
        }
        let mut saved = write.evaluation.clone();
        saved.version = write.expected_version + 1;
        st.evaluations.insert(id, saved.clone());
        if let Some(details) = &write.details {
            st.details.retain(|d| d.evaluation_id != id);
            st.push_details(id, details, saved.updated_at);
        }
        st.events.append(id, write.actor_id, write.event.clone(), saved.updated_at);
        Ok(saved)
    }

    fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()> {
        let mut st = self.write()?;
        if st.evaluations.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("evaluation {id}")));
        }
        st.details.retain(|d| d.evaluation_id != id);
        st.results.retain(|r| r.evaluation_id != id);
        st.lots.retain(|l| l.evaluation_id != id);
        st.steps.retain(|s| s.evaluation_id != id);
        st.raw_payloads.retain(|r| r.evaluation_id != id);
        st.events.purge(id);
        st.comments.retain(|_, c| c.evaluation_id != id);
        st.mentions.retain(|_, m| m.evaluation_id != Some(id));
        for msg in st.messages.values_mut() {
            if msg.evaluation_id == Some(id) {
                msg.evaluation_id = None;
            }
        }
        Ok(())
    }

    fn list_details(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationDetail>> {
        Ok(self.read()?.details.iter().filter(|d| d.evaluation_id == id).cloned().collect())
    }

    fn add_result(&self, id: EvaluationId, draft: &ResultDraft, now: DateTime<Utc>) -> StoreResult<EvaluationResult> {
        let mut st = self.write()?;
        if !st.evaluations.contains_key(&id) {
            return Err(StoreError::NotFound(format!("evaluation {id}")));
        }
        Ok(st.push_result(id, draft, now))
    }

    fn list_results(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationResult>> {
        Ok(self.read()?.results.iter().filter(|r| r.evaluation_id == id).cloned().collect())
    }

    fn load_process_graph(&self, id: EvaluationId) -> StoreResult<ProcessGraph> {
        Ok(self.read()?.graph(id))
    }

    fn replace_process_graph(&self, write: &ProcessGraphWrite) -> StoreResult<ProcessGraph> {
        let mut st = self.write()?;
        let eid = write.evaluation_id;
        let current = st.evaluations
                        .get(&eid)
                        .ok_or_else(|| StoreError::NotFound(format!("evaluation {eid}")))?;
        if current.version != write.expected_version {
            return Err(StoreError::VersionConflict);
        }
        let now = write.now;

        // lotes: (process_key, client_id)
        let old_lots: Vec<ProcessLot> = st.lots.iter().filter(|l| l.evaluation_id == eid).cloned().collect();
        let existing: Vec<((String, String), i64)> =
            old_lots.iter()
                    .map(|l| ((l.process_key.clone().unwrap_or_default(), l.client_id.clone().unwrap_or_default()), l.id))
                    .collect();
        let wanted: Vec<(String, String)> =
            write.plan.lots.iter().map(|l| (l.process_key.clone(), l.client_id.clone())).collect();
        let (assigned, _) = reuse_ids(&existing, &wanted);
        let mut new_lots = Vec::with_capacity(write.plan.lots.len());
        let mut lot_index: HashMap<(String, String), i64> = HashMap::new();
        for (plan, reused) in write.plan.lots.iter().zip(assigned) {
            let (id, created_at) = match reused.and_then(|id| old_lots.iter().find(|l| l.id == id)) {
                Some(old) => (old.id, old.created_at),
                None => (st.next_id(), now),
            };
            lot_index.insert((plan.process_key.clone(), plan.client_id.clone()), id);
            new_lots.push(lot_row(eid, id, plan, created_at, now));
        }

        // steps: (process_order_index, step_code)
        let old_steps: Vec<ProcessStep> = st.steps.iter().filter(|s| s.evaluation_id == eid).cloned().collect();
        let existing: Vec<((i32, String), i64)> = old_steps.iter()
                                                           .map(|s| {
                                                               ((s.process_order_index.unwrap_or(0), s.step_code.clone()),
                                                                s.id)
                                                           })
                                                           .collect();
        let wanted: Vec<(i32, String)> =
            write.plan.steps.iter().map(|s| (s.process_order_index, s.step_code.clone())).collect();
        let (assigned, _) = reuse_ids(&existing, &wanted);
        let mut new_steps = Vec::with_capacity(write.plan.steps.len());
        for (plan, reused) in write.plan.steps.iter().zip(assigned) {
            let (id, created_at) = match reused.and_then(|id| old_steps.iter().find(|s| s.id == id)) {
                Some(old) => (old.id, old.created_at),
                None => (st.next_id(), now),
            };
            let mut lots = Vec::with_capacity(plan.lot_links.len());
            for link in &plan.lot_links {
                let lot_id = lot_index.get(&(plan.process_key.clone(), link.client_id.clone()))
                                      .copied()
                                      .ok_or_else(|| StoreError::NotFound(format!("lot {}", link.client_id)))?;
                lots.push(StepLot { step_id: id, lot_id, quantity_override: link.quantity_override });
            }
            let mut failures = Vec::with_capacity(plan.failures.len());
            for f in &plan.failures {
                failures.push(StepFailure { id: st.next_id(),
                                            step_id: id,
                                            sequence: f.sequence,
                                            serial_number: f.serial_number.clone(),
                                            fail_code_id: f.fail_code_id,
                                            fail_code_text: f.fail_code_text.clone(),
                                            fail_code_name_snapshot: f.fail_code_name_snapshot.clone(),
                                            analysis_result: f.analysis_result.clone() });
            }
            new_steps.push(ProcessStep { id,
                                         evaluation_id: eid,
                                         process_key: Some(plan.process_key.clone()),
                                         process_name: Some(plan.process_name.clone()),
                                         process_order_index: Some(plan.process_order_index),
                                         order_index: plan.order_index,
                                         step_code: plan.step_code.clone(),
                                         step_label: plan.step_label.clone(),
                                         eval_code: plan.eval_code.clone(),
                                         results_applicable: plan.results_applicable,
                                         total_units_manual: plan.total_units_manual,
                                         total_units: plan.total_units,
                                         pass_units: plan.pass_units,
                                         fail_units: plan.fail_units,
                                         notes: plan.notes.clone(),
                                         lots,
                                         failures,
                                         created_at,
                                         updated_at: now });
        }

        st.lots.retain(|l| l.evaluation_id != eid);
        st.lots.extend(new_lots);
        st.steps.retain(|s| s.evaluation_id != eid);
        st.steps.extend(new_steps);
        st.raw_payloads.push(RawProcessPayload { evaluation_id: eid,
                                                 payload: write.raw_payload.clone(),
                                                 source: write.raw_source.clone(),
                                                 payload_hash: write.payload_hash.clone(),
                                                 created_at: now });
        if let Some(root) = st.evaluations.get_mut(&eid) {
            root.version += 1;
            root.updated_at = now;
        }
        let kind = EvaluationEventKind::ProcessesReplaced { payload_hash: write.payload_hash.clone(),
                                                            lots: write.plan.lots.len(),
                                                            steps: write.plan.steps.len() };
        st.events.append(eid, write.actor_id, kind, now);
        Ok(st.graph(eid))
    }

    fn latest_raw_payload(&self, id: EvaluationId) -> StoreResult<Option<RawProcessPayload>> {
        Ok(self.read()?.raw_payloads.iter().rev().find(|r| r.evaluation_id == id).cloned())
    }
}

fn lot_row(evaluation_id: EvaluationId, id: i64, plan: &LotPlan, created_at: DateTime<Utc>, now: DateTime<Utc>)
           -> ProcessLot {
    ProcessLot { id,
                 evaluation_id,
                 process_key: Some(plan.process_key.clone()),
                 process_name: Some(plan.process_name.clone()),
                 process_order_index: Some(plan.process_order_index),
                 client_id: Some(plan.client_id.clone()),
                 lot_number: plan.lot_number.clone(),
                 quantity: plan.quantity,
                 created_at,
                 updated_at: now }
}

impl EventStore for InMemoryStore {
    fn append_kind(&self, evaluation_id: EvaluationId, actor_id: Option<UserId>, kind: EvaluationEventKind,
                   ts: DateTime<Utc>)
                   -> StoreResult<EvaluationEvent> {
        Ok(self.write()?.events.append(evaluation_id, actor_id, kind, ts))
    }

    fn list_events(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<EvaluationEvent>> {
        Ok(self.read()?.events.list(evaluation_id))
    }
}

impl UserDirectory for InMemoryStore {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.username == username).cloned())
    }

    fn active_with_role(&self, role: Role) -> StoreResult<Vec<User>> {
        Ok(self.read()?.users.values().filter(|u| u.is_active && u.role == role).cloned().collect())
    }

    fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let mut st = self.write()?;
        if st.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::UniqueViolation(format!("username {}", user.username)));
        }
        if st.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::UniqueViolation(format!("email {}", user.email)));
        }
        let id = st.next_id();
        let row = User { id,
                         username: user.username.clone(),
                         email: user.email.clone(),
                         full_name: user.full_name.clone(),
                         password_hash: user.password_hash.clone(),
                         role: user.role,
                         is_active: true,
                         department: user.department.clone(),
                         position: user.position.clone(),
                         last_login: None,
                         created_at: now,
                         updated_at: now };
        st.users.insert(id, row.clone());
        Ok(row)
    }

    fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        let mut st = self.write()?;
        let user = st.users.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.last_login = Some(at);
        Ok(())
    }

    fn set_active(&self, id: UserId, active: bool) -> StoreResult<User> {
        let mut st = self.write()?;
        let user = st.users.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        user.is_active = active;
        Ok(user.clone())
    }
}

impl FailCodeStore for InMemoryStore {
    fn find_code(&self, code: &str) -> StoreResult<Option<FailCode>> {
        Ok(self.read()?.fail_codes.get(code).cloned())
    }

    fn insert_code(&self, code: &NewFailCode, now: DateTime<Utc>) -> StoreResult<FailCode> {
        let mut st = self.write()?;
        if st.fail_codes.contains_key(&code.code) {
            return Err(StoreError::UniqueViolation(format!("fail_code {}", code.code)));
        }
        let row = FailCode { id: st.next_id(),
                             code: code.code.clone(),
                             short_name: code.short_name.clone(),
                             description: code.description.clone(),
                             is_provisional: code.is_provisional,
                             source: code.source.map(|s| s.as_str().to_string()),
                             created_at: now,
                             updated_at: now };
        st.fail_codes.insert(row.code.clone(), row.clone());
        Ok(row)
    }

    fn update_code(&self, code: &FailCode) -> StoreResult<FailCode> {
        let mut st = self.write()?;
        match st.fail_codes.get_mut(&code.code) {
            Some(slot) if slot.id == code.id => {
                *slot = code.clone();
                Ok(code.clone())
            }
            _ => Err(StoreError::NotFound(format!("fail_code {}", code.code))),
        }
    }

    fn list_codes(&self, provisional_only: bool) -> StoreResult<Vec<FailCode>> {
        Ok(self.read()?.fail_codes.values().filter(|c| !provisional_only || c.is_provisional).cloned().collect())
    }
}

impl CommentStore for InMemoryStore {
    fn insert_comment(&self, comment: &NewComment, now: DateTime<Utc>) -> StoreResult<Comment> {
        let mut st = self.write()?;
        if !st.evaluations.contains_key(&comment.evaluation_id) {
            return Err(StoreError::NotFound(format!("evaluation {}", comment.evaluation_id)));
        }
        let row = Comment { id: st.next_id(),
                            evaluation_id: comment.evaluation_id,
                            author_id: comment.author_id,
                            parent_comment_id: comment.parent_comment_id,
                            depth: comment.depth,
                            content: comment.content.clone(),
                            is_edited: false,
                            edited_at: None,
                            is_deleted: false,
                            deleted_at: None,
                            created_at: now,
                            updated_at: now };
        st.comments.insert(row.id, row.clone());
        Ok(row)
    }

    fn find_comment(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        Ok(self.read()?.comments.get(&id).cloned())
    }

    fn update_comment(&self, comment: &Comment) -> StoreResult<Comment> {
        let mut st = self.write()?;
        let slot = st.comments
                     .get_mut(&comment.id)
                     .ok_or_else(|| StoreError::NotFound(format!("comment {}", comment.id)))?;
        *slot = comment.clone();
        Ok(comment.clone())
    }

    fn list_comments(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<Comment>> {
        Ok(self.read()?.comments.values().filter(|c| c.evaluation_id == evaluation_id).cloned().collect())
    }
}

fn in_scope(scope: MentionScope, m: &Mention) -> bool {
    match scope {
        MentionScope::Comment(id) => m.comment_id == Some(id),
        MentionScope::EvaluationDescription(id) => {
            m.mention_type == MentionType::EvaluationDescription && m.evaluation_id == Some(id)
        }
    }
}

impl MentionStore for InMemoryStore {
    fn replace_mentions(&self, scope: MentionScope, mentions: &[NewMention], now: DateTime<Utc>)
                        -> StoreResult<Vec<Mention>> {
        let mut st = self.write()?;
        st.mentions.retain(|_, m| !in_scope(scope, m));
        let mut out = Vec::with_capacity(mentions.len());
        for m in mentions {
            let row = Mention { id: st.next_id(),
                                mention_type: m.mention_type,
                                mentioned_user_id: m.mentioned_user_id,
                                mentioner_id: m.mentioner_id,
                                evaluation_id: m.evaluation_id,
                                comment_id: m.comment_id,
                                message_id: m.message_id,
                                context_text: m.context_text.clone(),
                                mention_position: m.mention_position,
                                status: MentionStatus::Unread,
                                read_at: None,
                                acknowledged_at: None,
                                created_at: now };
            st.mentions.insert(row.id, row.clone());
            out.push(row);
        }
        Ok(out)
    }

    fn mentions_in(&self, scope: MentionScope) -> StoreResult<Vec<Mention>> {
        Ok(self.read()?.mentions.values().filter(|m| in_scope(scope, m)).cloned().collect())
    }

    fn mentions_for_user(&self, user_id: UserId, status: Option<MentionStatus>) -> StoreResult<Vec<Mention>> {
        let st = self.read()?;
        let mut out: Vec<Mention> = st.mentions
                                      .values()
                                      .filter(|m| m.mentioned_user_id == user_id && status.map_or(true, |s| m.status == s))
                                      .cloned()
                                      .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    fn find_mention(&self, id: MentionId) -> StoreResult<Option<Mention>> {
        Ok(self.read()?.mentions.get(&id).cloned())
    }

    fn update_mention(&self, mention: &Mention) -> StoreResult<Mention> {
        let mut st = self.write()?;
        let slot = st.mentions
                     .get_mut(&mention.id)
                     .ok_or_else(|| StoreError::NotFound(format!("mention {}", mention.id)))?;
        *slot = mention.clone();
        Ok(mention.clone())
    }
}

impl MessageStore for InMemoryStore {
    fn deliver(&self, message: &NewMessage, now: DateTime<Utc>) -> StoreResult<Message> {
        if self.fail_messages.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("message sink unavailable".into()));
        }
        let mut st = self.write()?;
        let row = Message { id: st.next_id(),
                            title: message.title.clone(),
                            content: message.content.clone(),
                            message_type: message.message_type,
                            priority: message.priority,
                            recipient_id: message.recipient_id,
                            sender_id: message.sender_id,
                            evaluation_id: message.evaluation_id,
                            is_read: false,
                            read_at: None,
                            created_at: now };
        st.messages.insert(row.id, row.clone());
        Ok(row)
    }

    fn inbox(&self, recipient_id: UserId, unread_only: bool) -> StoreResult<Vec<Message>> {
        let st = self.read()?;
        let mut out: Vec<Message> = st.messages
                                      .values()
                                      .filter(|m| m.recipient_id == recipient_id && (!unread_only || !m.is_read))
                                      .cloned()
                                      .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.read()?.messages.get(&id).cloned())
    }

    fn set_read(&self, id: MessageId, read_at: Option<DateTime<Utc>>) -> StoreResult<Message> {
        let mut st = self.write()?;
        let msg = st.messages.get_mut(&id).ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        msg.is_read = read_at.is_some();
        msg.read_at = read_at;
        Ok(msg.clone())
    }

    fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64> {
        let st = self.read()?;
        Ok(st.messages.values().filter(|m| m.recipient_id == recipient_id && !m.is_read).count() as i64)
    }
}

impl AuditSink for InMemoryStore {
    fn append_log(&self, entry: &NewOperationLog, at: DateTime<Utc>) -> StoreResult<OperationLog> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("audit sink unavailable".into()));
        }
        let mut st = self.write()?;
        let row = OperationLog { id: st.next_id(),
                                 user_id: entry.user_id,
                                 operation_type: entry.operation_type,
                                 target_type: entry.target_type.clone(),
                                 target_id: entry.target_id,
                                 target_description: entry.target_description.clone(),
                                 old_data: entry.old_data.clone(),
                                 new_data: entry.new_data.clone(),
                                 ip_address: entry.ip_address.clone(),
                                 request_method: entry.request_method.clone(),
                                 request_path: entry.request_path.clone(),
                                 status_code: entry.status_code,
                                 success: entry.success,
                                 error_message: entry.error_message.clone(),
                                 created_at: at };
        st.logs.push(row.clone());
        Ok(row)
    }

    fn query_logs(&self, filter: &LogFilter) -> StoreResult<Vec<OperationLog>> {
        let st = self.read()?;
        Ok(st.logs.iter().filter(|l| filter.matches(l)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use eval_domain::{EvaluationStatus, EvaluationType, ProcessFields};

    fn record(number: &str) -> EvaluationRecord {
        EvaluationRecord { evaluation_number: number.into(),
                           evaluation_type: EvaluationType::NewProduct,
                           product_name: "A".into(),
                           part_number: "P-1".into(),
                           evaluator_id: 1,
                           status: EvaluationStatus::Draft,
                           start_date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
                           fields: ProcessFields::default(),
                           details: vec![],
                           results: vec![],
                           created_at: Utc::now() }
    }

    #[test]
    fn duplicate_number_is_unique_violation() {
        let store = InMemoryStore::new();
        store.insert_evaluation(&record("EVAL-20250115-0001")).unwrap();
        let err = store.insert_evaluation(&record("EVAL-20250115-0001")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.latest_number("EVAL-20250115-").unwrap().as_deref(), Some("EVAL-20250115-0001"));
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = InMemoryStore::new();
        let ev = store.insert_evaluation(&record("EVAL-20250115-0001")).unwrap();
        let write = EvaluationWrite { evaluation: ev.clone(),
                                      expected_version: 1,
                                      actor_id: Some(1),
                                      event: EvaluationEventKind::Updated { changed: vec![] },
                                      details: None };
        let saved = store.save_evaluation(&write).unwrap();
        assert_eq!(saved.version, 2);
        assert_eq!(store.save_evaluation(&write).unwrap_err(), StoreError::VersionConflict);
        assert_eq!(store.list_events(ev.id).unwrap().len(), 2);
    }

    #[test]
    fn failing_sink_reports_backend_error() {
        let store = InMemoryStore::new();
        store.set_message_failure(true);
        let msg = NewMessage { title: "t".into(),
                               content: "c".into(),
                               message_type: eval_domain::MessageType::SystemAnnouncement,
                               priority: eval_domain::Priority::Normal,
                               recipient_id: 1,
                               sender_id: None,
                               evaluation_id: None };
        assert!(matches!(store.deliver(&msg, Utc::now()), Err(StoreError::Backend(_))));
        store.set_message_failure(false);
        store.deliver(&msg, Utc::now()).unwrap();
        assert_eq!(store.unread_count(1).unwrap(), 1);
    }
}
