//! Filas Diesel (lectura e inserción) y su mapeo a entidades del dominio.
//!
//! Los vocabularios cerrados viajan como texto; un tag desconocido al leer
//! se reporta como `PersistenceError::Decode`.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use eval_core::{EvaluationEvent, EvaluationEventKind};
use eval_domain::{Comment, DetailVariant, DomainError, Evaluation, EvaluationDetail, EvaluationResult, FailCode,
                  Mention, Message, NewComment, NewFailCode, NewMention, NewMessage, NewOperationLog, NewUser,
                  OperationLog, ProcessFields, ProcessLot, ProcessStep, RawProcessPayload, ResultDraft, StepFailure,
                  StepLot, User};
use serde_json::Value;

use crate::error::PersistenceError;
use crate::schema::{comments, evaluation_details, evaluation_events, evaluation_lots, evaluation_process_raw,
                    evaluation_process_step_failures, evaluation_process_step_lots, evaluation_process_steps,
                    evaluation_results, evaluations, fail_codes, mentions, messages, operation_logs, revoked_tokens,
                    users};

fn tag<T: FromStr<Err = DomainError>>(raw: &str) -> Result<T, PersistenceError> {
    raw.parse().map_err(PersistenceError::from)
}

// ---------------------------------------------------------------------------
// users

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = users, check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub department: Option<String>,
    pub position: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_domain(self) -> Result<User, PersistenceError> {
        Ok(User { id: self.id,
                  username: self.username,
                  email: self.email,
                  full_name: self.full_name,
                  password_hash: self.password_hash,
                  role: tag(&self.role)?,
                  is_active: self.is_active,
                  department: self.department,
                  position: self.position,
                  last_login: self.last_login,
                  created_at: self.created_at,
                  updated_at: self.updated_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUserRow<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub full_name: &'a str,
    pub password_hash: &'a str,
    pub role: &'static str,
    pub is_active: bool,
    pub department: Option<&'a str>,
    pub position: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> NewUserRow<'a> {
    pub fn new(user: &'a NewUser, now: DateTime<Utc>) -> Self {
        Self { username: &user.username,
               email: &user.email,
               full_name: &user.full_name,
               password_hash: &user.password_hash,
               role: user.role.as_str(),
               is_active: true,
               department: user.department.as_deref(),
               position: user.position.as_deref(),
               created_at: now,
               updated_at: now }
    }
}

// ---------------------------------------------------------------------------
// evaluations

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluations, check_for_backend(diesel::pg::Pg))]
pub struct EvaluationRow {
    pub id: i64,
    pub evaluation_number: String,
    pub evaluation_type: String,
    pub product_name: String,
    pub part_number: String,
    pub evaluator_id: i64,
    pub part_approver_id: Option<i64>,
    pub group_approver_id: Option<i64>,
    pub status: String,
    pub start_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub cancel_reason: Option<String>,
    pub evaluation_reason: Option<String>,
    pub remarks: Option<String>,
    pub process_step: Option<String>,
    pub pgm_version: Option<String>,
    pub capacity: Option<String>,
    pub interface_type: Option<String>,
    pub form_factor: Option<String>,
    pub scs_charger_name: Option<String>,
    pub head_office_charger_name: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRow {
    pub fn into_domain(self) -> Result<Evaluation, PersistenceError> {
        Ok(Evaluation { id: self.id,
                        evaluation_number: self.evaluation_number,
                        evaluation_type: tag(&self.evaluation_type)?,
                        product_name: self.product_name,
                        part_number: self.part_number,
                        evaluator_id: self.evaluator_id,
                        part_approver_id: self.part_approver_id,
                        group_approver_id: self.group_approver_id,
                        status: tag(&self.status)?,
                        start_date: self.start_date,
                        completion_date: self.completion_date,
                        cancel_reason: self.cancel_reason,
                        fields: ProcessFields { evaluation_reason: self.evaluation_reason,
                                                remarks: self.remarks,
                                                process_step: self.process_step,
                                                pgm_version: self.pgm_version,
                                                capacity: self.capacity,
                                                interface_type: self.interface_type,
                                                form_factor: self.form_factor,
                                                scs_charger_name: self.scs_charger_name,
                                                head_office_charger_name: self.head_office_charger_name },
                        version: self.version,
                        created_at: self.created_at,
                        updated_at: self.updated_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluations)]
pub struct NewEvaluationRow<'a> {
    pub evaluation_number: &'a str,
    pub evaluation_type: &'static str,
    pub product_name: &'a str,
    pub part_number: &'a str,
    pub evaluator_id: i64,
    pub status: &'static str,
    pub start_date: NaiveDate,
    pub evaluation_reason: Option<&'a str>,
    pub remarks: Option<&'a str>,
    pub process_step: Option<&'a str>,
    pub pgm_version: Option<&'a str>,
    pub capacity: Option<&'a str>,
    pub interface_type: Option<&'a str>,
    pub form_factor: Option<&'a str>,
    pub scs_charger_name: Option<&'a str>,
    pub head_office_charger_name: Option<&'a str>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Estado completo de la raíz para `UPDATE`; `None` escribe NULL.
#[derive(AsChangeset, Debug)]
#[diesel(table_name = evaluations, treat_none_as_null = true)]
pub struct EvaluationChanges<'a> {
    pub evaluation_type: &'static str,
    pub product_name: &'a str,
    pub part_number: &'a str,
    pub part_approver_id: Option<i64>,
    pub group_approver_id: Option<i64>,
    pub status: &'static str,
    pub start_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub cancel_reason: Option<&'a str>,
    pub evaluation_reason: Option<&'a str>,
    pub remarks: Option<&'a str>,
    pub process_step: Option<&'a str>,
    pub pgm_version: Option<&'a str>,
    pub capacity: Option<&'a str>,
    pub interface_type: Option<&'a str>,
    pub form_factor: Option<&'a str>,
    pub scs_charger_name: Option<&'a str>,
    pub head_office_charger_name: Option<&'a str>,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl<'a> EvaluationChanges<'a> {
    pub fn new(e: &'a Evaluation, version: i32) -> Self {
        let f = &e.fields;
        Self { evaluation_type: e.evaluation_type.as_str(),
               product_name: &e.product_name,
               part_number: &e.part_number,
               part_approver_id: e.part_approver_id,
               group_approver_id: e.group_approver_id,
               status: e.status.as_str(),
               start_date: e.start_date,
               completion_date: e.completion_date,
               cancel_reason: e.cancel_reason.as_deref(),
               evaluation_reason: f.evaluation_reason.as_deref(),
               remarks: f.remarks.as_deref(),
               process_step: f.process_step.as_deref(),
               pgm_version: f.pgm_version.as_deref(),
               capacity: f.capacity.as_deref(),
               interface_type: f.interface_type.as_deref(),
               form_factor: f.form_factor.as_deref(),
               scs_charger_name: f.scs_charger_name.as_deref(),
               head_office_charger_name: f.head_office_charger_name.as_deref(),
               version,
               updated_at: e.updated_at }
    }
}

// ---------------------------------------------------------------------------
// details / results

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_details, check_for_backend(diesel::pg::Pg))]
pub struct DetailRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub detail_type: String,
    pub pgm_version_before: Option<String>,
    pub pgm_version_after: Option<String>,
    pub material_name: Option<String>,
    pub material_number: Option<String>,
    pub equipment_name: Option<String>,
    pub equipment_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DetailRow {
    pub fn into_domain(self) -> Result<EvaluationDetail, PersistenceError> {
        let cols = [self.pgm_version_before,
                    self.pgm_version_after,
                    self.material_name,
                    self.material_number,
                    self.equipment_name,
                    self.equipment_number];
        Ok(EvaluationDetail { id: self.id,
                              evaluation_id: self.evaluation_id,
                              variant: DetailVariant::from_columns(&self.detail_type, cols)?,
                              created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluation_details)]
pub struct NewDetailRow {
    pub evaluation_id: i64,
    pub detail_type: &'static str,
    pub pgm_version_before: Option<String>,
    pub pgm_version_after: Option<String>,
    pub material_name: Option<String>,
    pub material_number: Option<String>,
    pub equipment_name: Option<String>,
    pub equipment_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewDetailRow {
    pub fn new(evaluation_id: i64, variant: &DetailVariant, now: DateTime<Utc>) -> Self {
        let (detail_type, [before, after, mname, mnum, ename, enumber]) = variant.to_columns();
        Self { evaluation_id,
               detail_type: detail_type.as_str(),
               pgm_version_before: before,
               pgm_version_after: after,
               material_name: mname,
               material_number: mnum,
               equipment_name: ename,
               equipment_number: enumber,
               created_at: now }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_results, check_for_backend(diesel::pg::Pg))]
pub struct ResultRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub result_type: String,
    pub result_status: String,
    pub result_data: Value,
    pub test_date: Option<NaiveDate>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ResultRow {
    pub fn into_domain(self) -> Result<EvaluationResult, PersistenceError> {
        Ok(EvaluationResult { id: self.id,
                              evaluation_id: self.evaluation_id,
                              result_type: tag(&self.result_type)?,
                              result_status: tag(&self.result_status)?,
                              result_data: self.result_data,
                              test_date: self.test_date,
                              comments: self.comments,
                              created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluation_results)]
pub struct NewResultRow<'a> {
    pub evaluation_id: i64,
    pub result_type: &'static str,
    pub result_status: &'static str,
    pub result_data: &'a Value,
    pub test_date: Option<NaiveDate>,
    pub comments: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewResultRow<'a> {
    pub fn new(evaluation_id: i64, draft: &'a ResultDraft, now: DateTime<Utc>) -> Self {
        Self { evaluation_id,
               result_type: draft.result_type.as_str(),
               result_status: draft.result_status.as_str(),
               result_data: &draft.result_data,
               test_date: draft.test_date,
               comments: draft.comments.as_deref(),
               created_at: now }
    }
}

// ---------------------------------------------------------------------------
// grafo de proceso

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_lots, check_for_backend(diesel::pg::Pg))]
pub struct LotRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub process_key: Option<String>,
    pub process_name: Option<String>,
    pub process_order_index: Option<i32>,
    pub client_id: Option<String>,
    pub lot_number: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LotRow> for ProcessLot {
    fn from(r: LotRow) -> Self {
        ProcessLot { id: r.id,
                     evaluation_id: r.evaluation_id,
                     process_key: r.process_key,
                     process_name: r.process_name,
                     process_order_index: r.process_order_index,
                     client_id: r.client_id,
                     lot_number: r.lot_number,
                     quantity: r.quantity,
                     created_at: r.created_at,
                     updated_at: r.updated_at }
    }
}

/// Valores de un lote para INSERT o UPDATE (un lote reutilizado conserva su
/// `created_at`).
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = evaluation_lots)]
pub struct LotValues<'a> {
    pub evaluation_id: i64,
    pub process_key: &'a str,
    pub process_name: &'a str,
    pub process_order_index: i32,
    pub client_id: &'a str,
    pub lot_number: &'a str,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_process_steps, check_for_backend(diesel::pg::Pg))]
pub struct StepRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub process_key: Option<String>,
    pub process_name: Option<String>,
    pub process_order_index: Option<i32>,
    pub order_index: i32,
    pub step_code: String,
    pub step_label: Option<String>,
    pub eval_code: Option<String>,
    pub results_applicable: bool,
    pub total_units_manual: bool,
    pub total_units: Option<i32>,
    pub pass_units: Option<i32>,
    pub fail_units: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRow {
    pub fn into_domain(self, lots: Vec<StepLot>, failures: Vec<StepFailure>) -> ProcessStep {
        ProcessStep { id: self.id,
                      evaluation_id: self.evaluation_id,
                      process_key: self.process_key,
                      process_name: self.process_name,
                      process_order_index: self.process_order_index,
                      order_index: self.order_index,
                      step_code: self.step_code,
                      step_label: self.step_label,
                      eval_code: self.eval_code,
                      results_applicable: self.results_applicable,
                      total_units_manual: self.total_units_manual,
                      total_units: self.total_units,
                      pass_units: self.pass_units,
                      fail_units: self.fail_units,
                      notes: self.notes,
                      lots,
                      failures,
                      created_at: self.created_at,
                      updated_at: self.updated_at }
    }
}

/// Valores de un step para INSERT o UPDATE (`None` escribe NULL).
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = evaluation_process_steps, treat_none_as_null = true)]
pub struct StepValues<'a> {
    pub evaluation_id: i64,
    pub process_key: &'a str,
    pub process_name: &'a str,
    pub process_order_index: i32,
    pub order_index: i32,
    pub step_code: &'a str,
    pub step_label: Option<&'a str>,
    pub eval_code: Option<&'a str>,
    pub results_applicable: bool,
    pub total_units_manual: bool,
    pub total_units: Option<i32>,
    pub pass_units: Option<i32>,
    pub fail_units: Option<i32>,
    pub notes: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, Selectable, Insertable, Debug)]
#[diesel(table_name = evaluation_process_step_lots, check_for_backend(diesel::pg::Pg))]
pub struct StepLotRow {
    pub step_id: i64,
    pub lot_id: i64,
    pub quantity_override: Option<i32>,
}

impl From<StepLotRow> for StepLot {
    fn from(r: StepLotRow) -> Self {
        StepLot { step_id: r.step_id, lot_id: r.lot_id, quantity_override: r.quantity_override }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_process_step_failures, check_for_backend(diesel::pg::Pg))]
pub struct FailureRow {
    pub id: i64,
    pub step_id: i64,
    pub sequence: i32,
    pub serial_number: Option<String>,
    pub fail_code_id: Option<i64>,
    pub fail_code_text: String,
    pub fail_code_name_snapshot: Option<String>,
    pub analysis_result: Option<String>,
}

impl From<FailureRow> for StepFailure {
    fn from(r: FailureRow) -> Self {
        StepFailure { id: r.id,
                      step_id: r.step_id,
                      sequence: r.sequence,
                      serial_number: r.serial_number,
                      fail_code_id: r.fail_code_id,
                      fail_code_text: r.fail_code_text,
                      fail_code_name_snapshot: r.fail_code_name_snapshot,
                      analysis_result: r.analysis_result }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluation_process_step_failures)]
pub struct NewFailureRow<'a> {
    pub step_id: i64,
    pub sequence: i32,
    pub serial_number: Option<&'a str>,
    pub fail_code_id: Option<i64>,
    pub fail_code_text: &'a str,
    pub fail_code_name_snapshot: Option<&'a str>,
    pub analysis_result: Option<&'a str>,
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_process_raw, check_for_backend(diesel::pg::Pg))]
pub struct RawRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub payload: Value,
    pub source: String,
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<RawRow> for RawProcessPayload {
    fn from(r: RawRow) -> Self {
        RawProcessPayload { evaluation_id: r.evaluation_id,
                            payload: r.payload,
                            source: r.source,
                            payload_hash: r.payload_hash,
                            created_at: r.created_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluation_process_raw)]
pub struct NewRawRow<'a> {
    pub evaluation_id: i64,
    pub payload: &'a Value,
    pub source: &'a str,
    pub payload_hash: &'a str,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// eventos

/// Fila de `evaluation_events`: el enum completo va en `payload` y
/// `event_type` repite su nombre para el CHECK y para filtrar.
#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = evaluation_events, check_for_backend(diesel::pg::Pg))]
pub struct EventRow {
    pub seq: i64,
    pub evaluation_id: i64,
    pub actor_id: Option<i64>,
    pub event_type: String,
    pub schema_version: i32,
    pub payload: Value,
    pub ts: DateTime<Utc>,
}

impl EventRow {
    pub fn into_domain(self) -> Result<EvaluationEvent, PersistenceError> {
        let kind: EvaluationEventKind = serde_json::from_value(self.payload)
            .map_err(|e| PersistenceError::Decode(format!("event seq={} type={}: {e}", self.seq, self.event_type)))?;
        Ok(EvaluationEvent { seq: self.seq,
                             evaluation_id: self.evaluation_id,
                             actor_id: self.actor_id,
                             kind,
                             ts: self.ts })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = evaluation_events)]
pub struct NewEventRow<'a> {
    pub evaluation_id: i64,
    pub actor_id: Option<i64>,
    pub event_type: &'static str,
    pub schema_version: i32,
    pub payload: &'a Value,
    pub ts: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// diccionario de fail codes

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = fail_codes, check_for_backend(diesel::pg::Pg))]
pub struct FailCodeRow {
    pub id: i64,
    pub code: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub is_provisional: bool,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FailCodeRow> for FailCode {
    fn from(r: FailCodeRow) -> Self {
        FailCode { id: r.id,
                   code: r.code,
                   short_name: r.short_name,
                   description: r.description,
                   is_provisional: r.is_provisional,
                   source: r.source,
                   created_at: r.created_at,
                   updated_at: r.updated_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = fail_codes)]
pub struct NewFailCodeRow<'a> {
    pub code: &'a str,
    pub short_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub is_provisional: bool,
    pub source: Option<&'static str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> NewFailCodeRow<'a> {
    pub fn new(code: &'a NewFailCode, now: DateTime<Utc>) -> Self {
        Self { code: &code.code,
               short_name: code.short_name.as_deref(),
               description: code.description.as_deref(),
               is_provisional: code.is_provisional,
               source: code.source.map(|s| s.as_str()),
               created_at: now,
               updated_at: now }
    }
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = fail_codes, treat_none_as_null = true)]
pub struct FailCodeChanges<'a> {
    pub short_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub is_provisional: bool,
    pub source: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// comentarios y menciones

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = comments, check_for_backend(diesel::pg::Pg))]
pub struct CommentRow {
    pub id: i64,
    pub evaluation_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub depth: i32,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(r: CommentRow) -> Self {
        Comment { id: r.id,
                  evaluation_id: r.evaluation_id,
                  author_id: r.author_id,
                  parent_comment_id: r.parent_comment_id,
                  depth: r.depth,
                  content: r.content,
                  is_edited: r.is_edited,
                  edited_at: r.edited_at,
                  is_deleted: r.is_deleted,
                  deleted_at: r.deleted_at,
                  created_at: r.created_at,
                  updated_at: r.updated_at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = comments)]
pub struct NewCommentRow<'a> {
    pub evaluation_id: i64,
    pub author_id: i64,
    pub parent_comment_id: Option<i64>,
    pub depth: i32,
    pub content: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> NewCommentRow<'a> {
    pub fn new(c: &'a NewComment, now: DateTime<Utc>) -> Self {
        Self { evaluation_id: c.evaluation_id,
               author_id: c.author_id,
               parent_comment_id: c.parent_comment_id,
               depth: c.depth,
               content: &c.content,
               created_at: now,
               updated_at: now }
    }
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = comments, treat_none_as_null = true)]
pub struct CommentChanges<'a> {
    pub content: &'a str,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Comment> for CommentChanges<'a> {
    fn from(c: &'a Comment) -> Self {
        Self { content: &c.content,
               is_edited: c.is_edited,
               edited_at: c.edited_at,
               is_deleted: c.is_deleted,
               deleted_at: c.deleted_at,
               updated_at: c.updated_at }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = mentions, check_for_backend(diesel::pg::Pg))]
pub struct MentionRow {
    pub id: i64,
    pub mention_type: String,
    pub mentioned_user_id: i64,
    pub mentioner_id: i64,
    pub evaluation_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub message_id: Option<i64>,
    pub context_text: String,
    pub mention_position: i32,
    pub status: String,
    pub read_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MentionRow {
    pub fn into_domain(self) -> Result<Mention, PersistenceError> {
        Ok(Mention { id: self.id,
                     mention_type: tag(&self.mention_type)?,
                     mentioned_user_id: self.mentioned_user_id,
                     mentioner_id: self.mentioner_id,
                     evaluation_id: self.evaluation_id,
                     comment_id: self.comment_id,
                     message_id: self.message_id,
                     context_text: self.context_text,
                     mention_position: self.mention_position,
                     status: tag(&self.status)?,
                     read_at: self.read_at,
                     acknowledged_at: self.acknowledged_at,
                     created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = mentions)]
pub struct NewMentionRow<'a> {
    pub mention_type: &'static str,
    pub mentioned_user_id: i64,
    pub mentioner_id: i64,
    pub evaluation_id: Option<i64>,
    pub comment_id: Option<i64>,
    pub message_id: Option<i64>,
    pub context_text: &'a str,
    pub mention_position: i32,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewMentionRow<'a> {
    pub fn new(m: &'a NewMention, now: DateTime<Utc>) -> Self {
        Self { mention_type: m.mention_type.as_str(),
               mentioned_user_id: m.mentioned_user_id,
               mentioner_id: m.mentioner_id,
               evaluation_id: m.evaluation_id,
               comment_id: m.comment_id,
               message_id: m.message_id,
               context_text: &m.context_text,
               mention_position: m.mention_position,
               status: eval_domain::MentionStatus::Unread.as_str(),
               created_at: now }
    }
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = mentions, treat_none_as_null = true)]
pub struct MentionChanges {
    pub status: &'static str,
    pub read_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// mensajes

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = messages, check_for_backend(diesel::pg::Pg))]
pub struct MessageRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub message_type: String,
    pub priority: String,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub evaluation_id: Option<i64>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn into_domain(self) -> Result<Message, PersistenceError> {
        Ok(Message { id: self.id,
                     title: self.title,
                     content: self.content,
                     message_type: tag(&self.message_type)?,
                     priority: tag(&self.priority)?,
                     recipient_id: self.recipient_id,
                     sender_id: self.sender_id,
                     evaluation_id: self.evaluation_id,
                     is_read: self.is_read,
                     read_at: self.read_at,
                     created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = messages)]
pub struct NewMessageRow<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub message_type: &'static str,
    pub priority: &'static str,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub evaluation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewMessageRow<'a> {
    pub fn new(m: &'a NewMessage, now: DateTime<Utc>) -> Self {
        Self { title: &m.title,
               content: &m.content,
               message_type: m.message_type.as_str(),
               priority: m.priority.as_str(),
               recipient_id: m.recipient_id,
               sender_id: m.sender_id,
               evaluation_id: m.evaluation_id,
               created_at: now }
    }
}

// ---------------------------------------------------------------------------
// auditoría y denylist

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = operation_logs, check_for_backend(diesel::pg::Pg))]
pub struct OperationLogRow {
    pub id: i64,
    pub user_id: Option<i64>,
    pub operation_type: String,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub target_description: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub ip_address: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OperationLogRow {
    pub fn into_domain(self) -> Result<OperationLog, PersistenceError> {
        Ok(OperationLog { id: self.id,
                          user_id: self.user_id,
                          operation_type: tag(&self.operation_type)?,
                          target_type: self.target_type,
                          target_id: self.target_id,
                          target_description: self.target_description,
                          old_data: self.old_data,
                          new_data: self.new_data,
                          ip_address: self.ip_address,
                          request_method: self.request_method,
                          request_path: self.request_path,
                          status_code: self.status_code,
                          success: self.success,
                          error_message: self.error_message,
                          created_at: self.created_at })
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = operation_logs)]
pub struct NewOperationLogRow<'a> {
    pub user_id: Option<i64>,
    pub operation_type: &'static str,
    pub target_type: &'a str,
    pub target_id: Option<i64>,
    pub target_description: Option<&'a str>,
    pub old_data: Option<&'a Value>,
    pub new_data: Option<&'a Value>,
    pub ip_address: Option<&'a str>,
    pub request_method: Option<&'a str>,
    pub request_path: Option<&'a str>,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error_message: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

impl<'a> NewOperationLogRow<'a> {
    pub fn new(e: &'a NewOperationLog, at: DateTime<Utc>) -> Self {
        Self { user_id: e.user_id,
               operation_type: e.operation_type.as_str(),
               target_type: &e.target_type,
               target_id: e.target_id,
               target_description: e.target_description.as_deref(),
               old_data: e.old_data.as_ref(),
               new_data: e.new_data.as_ref(),
               ip_address: e.ip_address.as_deref(),
               request_method: e.request_method.as_deref(),
               request_path: e.request_path.as_deref(),
               status_code: e.status_code,
               success: e.success,
               error_message: e.error_message.as_deref(),
               created_at: at }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = revoked_tokens)]
pub struct NewRevokedTokenRow<'a> {
    pub jti: &'a str,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}
