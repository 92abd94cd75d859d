//! Contratos de persistencia del núcleo.
//!
//! Cada trait corresponde a una porción del Persistence Store. Las
//! implementaciones deben:
//! - ejecutar cada método como una unidad atómica;
//! - serializar escrituras sobre la raíz de una Evaluation (lock de fila o
//!   equivalente) y verificar `expected_version`, devolviendo
//!   `StoreError::VersionConflict` si no coincide;
//! - reportar colisiones de índices únicos como `StoreError::UniqueViolation`.
//!
//! `memory::InMemoryStore` implementa todos los traits; `eval-persistence`
//! provee la versión Postgres con la misma semántica.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use eval_domain::{Comment, CommentId, DetailVariant, Evaluation, EvaluationDetail, EvaluationId, EvaluationResult,
                  EvaluationStatus, EvaluationType, FailCode, Mention, MentionId, MentionStatus, Message, MessageId,
                  NewComment, NewFailCode, NewMention, NewMessage, NewOperationLog, NewUser, OperationLog,
                  OperationType, ProcessFields, ProcessGraph, ProcessGraphPlan, RawProcessPayload, ResultDraft, Role,
                  User, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::event::{EvaluationEventKind, EventStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique violation: {0}")] UniqueViolation(String),
    #[error("version conflict")] VersionConflict,
    #[error("not found: {0}")] NotFound(String),
    #[error("backend error: {0}")] Backend(String),
}

/// Fila nueva de Evaluation con sus hijos iniciales.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub evaluation_number: String,
    pub evaluation_type: EvaluationType,
    pub product_name: String,
    pub part_number: String,
    pub evaluator_id: UserId,
    pub status: EvaluationStatus,
    pub start_date: NaiveDate,
    pub fields: ProcessFields,
    pub details: Vec<DetailVariant>,
    pub results: Vec<ResultDraft>,
    pub created_at: DateTime<Utc>,
}

/// Escritura de la raíz con control de versión optimista.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationWrite {
    /// Estado nuevo completo (la versión se ignora; la asigna el store).
    pub evaluation: Evaluation,
    pub expected_version: i32,
    pub actor_id: Option<UserId>,
    pub event: EvaluationEventKind,
    /// Reemplazo de detalles en la misma unidad atómica.
    pub details: Option<Vec<DetailVariant>>,
}

/// Reescritura atómica del grafo de proceso (incrementa la versión de la raíz).
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessGraphWrite {
    pub evaluation_id: EvaluationId,
    pub expected_version: i32,
    pub actor_id: Option<UserId>,
    pub plan: ProcessGraphPlan,
    pub raw_payload: Value,
    pub raw_source: String,
    pub payload_hash: String,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFilter {
    #[serde(default)]
    pub statuses: Vec<EvaluationStatus>,
    #[serde(default)]
    pub evaluation_type: Option<EvaluationType>,
    #[serde(default)]
    pub evaluator_id: Option<UserId>,
}

impl EvaluationFilter {
    pub fn matches(&self, e: &Evaluation) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&e.status))
        && self.evaluation_type.map_or(true, |t| t == e.evaluation_type)
        && self.evaluator_id.map_or(true, |id| id == e.evaluator_id)
    }
}

pub trait EvaluationStore: Send + Sync {
    /// Inserta la raíz, detalles, resultados y el evento `Created`.
    /// `UniqueViolation` si el número ya existe.
    fn insert_evaluation(&self, record: &EvaluationRecord) -> StoreResult<Evaluation>;
    /// Mayor número existente que comienza con `prefix` (orden lexicográfico).
    fn latest_number(&self, prefix: &str) -> StoreResult<Option<String>>;
    fn find_evaluation(&self, id: EvaluationId) -> StoreResult<Option<Evaluation>>;
    fn list_evaluations(&self, filter: &EvaluationFilter) -> StoreResult<Vec<Evaluation>>;
    /// Persiste `write.evaluation` con `version = expected_version + 1` y
    /// agrega el evento; `VersionConflict` si la versión no coincide.
    fn save_evaluation(&self, write: &EvaluationWrite) -> StoreResult<Evaluation>;
    /// Borra la raíz y todos sus hijos.
    fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()>;
    fn list_details(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationDetail>>;
    fn add_result(&self, id: EvaluationId, draft: &ResultDraft, now: DateTime<Utc>) -> StoreResult<EvaluationResult>;
    fn list_results(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationResult>>;
    fn load_process_graph(&self, id: EvaluationId) -> StoreResult<ProcessGraph>;
    /// Upsert del grafo: lotes por `(process_key, client_id)`, steps por
    /// `(process_order_index, step_code)`; filas ausentes se borran; fallas y
    /// vínculos step↔lote se reemplazan. Guarda el payload crudo.
    fn replace_process_graph(&self, write: &ProcessGraphWrite) -> StoreResult<ProcessGraph>;
    fn latest_raw_payload(&self, id: EvaluationId) -> StoreResult<Option<RawProcessPayload>>;
}

pub trait UserDirectory: Send + Sync {
    fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;
    fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Usuarios activos con exactamente ese rol.
    fn active_with_role(&self, role: Role) -> StoreResult<Vec<User>>;
    fn insert_user(&self, user: &NewUser, now: DateTime<Utc>) -> StoreResult<User>;
    fn touch_last_login(&self, id: UserId, at: DateTime<Utc>) -> StoreResult<()>;
    fn set_active(&self, id: UserId, active: bool) -> StoreResult<User>;
}

pub trait FailCodeStore: Send + Sync {
    fn find_code(&self, code: &str) -> StoreResult<Option<FailCode>>;
    fn insert_code(&self, code: &NewFailCode, now: DateTime<Utc>) -> StoreResult<FailCode>;
    fn update_code(&self, code: &FailCode) -> StoreResult<FailCode>;
    fn list_codes(&self, provisional_only: bool) -> StoreResult<Vec<FailCode>>;
}

pub trait CommentStore: Send + Sync {
    fn insert_comment(&self, comment: &NewComment, now: DateTime<Utc>) -> StoreResult<Comment>;
    fn find_comment(&self, id: CommentId) -> StoreResult<Option<Comment>>;
    fn update_comment(&self, comment: &Comment) -> StoreResult<Comment>;
    fn list_comments(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<Comment>>;
}

/// Ámbito de un reemplazo de menciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionScope {
    Comment(CommentId),
    EvaluationDescription(EvaluationId),
}

pub trait MentionStore: Send + Sync {
    /// Borra las menciones del ámbito e inserta las nuevas, atómicamente.
    fn replace_mentions(&self, scope: MentionScope, mentions: &[NewMention], now: DateTime<Utc>)
                        -> StoreResult<Vec<Mention>>;
    fn mentions_in(&self, scope: MentionScope) -> StoreResult<Vec<Mention>>;
    fn mentions_for_user(&self, user_id: UserId, status: Option<MentionStatus>) -> StoreResult<Vec<Mention>>;
    fn find_mention(&self, id: MentionId) -> StoreResult<Option<Mention>>;
    fn update_mention(&self, mention: &Mention) -> StoreResult<Mention>;
}

/// Sink de notificaciones in-app (un mensaje por llamada).
pub trait MessageStore: Send + Sync {
    fn deliver(&self, message: &NewMessage, now: DateTime<Utc>) -> StoreResult<Message>;
    fn inbox(&self, recipient_id: UserId, unread_only: bool) -> StoreResult<Vec<Message>>;
    fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>>;
    fn set_read(&self, id: MessageId, read_at: Option<DateTime<Utc>>) -> StoreResult<Message>;
    fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub operation_type: Option<OperationType>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<i64>,
    #[serde(default)]
    pub success: Option<bool>,
}

impl LogFilter {
    pub fn matches(&self, log: &OperationLog) -> bool {
        self.user_id.map_or(true, |u| log.user_id == Some(u))
        && self.operation_type.map_or(true, |t| log.operation_type == t)
        && self.target_type.as_ref().map_or(true, |t| &log.target_type == t)
        && self.target_id.map_or(true, |id| log.target_id == Some(id))
        && self.success.map_or(true, |s| log.success == s)
    }
}

pub trait AuditSink: Send + Sync {
    fn append_log(&self, entry: &NewOperationLog, at: DateTime<Utc>) -> StoreResult<OperationLog>;
    fn query_logs(&self, filter: &LogFilter) -> StoreResult<Vec<OperationLog>>;
}

/// Conjunto de stores que consumen los servicios. Permite combinar backends
/// (p.ej. envolver sólo `evaluations` en tests).
#[derive(Clone)]
pub struct Stores {
    pub evaluations: Arc<dyn EvaluationStore>,
    pub events: Arc<dyn EventStore>,
    pub users: Arc<dyn UserDirectory>,
    pub fail_codes: Arc<dyn FailCodeStore>,
    pub comments: Arc<dyn CommentStore>,
    pub mentions: Arc<dyn MentionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Stores {
    /// Todos los stores respaldados por el mismo backend.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
        where B: EvaluationStore + EventStore + UserDirectory + FailCodeStore + CommentStore + MentionStore
                  + MessageStore + AuditSink + 'static
    {
        Self { evaluations: backend.clone(),
               events: backend.clone(),
               users: backend.clone(),
               fail_codes: backend.clone(),
               comments: backend.clone(),
               mentions: backend.clone(),
               messages: backend.clone(),
               audit: backend }
    }
}

/// Reutiliza ids existentes por clave natural. `existing` en orden de id;
/// claves repetidas se consumen en orden de cola. Devuelve, por cada clave
/// pedida, el id reutilizado (o `None` si es nueva) y los ids sobrantes.
pub fn reuse_ids<K: Eq + std::hash::Hash + Clone>(existing: &[(K, i64)], wanted: &[K]) -> (Vec<Option<i64>>, Vec<i64>) {
    use std::collections::{HashMap, VecDeque};
    let mut queues: HashMap<K, VecDeque<i64>> = HashMap::new();
    for (k, id) in existing {
        queues.entry(k.clone()).or_default().push_back(*id);
    }
    let assigned = wanted.iter().map(|k| queues.get_mut(k).and_then(VecDeque::pop_front)).collect();
    let mut stale: Vec<i64> = queues.into_values().flatten().collect();
    stale.sort_unstable();
    (assigned, stale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuse_ids_consumes_duplicates_in_order() {
        let existing = vec![(("p1", "S1"), 10), (("p1", "S1"), 11), (("p1", "S2"), 12)];
        let wanted = vec![("p1", "S1"), ("p1", "S3"), ("p1", "S1")];
        let (assigned, stale) = reuse_ids(&existing, &wanted);
        assert_eq!(assigned, vec![Some(10), None, Some(11)]);
        assert_eq!(stale, vec![12]);
    }
}
