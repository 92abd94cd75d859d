//! eval-domain
//!
//! Entidades del agregado Evaluation y vocabularios cerrados (estados, roles,
//! tipos de detalle/resultado/mención/mensaje). No hace I/O: sólo tipos,
//! comandos de entrada y validación de campos.
//!
//! Los enums se persisten como strings en minúsculas (`draft`,
//! `in_progress`, ...); ver `string_tag!`.

#[macro_use]
mod tags;

pub mod comment;
pub mod detail;
pub mod error;
pub mod evaluation;
pub mod fail_code;
pub mod mention;
pub mod message;
pub mod operation_log;
pub mod process;
pub mod result;
pub mod role;
pub mod status;
pub mod user;

pub use comment::{Comment, CommentNode, NewComment, COMMENT_TOMBSTONE};
pub use detail::{DetailInput, DetailType, DetailVariant, EvaluationDetail};
pub use error::{DomainError, FieldError, Violations};
pub use evaluation::{AppliedPatch, Evaluation, EvaluationPatch, NewEvaluation, ProcessFields, ValidEvaluation};
pub use fail_code::{FailCode, FailCodeSource, NewFailCode};
pub use mention::{Mention, MentionStatus, MentionType, NewMention};
pub use message::{Message, MessageType, NewMessage, Priority};
pub use operation_log::{NewOperationLog, OperationLog, OperationType};
pub use process::{FailureInput, FailurePlan, LotInput, LotLinkPlan, LotPlan, LotRefInput, ProcessGraph, ProcessGraphPlan,
                  ProcessInput, ProcessLot, ProcessPayload, ProcessStep, RawProcessPayload, StepFailure, StepInput, StepLot,
                  StepPlan};
pub use result::{EvaluationResult, NewEvaluationResult, ResultDraft, ResultStatus, ResultType};
pub use role::{Principal, Role};
pub use status::{ApprovalStage, EvaluationStatus, EvaluationType};
pub use user::{NewUser, User};

/// Identificadores numéricos (BIGSERIAL en Postgres).
pub type UserId = i64;
pub type EvaluationId = i64;
pub type CommentId = i64;
pub type FailCodeId = i64;
pub type MessageId = i64;
pub type MentionId = i64;
