//! Tipos de evento del agregado y estructura `EvaluationEvent`.
//!
//! Rol:
//! - Cada escritura de la raíz (alta, patch, transición, reescritura del
//!   grafo) agrega exactamente un evento en la misma unidad atómica.
//! - `history(id)` del workflow se deriva de los `StatusChanged`.
//! - El enum es el contrato observable; se persiste como JSONB.
use chrono::{DateTime, Utc};
use eval_domain::{EvaluationId, EvaluationStatus, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EvaluationEventKind {
    /// Primer evento de toda Evaluation.
    Created { evaluation_number: String, status: EvaluationStatus },
    /// Transición aplicada por el motor. `policy_id` identifica la tabla de
    /// reglas vigente.
    StatusChanged {
        from: EvaluationStatus,
        to: EvaluationStatus,
        comment: Option<String>,
        policy_id: String,
    },
    /// Patch de campos (nombres de los campos cambiados).
    Updated { changed: Vec<String> },
    /// Reescritura del grafo de proceso; `payload_hash` es blake3 del JSON
    /// canónico recibido.
    ProcessesReplaced { payload_hash: String, lots: usize, steps: usize },
}

impl EvaluationEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EvaluationEventKind::Created { .. } => "created",
            EvaluationEventKind::StatusChanged { .. } => "status_changed",
            EvaluationEventKind::Updated { .. } => "updated",
            EvaluationEventKind::ProcessesReplaced { .. } => "processes_replaced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationEvent {
    pub seq: i64, // asignado por el store (orden de append)
    pub evaluation_id: EvaluationId,
    pub actor_id: Option<UserId>,
    pub kind: EvaluationEventKind,
    pub ts: DateTime<Utc>,
}
