//! Grafo de proceso anidado: Lot / Step / StepLot / StepFailure.
//!
//! Tres capas de tipos:
//! - `ProcessPayload` y sus `*Input`: lo que envía el editor del cliente.
//! - `ProcessGraphPlan`: forma normalizada y agregada, lista para el upsert.
//! - `ProcessGraph`: filas persistidas (con ids estables).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EvaluationId, FailCodeId};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessPayload {
    #[serde(default)]
    pub processes: Vec<ProcessInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInput {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order_index: Option<i32>,
    #[serde(default)]
    pub lots: Vec<LotInput>,
    #[serde(default)]
    pub steps: Vec<StepInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LotInput {
    #[serde(default)]
    pub client_id: Option<String>,
    pub lot_number: String,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LotRefInput {
    pub client_id: String,
    #[serde(default)]
    pub quantity_override: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    #[serde(default)]
    pub order_index: Option<i32>,
    pub step_code: String,
    #[serde(default)]
    pub step_label: Option<String>,
    #[serde(default)]
    pub eval_code: Option<String>,
    #[serde(default)]
    pub lot_refs: Vec<LotRefInput>,
    #[serde(default)]
    pub results_applicable: Option<bool>,
    #[serde(default)]
    pub total_units_manual: Option<bool>,
    #[serde(default)]
    pub total_units: Option<i32>,
    #[serde(default)]
    pub pass_units: Option<i32>,
    #[serde(default)]
    pub fail_units: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub failures: Vec<FailureInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInput {
    #[serde(default)]
    pub sequence: Option<i32>,
    #[serde(default)]
    pub serial_number: Option<String>,
    pub fail_code_text: String,
    #[serde(default)]
    pub fail_code_name_snapshot: Option<String>,
    #[serde(default)]
    pub analysis_result: Option<String>,
}

// ---------------------------------------------------------------------------
// Plan normalizado
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessGraphPlan {
    pub lots: Vec<LotPlan>,
    pub steps: Vec<StepPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotPlan {
    pub process_key: String,
    pub process_name: String,
    pub process_order_index: i32,
    pub client_id: String,
    pub lot_number: String,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotLinkPlan {
    /// `client_id` de un lote del mismo proceso.
    pub client_id: String,
    pub quantity_override: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    pub process_key: String,
    pub process_name: String,
    pub process_order_index: i32,
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
    pub lot_links: Vec<LotLinkPlan>,
    pub failures: Vec<FailurePlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePlan {
    pub sequence: i32,
    pub serial_number: Option<String>,
    pub fail_code_id: Option<FailCodeId>,
    pub fail_code_text: String,
    pub fail_code_name_snapshot: Option<String>,
    pub analysis_result: Option<String>,
}

// ---------------------------------------------------------------------------
// Filas persistidas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessLot {
    pub id: i64,
    pub evaluation_id: EvaluationId,
    pub process_key: Option<String>,
    pub process_name: Option<String>,
    pub process_order_index: Option<i32>,
    pub client_id: Option<String>,
    pub lot_number: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLot {
    pub step_id: i64,
    pub lot_id: i64,
    pub quantity_override: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub id: i64,
    pub step_id: i64,
    pub sequence: i32,
    pub serial_number: Option<String>,
    pub fail_code_id: Option<FailCodeId>,
    pub fail_code_text: String,
    pub fail_code_name_snapshot: Option<String>,
    pub analysis_result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub id: i64,
    pub evaluation_id: EvaluationId,
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
    pub lots: Vec<StepLot>,
    pub failures: Vec<StepFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessGraph {
    pub lots: Vec<ProcessLot>,
    pub steps: Vec<ProcessStep>,
}

impl ProcessGraph {
    pub fn lot(&self, id: i64) -> Option<&ProcessLot> {
        self.lots.iter().find(|l| l.id == id)
    }

    pub fn lot_by_client_id(&self, process_key: &str, client_id: &str) -> Option<&ProcessLot> {
        self.lots
            .iter()
            .find(|l| l.process_key.as_deref() == Some(process_key) && l.client_id.as_deref() == Some(client_id))
    }
}

impl ProcessStep {
    /// `total = pass + fail + |failures|` cuando aplica la agregación.
    pub fn aggregation_holds(&self) -> bool {
        if !self.results_applicable || self.total_units_manual {
            return true;
        }
        let expected = self.pass_units.unwrap_or(0) + self.fail_units.unwrap_or(0) + self.failures.len() as i32;
        self.total_units == Some(expected)
    }
}

/// Payload crudo guardado tal cual llegó (`source` por defecto `rc0`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProcessPayload {
    pub evaluation_id: EvaluationId,
    pub payload: Value,
    pub source: String,
    pub payload_hash: String,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_RAW_SOURCE: &str = "rc0";
