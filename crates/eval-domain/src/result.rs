use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{clean_opt, FieldError, Violations};
use crate::EvaluationId;

string_tag! {
    pub enum ResultType : "result_type" {
        Doe => "doe",
        Ppq => "ppq",
        Prq => "prq",
        ProductionTest => "production_test",
        Aql => "aql",
    }
}

string_tag! {
    pub enum ResultStatus : "result_status" {
        Pass => "pass",
        Fail => "fail",
        Pending => "pending",
    }
}

/// Resultado de prueba adjunto a una Evaluation. `result_data` es opaco.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub id: i64,
    pub evaluation_id: EvaluationId,
    pub result_type: ResultType,
    pub result_status: ResultStatus,
    pub result_data: Value,
    pub test_date: Option<NaiveDate>,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvaluationResult {
    pub result_type: String,
    #[serde(default)]
    pub result_status: Option<String>,
    #[serde(default)]
    pub result_data: Value,
    #[serde(default)]
    pub test_date: Option<NaiveDate>,
    #[serde(default)]
    pub comments: Option<String>,
}

/// Resultado validado, listo para persistir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDraft {
    pub result_type: ResultType,
    pub result_status: ResultStatus,
    pub result_data: Value,
    pub test_date: Option<NaiveDate>,
    pub comments: Option<String>,
}

impl NewEvaluationResult {
    pub fn validate(&self, path: &str) -> Result<ResultDraft, Vec<FieldError>> {
        let mut v = Violations::new();
        let result_type = v.parse_tag::<ResultType>(&format!("{path}.result_type"), &self.result_type);
        let result_status = match &self.result_status {
            Some(raw) => v.parse_tag::<ResultStatus>(&format!("{path}.result_status"), raw),
            None => Some(ResultStatus::Pending),
        };
        match (result_type, result_status) {
            (Some(result_type), Some(result_status)) if v.is_empty() => {
                Ok(ResultDraft { result_type,
                                 result_status,
                                 result_data: if self.result_data.is_null() { Value::Object(Default::default()) } else { self.result_data.clone() },
                                 test_date: self.test_date,
                                 comments: clean_opt(self.comments.clone()) })
            }
            _ => Err(v.into_fields()),
        }
    }
}
