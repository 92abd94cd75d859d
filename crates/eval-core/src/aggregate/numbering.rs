//! Generador de `evaluation_number` = `PREFIX-YYYYMMDD-NNNN`.
//!
//! El sufijo parte del mayor número existente del día + 1. Una colisión en
//! el índice único avanza el sufijo y reintenta, hasta `MAX_NUMBER_ATTEMPTS`
//! veces; después se devuelve `Exhausted`.

use chrono::NaiveDate;
use eval_domain::Evaluation;
use log::{debug, warn};

use crate::constants::{DEFAULT_EVAL_PREFIX, MAX_NUMBER_ATTEMPTS};
use crate::errors::WorkflowError;
use crate::store::{EvaluationRecord, EvaluationStore, StoreError};

const MAX_SUFFIX: u32 = 9999;

#[derive(Debug, Clone)]
pub struct EvaluationNumberGenerator {
    prefix: String,
}

impl Default for EvaluationNumberGenerator {
    fn default() -> Self {
        Self { prefix: DEFAULT_EVAL_PREFIX.to_string() }
    }
}

impl EvaluationNumberGenerator {
    /// `prefix` debe ser `[A-Z]+`.
    pub fn new(prefix: &str) -> Result<Self, WorkflowError> {
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(WorkflowError::validation("prefix", "must match [A-Z]+"));
        }
        Ok(Self { prefix: prefix.to_string() })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn day_prefix(&self, day: NaiveDate) -> String {
        format!("{}-{}-", self.prefix, day.format("%Y%m%d"))
    }

    pub fn format(&self, day: NaiveDate, suffix: u32) -> String {
        format!("{}{:04}", self.day_prefix(day), suffix)
    }

    /// Sufijo siguiente al mayor existente del día.
    pub fn next_suffix(&self, store: &dyn EvaluationStore, day: NaiveDate) -> Result<u32, WorkflowError> {
        let prefix = self.day_prefix(day);
        let latest = store.latest_number(&prefix)?;
        Ok(latest.and_then(|n| n.strip_prefix(&prefix).and_then(|s| s.parse::<u32>().ok())).unwrap_or(0) + 1)
    }

    /// Inserta `record` asignándole número; `record.evaluation_number` se
    /// sobreescribe en cada intento.
    pub fn insert_numbered(&self, store: &dyn EvaluationStore, day: NaiveDate, mut record: EvaluationRecord)
                           -> Result<Evaluation, WorkflowError> {
        let mut suffix = self.next_suffix(store, day)?;
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            if suffix > MAX_SUFFIX {
                break;
            }
            record.evaluation_number = self.format(day, suffix);
            match store.insert_evaluation(&record) {
                Ok(ev) => return Ok(ev),
                Err(StoreError::UniqueViolation(_)) => {
                    debug!("evaluation_number_collision number={} attempt={}", record.evaluation_number, attempt);
                    suffix = (suffix + 1).max(self.next_suffix(store, day)?);
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!("evaluation_number_exhausted day={}", day);
        Err(WorkflowError::Exhausted(format!("evaluation number for {day}")))
    }
}
