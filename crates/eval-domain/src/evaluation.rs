//! Raíz del agregado: `Evaluation`, comando de alta y patch.
//!
//! Invariantes que viven aquí:
//! - `completion_date` presente ⇔ `status == completed`.
//! - `version` crece en exactamente 1 por cada escritura exitosa de la raíz.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::detail::{DetailInput, DetailVariant};
use crate::error::{clean_opt, DomainError, Violations};
use crate::result::{NewEvaluationResult, ResultDraft};
use crate::status::{EvaluationStatus, EvaluationType};
use crate::{EvaluationId, UserId};

/// Campos de proceso de texto libre.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFields {
    #[serde(default)]
    pub evaluation_reason: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub process_step: Option<String>,
    #[serde(default)]
    pub pgm_version: Option<String>,
    #[serde(default)]
    pub capacity: Option<String>,
    #[serde(default)]
    pub interface_type: Option<String>,
    #[serde(default)]
    pub form_factor: Option<String>,
    #[serde(default)]
    pub scs_charger_name: Option<String>,
    #[serde(default)]
    pub head_office_charger_name: Option<String>,
}

impl ProcessFields {
    fn cleaned(&self) -> Self {
        Self { evaluation_reason: clean_opt(self.evaluation_reason.clone()),
               remarks: clean_opt(self.remarks.clone()),
               process_step: clean_opt(self.process_step.clone()),
               pgm_version: clean_opt(self.pgm_version.clone()),
               capacity: clean_opt(self.capacity.clone()),
               interface_type: clean_opt(self.interface_type.clone()),
               form_factor: clean_opt(self.form_factor.clone()),
               scs_charger_name: clean_opt(self.scs_charger_name.clone()),
               head_office_charger_name: clean_opt(self.head_office_charger_name.clone()) }
    }

    fn check(&self, v: &mut Violations) {
        v.limit_text("process_step", self.process_step.as_deref(), 200);
        v.limit_text("pgm_version", self.pgm_version.as_deref(), 50);
        v.limit_text("capacity", self.capacity.as_deref(), 50);
        v.limit_text("interface_type", self.interface_type.as_deref(), 50);
        v.limit_text("form_factor", self.form_factor.as_deref(), 50);
        v.limit_text("scs_charger_name", self.scs_charger_name.as_deref(), 100);
        v.limit_text("head_office_charger_name", self.head_office_charger_name.as_deref(), 100);
    }

    /// Texto libre donde se buscan menciones `@usuario`.
    pub fn mention_sources(&self) -> Vec<&str> {
        [self.evaluation_reason.as_deref(), self.remarks.as_deref()].into_iter().flatten().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub evaluation_number: String,
    pub evaluation_type: EvaluationType,
    pub product_name: String,
    pub part_number: String,
    pub evaluator_id: UserId,
    pub part_approver_id: Option<UserId>,
    pub group_approver_id: Option<UserId>,
    pub status: EvaluationStatus,
    pub start_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub cancel_reason: Option<String>,
    #[serde(flatten)]
    pub fields: ProcessFields,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.evaluator_id == user_id
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Agrega una línea a `remarks` (separada por salto de línea).
    pub fn append_remark(&mut self, line: &str) {
        self.fields.remarks = Some(match self.fields.remarks.take() {
                                       Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
                                       _ => line.to_string(),
                                   });
    }

    /// Comprueba `completion_date` ⇔ `completed`.
    pub fn completion_consistent(&self) -> bool {
        (self.status == EvaluationStatus::Completed) == self.completion_date.is_some()
    }
}

/// Comando de alta. Los tags llegan como texto para reportar valores
/// inválidos con su campo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub evaluation_type: String,
    pub product_name: String,
    pub part_number: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub fields: ProcessFields,
    #[serde(default)]
    pub details: Vec<DetailInput>,
    #[serde(default)]
    pub results: Vec<NewEvaluationResult>,
}

/// Alta validada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidEvaluation {
    pub evaluation_type: EvaluationType,
    pub product_name: String,
    pub part_number: String,
    pub start_date: NaiveDate,
    pub status: EvaluationStatus,
    pub fields: ProcessFields,
    pub details: Vec<DetailVariant>,
    pub results: Vec<ResultDraft>,
}

impl NewEvaluation {
    pub fn validate(&self) -> Result<ValidEvaluation, DomainError> {
        let mut v = Violations::new();
        v.require_text("product_name", &self.product_name, 200);
        v.require_text("part_number", &self.part_number, 100);
        let evaluation_type = if self.evaluation_type.trim().is_empty() {
            v.push("evaluation_type", "is required");
            None
        } else {
            v.parse_tag::<EvaluationType>("evaluation_type", &self.evaluation_type)
        };
        if self.start_date.is_none() {
            v.push("start_date", "is required");
        }
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => Some(EvaluationStatus::Draft),
            Some(raw) => match raw.parse::<EvaluationStatus>() {
                Ok(s @ (EvaluationStatus::Draft | EvaluationStatus::InProgress)) => Some(s),
                Ok(_) => {
                    v.push("status", "initial status must be draft or in_progress");
                    None
                }
                Err(_) => {
                    v.push("status", format!("invalid value '{raw}'"));
                    None
                }
            },
        };
        let fields = self.fields.cleaned();
        fields.check(&mut v);

        let mut details = Vec::with_capacity(self.details.len());
        for (i, d) in self.details.iter().enumerate() {
            match d.validate(&format!("details[{i}]")) {
                Ok(variant) => details.push(variant),
                Err(errs) => v.extend(errs),
            }
        }
        let mut results = Vec::with_capacity(self.results.len());
        for (i, r) in self.results.iter().enumerate() {
            match r.validate(&format!("results[{i}]")) {
                Ok(draft) => results.push(draft),
                Err(errs) => v.extend(errs),
            }
        }

        match (evaluation_type, self.start_date, status) {
            (Some(evaluation_type), Some(start_date), Some(status)) if v.is_empty() => {
                Ok(ValidEvaluation { evaluation_type,
                                     product_name: self.product_name.trim().to_string(),
                                     part_number: self.part_number.trim().to_string(),
                                     start_date,
                                     status,
                                     fields,
                                     details,
                                     results })
            }
            _ => {
                v.finish()?;
                // inalcanzable: si no hay violaciones los tres campos existen
                Err(DomainError::Validation(vec![]))
            }
        }
    }
}

/// Patch parcial. Campos ausentes no se tocan; `status`, número y
/// aprobadores no forman parte del patch y se ignoran si llegan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationPatch {
    #[serde(default)]
    pub evaluation_type: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub evaluation_reason: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub process_step: Option<String>,
    #[serde(default)]
    pub pgm_version: Option<String>,
    #[serde(default)]
    pub capacity: Option<String>,
    #[serde(default)]
    pub interface_type: Option<String>,
    #[serde(default)]
    pub form_factor: Option<String>,
    #[serde(default)]
    pub scs_charger_name: Option<String>,
    #[serde(default)]
    pub head_office_charger_name: Option<String>,
    #[serde(default)]
    pub details: Option<Vec<DetailInput>>,
}

/// Resultado de aplicar un patch: campos cambiados y detalles a reemplazar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedPatch {
    pub changed: Vec<&'static str>,
    pub details: Option<Vec<DetailVariant>>,
}

impl EvaluationPatch {
    /// Aplica el patch sobre `target`. `evaluation_type` sólo se honra en
    /// borrador; fuera de él se ignora.
    pub fn apply(&self, target: &mut Evaluation) -> Result<AppliedPatch, DomainError> {
        let mut v = Violations::new();
        let mut applied = AppliedPatch::default();

        if let Some(raw) = &self.evaluation_type {
            if target.status == EvaluationStatus::Draft {
                if let Some(t) = v.parse_tag::<EvaluationType>("evaluation_type", raw) {
                    if t != target.evaluation_type {
                        target.evaluation_type = t;
                        applied.changed.push("evaluation_type");
                    }
                }
            }
        }
        if let Some(name) = &self.product_name {
            v.require_text("product_name", name, 200);
            if name.trim() != target.product_name {
                target.product_name = name.trim().to_string();
                applied.changed.push("product_name");
            }
        }
        if let Some(pn) = &self.part_number {
            v.require_text("part_number", pn, 100);
            if pn.trim() != target.part_number {
                target.part_number = pn.trim().to_string();
                applied.changed.push("part_number");
            }
        }
        if let Some(d) = self.start_date {
            if d != target.start_date {
                target.start_date = d;
                applied.changed.push("start_date");
            }
        }

        let text_updates: [(&'static str, &Option<String>, &mut Option<String>); 9] =
            [("evaluation_reason", &self.evaluation_reason, &mut target.fields.evaluation_reason),
             ("remarks", &self.remarks, &mut target.fields.remarks),
             ("process_step", &self.process_step, &mut target.fields.process_step),
             ("pgm_version", &self.pgm_version, &mut target.fields.pgm_version),
             ("capacity", &self.capacity, &mut target.fields.capacity),
             ("interface_type", &self.interface_type, &mut target.fields.interface_type),
             ("form_factor", &self.form_factor, &mut target.fields.form_factor),
             ("scs_charger_name", &self.scs_charger_name, &mut target.fields.scs_charger_name),
             ("head_office_charger_name", &self.head_office_charger_name, &mut target.fields.head_office_charger_name)];
        for (name, incoming, slot) in text_updates {
            if let Some(raw) = incoming {
                let cleaned = clean_opt(Some(raw.clone()));
                if *slot != cleaned {
                    *slot = cleaned;
                    applied.changed.push(name);
                }
            }
        }
        target.fields.check(&mut v);

        if let Some(inputs) = &self.details {
            let mut details = Vec::with_capacity(inputs.len());
            for (i, d) in inputs.iter().enumerate() {
                match d.validate(&format!("details[{i}]")) {
                    Ok(variant) => details.push(variant),
                    Err(errs) => v.extend(errs),
                }
            }
            applied.details = Some(details);
            applied.changed.push("details");
        }

        v.finish()?;
        Ok(applied)
    }
}
