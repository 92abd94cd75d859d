//! Normalización y validación del payload de procesos.
//!
//! El resultado es un `ProcessGraphPlan` sin `fail_code_id`: la resolución
//! contra el diccionario la hace el servicio antes de escribir.
//!
//! Defaults aplicados:
//! - proceso sin `key`/`name`/`order_index` → `proc_<n>`, `Process <n>`, `n`;
//! - lote sin `client_id` → `<key>-lot-<n>`;
//! - step sin referencias a lotes → vinculado a todos los lotes del proceso;
//! - `results_applicable` falso para M010/M033/M100, verdadero en el resto;
//! - en steps no aplicables se descartan fallas y conteos;
//! - `total_units = pass + fail + |failures|` salvo `total_units_manual`.

use std::collections::{HashMap, HashSet};

use eval_domain::fail_code::FAIL_TEXT_MAX_LEN;
use eval_domain::{FailurePlan, LotLinkPlan, LotPlan, ProcessGraphPlan, ProcessInput, ProcessPayload, StepInput,
                  StepPlan, Violations};

use crate::errors::WorkflowError;

const RESULT_OPTIONAL_CODES: [&str; 3] = ["M010", "M033", "M100"];

/// `BASIC` → `Basic`; el resto en mayúsculas.
pub fn canonical_step_code(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    if upper == "BASIC" {
        "Basic".to_string()
    } else {
        upper
    }
}

pub fn results_applicable_default(step_code: &str) -> bool {
    !RESULT_OPTIONAL_CODES.contains(&step_code.to_uppercase().as_str())
}

fn clean(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Normaliza y valida; todos los errores de campo se reportan juntos.
pub fn normalize(payload: &ProcessPayload) -> Result<ProcessGraphPlan, WorkflowError> {
    let mut v = Violations::new();
    let mut plan = ProcessGraphPlan::default();
    let mut keys = HashSet::new();
    let mut orders = HashSet::new();

    for (pi, process) in payload.processes.iter().enumerate() {
        let path = format!("processes[{pi}]");
        let key = clean(&process.key).unwrap_or_else(|| format!("proc_{}", pi + 1));
        let order = process.order_index.unwrap_or(pi as i32 + 1);
        if !keys.insert(key.clone()) {
            v.push(format!("{path}.key"), format!("duplicate process key '{key}'"));
        }
        if !orders.insert(order) {
            v.push(format!("{path}.order_index"), format!("duplicate order_index {order}"));
        }
        normalize_process(process, &path, &key, order, pi, &mut plan, &mut v);
    }

    if v.is_empty() {
        Ok(plan)
    } else {
        Err(WorkflowError::Validation { fields: v.into_fields() })
    }
}

fn normalize_process(process: &ProcessInput, path: &str, key: &str, order: i32, pi: usize,
                     plan: &mut ProcessGraphPlan, v: &mut Violations) {
    let name = clean(&process.name).unwrap_or_else(|| format!("Process {}", pi + 1));

    let mut quantities: HashMap<String, i32> = HashMap::new();
    let mut lot_order: Vec<String> = Vec::new();
    for (li, lot) in process.lots.iter().enumerate() {
        let lpath = format!("{path}.lots[{li}]");
        let client_id = clean(&lot.client_id).unwrap_or_else(|| format!("{key}-lot-{}", li + 1));
        if lot.quantity < 0 {
            v.push(format!("{lpath}.quantity"), "must be >= 0");
        }
        if quantities.insert(client_id.clone(), lot.quantity).is_some() {
            v.push(format!("{lpath}.client_id"), format!("duplicate client_id '{client_id}'"));
            continue;
        }
        lot_order.push(client_id.clone());
        plan.lots.push(LotPlan { process_key: key.to_string(),
                                 process_name: name.clone(),
                                 process_order_index: order,
                                 client_id,
                                 lot_number: lot.lot_number.trim().to_string(),
                                 quantity: lot.quantity });
    }

    let mut step_codes = HashSet::new();
    let mut linked: HashSet<String> = HashSet::new();
    let mut step_total = 0i64;
    for (si, step) in process.steps.iter().enumerate() {
        let spath = format!("{path}.steps[{si}]");
        let Some(planned) = normalize_step(step, &spath, key, &name, order, si, &quantities, &lot_order, v) else {
            continue;
        };
        if !step_codes.insert(planned.step_code.clone()) {
            v.push(format!("{spath}.step_code"), format!("duplicate step_code '{}'", planned.step_code));
        }
        linked.extend(planned.lot_links.iter().map(|l| l.client_id.clone()));
        step_total += i64::from(planned.total_units.unwrap_or(0));
        plan.steps.push(planned);
    }

    let capacity: i64 = linked.iter().filter_map(|c| quantities.get(c)).map(|q| i64::from(*q)).sum();
    if step_total > capacity {
        v.push(format!("{path}.steps"),
               format!("total units {step_total} exceed the quantity of linked lots {capacity}"));
    }
}

#[allow(clippy::too_many_arguments)]
fn normalize_step(step: &StepInput, spath: &str, key: &str, name: &str, order: i32, si: usize,
                  quantities: &HashMap<String, i32>, lot_order: &[String], v: &mut Violations)
                  -> Option<StepPlan> {
    let step_code = canonical_step_code(&step.step_code);
    if step_code.is_empty() {
        v.push(format!("{spath}.step_code"), "is required");
        return None;
    }
    let applicable = step.results_applicable.unwrap_or_else(|| results_applicable_default(&step_code));

    let mut lot_links = Vec::new();
    let mut seen = HashSet::new();
    for (ri, r) in step.lot_refs.iter().enumerate() {
        let client_id = r.client_id.trim().to_string();
        let Some(quantity) = quantities.get(&client_id) else {
            v.push(format!("{spath}.lot_refs[{ri}]"), format!("unknown lot '{client_id}'"));
            continue;
        };
        if let Some(q) = r.quantity_override {
            if q < 0 || q > *quantity {
                v.push(format!("{spath}.lot_refs[{ri}].quantity_override"),
                       format!("must be between 0 and {quantity}"));
            }
        }
        if seen.insert(client_id.clone()) {
            lot_links.push(LotLinkPlan { client_id, quantity_override: r.quantity_override });
        }
    }
    if step.lot_refs.is_empty() {
        lot_links = lot_order.iter()
                             .map(|c| LotLinkPlan { client_id: c.clone(), quantity_override: None })
                             .collect();
    }

    let mut failures = Vec::new();
    if applicable {
        for (fi, f) in step.failures.iter().enumerate() {
            let fpath = format!("{spath}.failures[{fi}]");
            let text = f.fail_code_text.trim().to_uppercase();
            if text.is_empty() {
                v.push(format!("{fpath}.fail_code_text"), "is required");
                continue;
            }
            if text.chars().count() > FAIL_TEXT_MAX_LEN {
                v.push(format!("{fpath}.fail_code_text"), format!("must be at most {FAIL_TEXT_MAX_LEN} characters"));
                continue;
            }
            failures.push(FailurePlan { sequence: f.sequence.unwrap_or(fi as i32 + 1),
                                        serial_number: clean(&f.serial_number),
                                        fail_code_id: None,
                                        fail_code_text: text,
                                        fail_code_name_snapshot: clean(&f.fail_code_name_snapshot),
                                        analysis_result: clean(&f.analysis_result) });
        }
    }

    let manual = applicable && step.total_units_manual.unwrap_or(false);
    let (pass, fail, total) = if applicable {
        let pass = step.pass_units.unwrap_or(0);
        let fail = step.fail_units.unwrap_or(0);
        for (field, n) in [("pass_units", pass), ("fail_units", fail), ("total_units", step.total_units.unwrap_or(0))] {
            if n < 0 {
                v.push(format!("{spath}.{field}"), "must be >= 0");
            }
        }
        let total = if manual {
            step.total_units
        } else {
            let sum = i64::from(pass) + i64::from(fail) + failures.len() as i64;
            match i32::try_from(sum) {
                Ok(n) => Some(n),
                Err(_) => {
                    v.push(format!("{spath}.total_units"), format!("must be at most {}", i32::MAX));
                    None
                }
            }
        };
        (Some(pass), Some(fail), total)
    } else {
        (None, None, None)
    };

    Some(StepPlan { process_key: key.to_string(),
                    process_name: name.to_string(),
                    process_order_index: order,
                    order_index: step.order_index.unwrap_or(si as i32 + 1),
                    step_code,
                    step_label: clean(&step.step_label),
                    eval_code: clean(&step.eval_code),
                    results_applicable: applicable,
                    total_units_manual: manual,
                    total_units: total,
                    pass_units: pass,
                    fail_units: fail,
                    notes: clean(&step.notes),
                    lot_links,
                    failures })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_domain::{FailureInput, LotInput, LotRefInput};
    use serde_json::json;

    fn payload(value: serde_json::Value) -> ProcessPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn aggregates_and_defaults() {
        let p = payload(json!({"processes": [{
            "key": "p1",
            "lots": [{"client_id": "L1", "lot_number": "LOT-A", "quantity": 100},
                     {"lot_number": "LOT-B", "quantity": 50}],
            "steps": [
                {"step_code": " basic ", "pass_units": 80, "fail_units": 15,
                 "failures": [{"fail_code_text": " 201 "}, {"fail_code_text": "short"}]},
                {"step_code": "m010", "failures": [{"fail_code_text": "X"}]}
            ]
        }]}));
        let plan = normalize(&p).unwrap();
        assert_eq!(plan.lots[1].client_id, "p1-lot-2");
        let s = &plan.steps[0];
        assert_eq!(s.step_code, "Basic");
        assert_eq!(s.total_units, Some(97));
        assert_eq!(s.lot_links.len(), 2);
        assert_eq!(s.failures[1].fail_code_text, "SHORT");
        assert_eq!(s.failures[1].sequence, 2);
        let m = &plan.steps[1];
        assert!(!m.results_applicable);
        assert!(m.failures.is_empty());
        assert_eq!(m.total_units, None);
    }

    #[test]
    fn manual_total_is_kept() {
        let p = ProcessPayload { processes: vec![ProcessInput { lots: vec![LotInput { client_id: None,
                                                                                  lot_number: "A".into(),
                                                                                  quantity: 10 }],
                                                                steps: vec![StepInput { step_code: "M031".into(),
                                                                                        total_units_manual: Some(true),
                                                                                        total_units: Some(7),
                                                                                        pass_units: Some(1),
                                                                                        ..Default::default() }],
                                                                ..Default::default() }] };
        let plan = normalize(&p).unwrap();
        assert_eq!(plan.steps[0].total_units, Some(7));
        assert!(plan.steps[0].total_units_manual);
    }

    #[test]
    fn structural_errors_are_collected() {
        let p = ProcessPayload { processes: vec![ProcessInput { key: Some("k".into()),
                                                                lots: vec![LotInput { client_id: Some("a".into()),
                                                                                      lot_number: "A".into(),
                                                                                      quantity: 5 }],
                                                                steps: vec![StepInput { step_code: "M031".into(),
                                                                                        lot_refs: vec![LotRefInput { client_id: "a".into(), quantity_override: Some(9) },
                                                                                                       LotRefInput { client_id: "zz".into(), quantity_override: None }],
                                                                                        pass_units: Some(10),
                                                                                        failures: vec![FailureInput { fail_code_text: "   ".into(), ..Default::default() }],
                                                                                        ..Default::default() }],
                                                                ..Default::default() }] };
        let Err(WorkflowError::Validation { fields }) = normalize(&p) else {
            panic!("expected validation error");
        };
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert!(names.contains(&"processes[0].steps[0].lot_refs[0].quantity_override"));
        assert!(names.contains(&"processes[0].steps[0].lot_refs[1]"));
        assert!(names.contains(&"processes[0].steps[0].failures[0].fail_code_text"));
        assert!(names.contains(&"processes[0].steps"));
    }

    #[test]
    fn unit_sum_beyond_i32_is_rejected() {
        let p = payload(json!({"processes": [{
            "lots": [{"lot_number": "A", "quantity": 10}],
            "steps": [{"step_code": "M031", "pass_units": i32::MAX, "fail_units": 1}]
        }]}));
        let Err(WorkflowError::Validation { fields }) = normalize(&p) else {
            panic!("expected validation error");
        };
        assert!(fields.iter().any(|f| f.field == "processes[0].steps[0].total_units"));
    }
}
