//! Lectura y reescritura del grafo de proceso (lotes, steps, vínculos,
//! fallas y payload crudo).
//!
//! `write_graph` corre dentro de la transacción que ya tomó el lock de la
//! raíz; no toca `evaluations` ni agrega eventos.

use std::collections::HashMap;

use diesel::prelude::*;
use eval_core::store::{reuse_ids, ProcessGraphWrite};
use eval_domain::{EvaluationId, ProcessGraph, ProcessLot, StepFailure, StepLot};
use log::debug;

use crate::error::PersistenceError;
use crate::models::{FailureRow, LotRow, LotValues, NewFailureRow, NewRawRow, StepLotRow, StepRow, StepValues};
use crate::schema::{evaluation_lots, evaluation_process_raw, evaluation_process_step_failures,
                    evaluation_process_step_lots, evaluation_process_steps};

pub(crate) fn load_graph(conn: &mut PgConnection, evaluation_id: EvaluationId)
                         -> Result<ProcessGraph, PersistenceError> {
    let lots: Vec<ProcessLot> = evaluation_lots::table.filter(evaluation_lots::evaluation_id.eq(evaluation_id))
                                                      .order((evaluation_lots::process_order_index.asc(),
                                                              evaluation_lots::id.asc()))
                                                      .select(LotRow::as_select())
                                                      .load::<LotRow>(conn)?
                                                      .into_iter()
                                                      .map(ProcessLot::from)
                                                      .collect();
    let step_rows: Vec<StepRow> =
        evaluation_process_steps::table.filter(evaluation_process_steps::evaluation_id.eq(evaluation_id))
                                       .order((evaluation_process_steps::process_order_index.asc(),
                                               evaluation_process_steps::order_index.asc(),
                                               evaluation_process_steps::id.asc()))
                                       .select(StepRow::as_select())
                                       .load(conn)?;
    let step_ids: Vec<i64> = step_rows.iter().map(|s| s.id).collect();

    let mut links: HashMap<i64, Vec<StepLot>> = HashMap::new();
    let mut failures: HashMap<i64, Vec<StepFailure>> = HashMap::new();
    if !step_ids.is_empty() {
        let link_rows: Vec<StepLotRow> =
            evaluation_process_step_lots::table.filter(evaluation_process_step_lots::step_id.eq_any(&step_ids))
                                               .order((evaluation_process_step_lots::step_id.asc(),
                                                       evaluation_process_step_lots::lot_id.asc()))
                                               .select(StepLotRow::as_select())
                                               .load(conn)?;
        for row in link_rows {
            links.entry(row.step_id).or_default().push(row.into());
        }
        let failure_rows: Vec<FailureRow> =
            evaluation_process_step_failures::table
                .filter(evaluation_process_step_failures::step_id.eq_any(&step_ids))
                .order((evaluation_process_step_failures::step_id.asc(),
                        evaluation_process_step_failures::sequence.asc(),
                        evaluation_process_step_failures::id.asc()))
                .select(FailureRow::as_select())
                .load(conn)?;
        for row in failure_rows {
            failures.entry(row.step_id).or_default().push(row.into());
        }
    }

    let steps = step_rows.into_iter()
                         .map(|row| {
                             let id = row.id;
                             row.into_domain(links.remove(&id).unwrap_or_default(),
                                             failures.remove(&id).unwrap_or_default())
                         })
                         .collect();
    Ok(ProcessGraph { lots, steps })
}

/// Upsert del grafo según `write.plan`:
/// - lotes por `(process_key, client_id)`, steps por
///   `(process_order_index, step_code)`; los ids existentes se conservan;
/// - filas sin contraparte en el plan se borran (vínculos y fallas caen por
///   cascade);
/// - vínculos step↔lote y fallas de los steps conservados se reemplazan;
/// - se agrega el payload crudo.
pub(crate) fn write_graph(conn: &mut PgConnection, write: &ProcessGraphWrite) -> Result<(), PersistenceError> {
    let eid = write.evaluation_id;
    let now = write.now;
    let plan = &write.plan;

    let old_lots: Vec<LotRow> = evaluation_lots::table.filter(evaluation_lots::evaluation_id.eq(eid))
                                                      .order(evaluation_lots::id.asc())
                                                      .select(LotRow::as_select())
                                                      .load(conn)?;
    let existing: Vec<((String, String), i64)> =
        old_lots.iter()
                .map(|l| ((l.process_key.clone().unwrap_or_default(), l.client_id.clone().unwrap_or_default()), l.id))
                .collect();
    let wanted: Vec<(String, String)> = plan.lots.iter().map(|l| (l.process_key.clone(), l.client_id.clone())).collect();
    let (lot_ids, stale_lots) = reuse_ids(&existing, &wanted);

    let old_steps: Vec<StepRow> =
        evaluation_process_steps::table.filter(evaluation_process_steps::evaluation_id.eq(eid))
                                       .order(evaluation_process_steps::id.asc())
                                       .select(StepRow::as_select())
                                       .load(conn)?;
    let existing: Vec<((i32, String), i64)> =
        old_steps.iter().map(|s| ((s.process_order_index.unwrap_or(0), s.step_code.clone()), s.id)).collect();
    let wanted: Vec<(i32, String)> =
        plan.steps.iter().map(|s| (s.process_order_index, s.step_code.clone())).collect();
    let (step_ids, stale_steps) = reuse_ids(&existing, &wanted);

    if !stale_steps.is_empty() {
        diesel::delete(evaluation_process_steps::table.filter(evaluation_process_steps::id.eq_any(&stale_steps)))
            .execute(conn)?;
    }
    if !stale_lots.is_empty() {
        diesel::delete(evaluation_lots::table.filter(evaluation_lots::id.eq_any(&stale_lots))).execute(conn)?;
    }

    let mut lot_index: HashMap<(&str, &str), i64> = HashMap::with_capacity(plan.lots.len());
    for (lot, reused) in plan.lots.iter().zip(lot_ids) {
        let created_at = reused.and_then(|id| old_lots.iter().find(|l| l.id == id))
                               .map_or(now, |l| l.created_at);
        let values = LotValues { evaluation_id: eid,
                                 process_key: &lot.process_key,
                                 process_name: &lot.process_name,
                                 process_order_index: lot.process_order_index,
                                 client_id: &lot.client_id,
                                 lot_number: &lot.lot_number,
                                 quantity: lot.quantity,
                                 created_at,
                                 updated_at: now };
        let id = match reused {
            Some(id) => {
                diesel::update(evaluation_lots::table.find(id)).set(&values).execute(conn)?;
                id
            }
            None => diesel::insert_into(evaluation_lots::table).values(&values)
                                                               .returning(evaluation_lots::id)
                                                               .get_result(conn)?,
        };
        lot_index.insert((lot.process_key.as_str(), lot.client_id.as_str()), id);
    }

    let mut kept_steps = Vec::new();
    for (step, reused) in plan.steps.iter().zip(step_ids) {
        let created_at = reused.and_then(|id| old_steps.iter().find(|s| s.id == id))
                               .map_or(now, |s| s.created_at);
        let values = StepValues { evaluation_id: eid,
                                  process_key: &step.process_key,
                                  process_name: &step.process_name,
                                  process_order_index: step.process_order_index,
                                  order_index: step.order_index,
                                  step_code: &step.step_code,
                                  step_label: step.step_label.as_deref(),
                                  eval_code: step.eval_code.as_deref(),
                                  results_applicable: step.results_applicable,
                                  total_units_manual: step.total_units_manual,
                                  total_units: step.total_units,
                                  pass_units: step.pass_units,
                                  fail_units: step.fail_units,
                                  notes: step.notes.as_deref(),
                                  created_at,
                                  updated_at: now };
        let id: i64 = match reused {
            Some(id) => {
                diesel::update(evaluation_process_steps::table.find(id)).set(&values).execute(conn)?;
                kept_steps.push(id);
                id
            }
            None => diesel::insert_into(evaluation_process_steps::table).values(&values)
                                                                        .returning(evaluation_process_steps::id)
                                                                        .get_result(conn)?,
        };

        let mut link_rows = Vec::with_capacity(step.lot_links.len());
        for link in &step.lot_links {
            let lot_id = lot_index.get(&(step.process_key.as_str(), link.client_id.as_str()))
                                  .copied()
                                  .ok_or(PersistenceError::NotFound)?;
            link_rows.push(StepLotRow { step_id: id, lot_id, quantity_override: link.quantity_override });
        }
        let failure_rows: Vec<NewFailureRow> =
            step.failures
                .iter()
                .map(|f| NewFailureRow { step_id: id,
                                         sequence: f.sequence,
                                         serial_number: f.serial_number.as_deref(),
                                         fail_code_id: f.fail_code_id,
                                         fail_code_text: &f.fail_code_text,
                                         fail_code_name_snapshot: f.fail_code_name_snapshot.as_deref(),
                                         analysis_result: f.analysis_result.as_deref() })
                .collect();

        if reused.is_some() {
            diesel::delete(evaluation_process_step_lots::table.filter(evaluation_process_step_lots::step_id.eq(id)))
                .execute(conn)?;
            diesel::delete(evaluation_process_step_failures::table
                               .filter(evaluation_process_step_failures::step_id.eq(id))).execute(conn)?;
        }
        if !link_rows.is_empty() {
            diesel::insert_into(evaluation_process_step_lots::table).values(&link_rows).execute(conn)?;
        }
        if !failure_rows.is_empty() {
            diesel::insert_into(evaluation_process_step_failures::table).values(&failure_rows).execute(conn)?;
        }
    }

    diesel::insert_into(evaluation_process_raw::table).values(NewRawRow { evaluation_id: eid,
                                                                          payload: &write.raw_payload,
                                                                          source: &write.raw_source,
                                                                          payload_hash: &write.payload_hash,
                                                                          created_at: now })
                                                      .execute(conn)?;
    debug!("write_graph evaluation_id={} lots={} steps={} reused_steps={} stale_lots={} stale_steps={}",
           eid,
           plan.lots.len(),
           plan.steps.len(),
           kept_steps.len(),
           stale_lots.len(),
           stale_steps.len());
    Ok(())
}
