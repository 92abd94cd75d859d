//! `EvaluationStore` y `EventStore` sobre Postgres.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use eval_core::constants::EVENT_SCHEMA_VERSION;
use eval_core::store::{EvaluationFilter, EvaluationRecord, EvaluationStore, EvaluationWrite, ProcessGraphWrite,
                       StoreResult};
use eval_core::{EvaluationEvent, EvaluationEventKind, EventStore};
use eval_domain::{DetailVariant, Evaluation, EvaluationDetail, EvaluationId, EvaluationResult, ProcessGraph,
                  RawProcessPayload, ResultDraft, UserId};
use log::debug;

use super::processes::{load_graph, write_graph};
use super::{ConnectionProvider, PgStore};
use crate::error::PersistenceError;
use crate::models::{DetailRow, EvaluationChanges, EvaluationRow, EventRow, NewDetailRow, NewEvaluationRow,
                    NewEventRow, NewResultRow, RawRow, ResultRow};
use crate::schema::{evaluation_details, evaluation_events, evaluation_process_raw, evaluation_results, evaluations};

/// Inserta un evento del agregado; `payload` lleva el enum completo.
pub(crate) fn append_event(conn: &mut PgConnection, evaluation_id: EvaluationId, actor_id: Option<UserId>,
                           kind: &EvaluationEventKind, ts: DateTime<Utc>)
                           -> Result<EvaluationEvent, PersistenceError> {
    let payload = serde_json::to_value(kind).map_err(|e| PersistenceError::Unknown(format!("ser event: {e}")))?;
    let new_row = NewEventRow { evaluation_id,
                                actor_id,
                                event_type: kind.name(),
                                schema_version: EVENT_SCHEMA_VERSION as i32,
                                payload: &payload,
                                ts };
    let row: EventRow = diesel::insert_into(evaluation_events::table).values(&new_row)
                                                                     .returning(EventRow::as_returning())
                                                                     .get_result(conn)?;
    debug!("append_event evaluation_id={} seq={} type={}", evaluation_id, row.seq, row.event_type);
    row.into_domain()
}

/// Bloquea la fila raíz y verifica la versión esperada. Devuelve la versión
/// actual.
pub(crate) fn lock_root(conn: &mut PgConnection, id: EvaluationId, expected_version: i32)
                        -> Result<i32, PersistenceError> {
    let current: i32 = evaluations::table.find(id)
                                         .select(evaluations::version)
                                         .for_update()
                                         .first(conn)
                                         .optional()?
                                         .ok_or(PersistenceError::NotFound)?;
    if current != expected_version {
        debug!("version_conflict evaluation_id={} expected={} current={}", id, expected_version, current);
        return Err(PersistenceError::VersionConflict);
    }
    Ok(current)
}

fn insert_details(conn: &mut PgConnection, evaluation_id: EvaluationId, details: &[DetailVariant],
                  now: DateTime<Utc>)
                  -> Result<(), PersistenceError> {
    if details.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewDetailRow> = details.iter().map(|d| NewDetailRow::new(evaluation_id, d, now)).collect();
    diesel::insert_into(evaluation_details::table).values(&rows).execute(conn)?;
    Ok(())
}

fn insert_result(conn: &mut PgConnection, evaluation_id: EvaluationId, draft: &ResultDraft, now: DateTime<Utc>)
                 -> Result<EvaluationResult, PersistenceError> {
    diesel::insert_into(evaluation_results::table).values(NewResultRow::new(evaluation_id, draft, now))
                                                  .returning(ResultRow::as_returning())
                                                  .get_result::<ResultRow>(conn)?
                                                  .into_domain()
}

fn exists(conn: &mut PgConnection, id: EvaluationId) -> Result<bool, PersistenceError> {
    Ok(diesel::select(diesel::dsl::exists(evaluations::table.find(id))).get_result(conn)?)
}

impl<P: ConnectionProvider> EvaluationStore for PgStore<P> {
    fn insert_evaluation(&self, record: &EvaluationRecord) -> StoreResult<Evaluation> {
        let f = &record.fields;
        let created = self.write(|tx| {
            let row = NewEvaluationRow { evaluation_number: &record.evaluation_number,
                                         evaluation_type: record.evaluation_type.as_str(),
                                         product_name: &record.product_name,
                                         part_number: &record.part_number,
                                         evaluator_id: record.evaluator_id,
                                         status: record.status.as_str(),
                                         start_date: record.start_date,
                                         evaluation_reason: f.evaluation_reason.as_deref(),
                                         remarks: f.remarks.as_deref(),
                                         process_step: f.process_step.as_deref(),
                                         pgm_version: f.pgm_version.as_deref(),
                                         capacity: f.capacity.as_deref(),
                                         interface_type: f.interface_type.as_deref(),
                                         form_factor: f.form_factor.as_deref(),
                                         scs_charger_name: f.scs_charger_name.as_deref(),
                                         head_office_charger_name: f.head_office_charger_name.as_deref(),
                                         version: 1,
                                         created_at: record.created_at,
                                         updated_at: record.created_at };
            let evaluation = diesel::insert_into(evaluations::table).values(&row)
                                                                    .returning(EvaluationRow::as_returning())
                                                                    .get_result::<EvaluationRow>(tx)?
                                                                    .into_domain()?;
            insert_details(tx, evaluation.id, &record.details, record.created_at)?;
            for draft in &record.results {
                insert_result(tx, evaluation.id, draft, record.created_at)?;
            }
            append_event(tx,
                         evaluation.id,
                         Some(record.evaluator_id),
                         &EvaluationEventKind::Created { evaluation_number: evaluation.evaluation_number.clone(),
                                                         status: evaluation.status },
                         record.created_at)?;
            Ok(evaluation)
        })?;
        Ok(created)
    }

    fn latest_number(&self, prefix: &str) -> StoreResult<Option<String>> {
        let pattern = format!("{}%", prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        Ok(self.read(|conn| {
                   Ok(evaluations::table.filter(evaluations::evaluation_number.like(pattern.as_str()))
                                        .select(evaluations::evaluation_number)
                                        .order(evaluations::evaluation_number.desc())
                                        .first::<String>(conn)
                                        .optional()?)
               })?)
    }

    fn find_evaluation(&self, id: EvaluationId) -> StoreResult<Option<Evaluation>> {
        Ok(self.read(|conn| {
                   evaluations::table.find(id)
                                     .select(EvaluationRow::as_select())
                                     .first(conn)
                                     .optional()?
                                     .map(EvaluationRow::into_domain)
                                     .transpose()
               })?)
    }

    fn list_evaluations(&self, filter: &EvaluationFilter) -> StoreResult<Vec<Evaluation>> {
        let statuses: Vec<&'static str> = filter.statuses.iter().map(|s| s.as_str()).collect();
        Ok(self.read(|conn| {
                   let mut query = evaluations::table.select(EvaluationRow::as_select()).into_boxed();
                   if !statuses.is_empty() {
                       query = query.filter(evaluations::status.eq_any(statuses.clone()));
                   }
                   if let Some(t) = filter.evaluation_type {
                       query = query.filter(evaluations::evaluation_type.eq(t.as_str()));
                   }
                   if let Some(uid) = filter.evaluator_id {
                       query = query.filter(evaluations::evaluator_id.eq(uid));
                   }
                   query.order(evaluations::id.asc())
                        .load::<EvaluationRow>(conn)?
                        .into_iter()
                        .map(EvaluationRow::into_domain)
                        .collect()
               })?)
    }

    fn save_evaluation(&self, write: &EvaluationWrite) -> StoreResult<Evaluation> {
        let id = write.evaluation.id;
        Ok(self.write(|tx| {
                   let current = lock_root(tx, id, write.expected_version)?;
                   let saved = diesel::update(evaluations::table.find(id))
                       .set(EvaluationChanges::new(&write.evaluation, current + 1))
                       .returning(EvaluationRow::as_returning())
                       .get_result::<EvaluationRow>(tx)?
                       .into_domain()?;
                   if let Some(details) = &write.details {
                       diesel::delete(evaluation_details::table.filter(evaluation_details::evaluation_id.eq(id)))
                           .execute(tx)?;
                       insert_details(tx, id, details, saved.updated_at)?;
                   }
                   append_event(tx, id, write.actor_id, &write.event, saved.updated_at)?;
                   Ok(saved)
               })?)
    }

    fn delete_evaluation(&self, id: EvaluationId) -> StoreResult<()> {
        // Hijos por ON DELETE CASCADE; mensajes quedan con evaluation_id NULL.
        Ok(self.write(|tx| {
                   let removed = diesel::delete(evaluations::table.find(id)).execute(tx)?;
                   if removed == 0 {
                       return Err(PersistenceError::NotFound);
                   }
                   Ok(())
               })?)
    }

    fn list_details(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationDetail>> {
        Ok(self.read(|conn| {
                   evaluation_details::table.filter(evaluation_details::evaluation_id.eq(id))
                                            .order(evaluation_details::id.asc())
                                            .select(DetailRow::as_select())
                                            .load::<DetailRow>(conn)?
                                            .into_iter()
                                            .map(DetailRow::into_domain)
                                            .collect()
               })?)
    }

    fn add_result(&self, id: EvaluationId, draft: &ResultDraft, now: DateTime<Utc>) -> StoreResult<EvaluationResult> {
        Ok(self.write(|tx| {
                   if !exists(tx, id)? {
                       return Err(PersistenceError::NotFound);
                   }
                   insert_result(tx, id, draft, now)
               })?)
    }

    fn list_results(&self, id: EvaluationId) -> StoreResult<Vec<EvaluationResult>> {
        Ok(self.read(|conn| {
                   evaluation_results::table.filter(evaluation_results::evaluation_id.eq(id))
                                            .order(evaluation_results::id.asc())
                                            .select(ResultRow::as_select())
                                            .load::<ResultRow>(conn)?
                                            .into_iter()
                                            .map(ResultRow::into_domain)
                                            .collect()
               })?)
    }

    fn load_process_graph(&self, id: EvaluationId) -> StoreResult<ProcessGraph> {
        Ok(self.read(|conn| load_graph(conn, id))?)
    }

    fn replace_process_graph(&self, write: &ProcessGraphWrite) -> StoreResult<ProcessGraph> {
        Ok(self.write(|tx| {
                   let current = lock_root(tx, write.evaluation_id, write.expected_version)?;
                   write_graph(tx, write)?;
                   diesel::update(evaluations::table.find(write.evaluation_id))
                       .set((evaluations::version.eq(current + 1), evaluations::updated_at.eq(write.now)))
                       .execute(tx)?;
                   let kind = EvaluationEventKind::ProcessesReplaced { payload_hash: write.payload_hash.clone(),
                                                                       lots: write.plan.lots.len(),
                                                                       steps: write.plan.steps.len() };
                   append_event(tx, write.evaluation_id, write.actor_id, &kind, write.now)?;
                   load_graph(tx, write.evaluation_id)
               })?)
    }

    fn latest_raw_payload(&self, id: EvaluationId) -> StoreResult<Option<RawProcessPayload>> {
        Ok(self.read(|conn| {
                   Ok(evaluation_process_raw::table.filter(evaluation_process_raw::evaluation_id.eq(id))
                                                   .order(evaluation_process_raw::id.desc())
                                                   .select(RawRow::as_select())
                                                   .first::<RawRow>(conn)
                                                   .optional()?
                                                   .map(RawProcessPayload::from))
               })?)
    }
}

impl<P: ConnectionProvider> EventStore for PgStore<P> {
    fn append_kind(&self, evaluation_id: EvaluationId, actor_id: Option<UserId>, kind: EvaluationEventKind,
                   ts: DateTime<Utc>)
                   -> StoreResult<EvaluationEvent> {
        Ok(self.write(|tx| append_event(tx, evaluation_id, actor_id, &kind, ts))?)
    }

    fn list_events(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<EvaluationEvent>> {
        Ok(self.read(|conn| {
                   evaluation_events::table.filter(evaluation_events::evaluation_id.eq(evaluation_id))
                                           .order(evaluation_events::seq.asc())
                                           .select(EventRow::as_select())
                                           .load::<EventRow>(conn)?
                                           .into_iter()
                                           .map(EventRow::into_domain)
                                           .collect()
               })?)
    }
}
