//! Registro de operaciones (`operation_logs`).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use eval_core::store::{AuditSink, LogFilter, StoreResult};
use eval_domain::{NewOperationLog, OperationLog};

use super::{ConnectionProvider, PgStore};
use crate::models::{NewOperationLogRow, OperationLogRow};
use crate::schema::operation_logs;

impl<P: ConnectionProvider> AuditSink for PgStore<P> {
    fn append_log(&self, entry: &NewOperationLog, at: DateTime<Utc>) -> StoreResult<OperationLog> {
        Ok(self.write(|tx| {
                   diesel::insert_into(operation_logs::table).values(NewOperationLogRow::new(entry, at))
                                                             .returning(OperationLogRow::as_returning())
                                                             .get_result::<OperationLogRow>(tx)?
                                                             .into_domain()
               })?)
    }

    fn query_logs(&self, filter: &LogFilter) -> StoreResult<Vec<OperationLog>> {
        Ok(self.read(|conn| {
                   let mut query = operation_logs::table.select(OperationLogRow::as_select()).into_boxed();
                   if let Some(uid) = filter.user_id {
                       query = query.filter(operation_logs::user_id.eq(uid));
                   }
                   if let Some(op) = filter.operation_type {
                       query = query.filter(operation_logs::operation_type.eq(op.as_str()));
                   }
                   if let Some(target) = &filter.target_type {
                       query = query.filter(operation_logs::target_type.eq(target.as_str()));
                   }
                   if let Some(id) = filter.target_id {
                       query = query.filter(operation_logs::target_id.eq(id));
                   }
                   if let Some(ok) = filter.success {
                       query = query.filter(operation_logs::success.eq(ok));
                   }
                   query.order(operation_logs::id.asc())
                        .load::<OperationLogRow>(conn)?
                        .into_iter()
                        .map(OperationLogRow::into_domain)
                        .collect()
               })?)
    }
}
