//! Denylist compartida de tokens revocados (`revoked_tokens`).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use eval_core::identity::TokenDenylist;
use eval_core::store::StoreResult;
use log::info;

use super::{with_retry, ConnectionProvider};
use crate::models::NewRevokedTokenRow;
use crate::schema::revoked_tokens;

/// Variante durable de `InMemoryDenylist` para varias instancias.
pub struct PgDenylist<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgDenylist<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ConnectionProvider> TokenDenylist for PgDenylist<P> {
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        Ok(with_retry(|| {
               let mut conn = self.provider.connection()?;
               diesel::insert_into(revoked_tokens::table).values(NewRevokedTokenRow { jti,
                                                                                      expires_at,
                                                                                      revoked_at: Utc::now() })
                                                         .on_conflict_do_nothing()
                                                         .execute(&mut conn)?;
               Ok(())
           })?)
    }

    fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        Ok(with_retry(|| {
               let mut conn = self.provider.connection()?;
               Ok(diesel::select(diesel::dsl::exists(revoked_tokens::table.find(jti))).get_result(&mut conn)?)
           })?)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let purged = with_retry(|| {
                         let mut conn = self.provider.connection()?;
                         Ok(diesel::delete(revoked_tokens::table.filter(revoked_tokens::expires_at.le(now)))
                             .execute(&mut conn)?)
                     })?;
        info!("revoked_tokens purged={}", purged);
        Ok(purged)
    }
}
