//! Denylist de tokens revocados (por `jti`).
//!
//! `InMemoryDenylist` es por proceso; en despliegues con varias instancias
//! usar el store compartido de `eval-persistence` (`revoked_tokens`).

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::store::StoreResult;

pub trait TokenDenylist: Send + Sync {
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;
    fn is_revoked(&self, jti: &str) -> StoreResult<bool>;
    /// Elimina entradas ya expiradas; devuelve cuántas.
    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}

#[derive(Debug, Default)]
pub struct InMemoryDenylist {
    revoked: DashMap<String, DateTime<Utc>>,
}

impl InMemoryDenylist {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenDenylist for InMemoryDenylist {
    fn revoke(&self, jti: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.revoked.insert(jti.to_string(), expires_at);
        Ok(())
    }

    fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        Ok(self.revoked.contains_key(jti))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let before = self.revoked.len();
        self.revoked.retain(|_, exp| *exp > now);
        Ok(before - self.revoked.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn revoke_and_purge() {
        let list = InMemoryDenylist::new();
        let now = Utc::now();
        list.revoke("a", now - Duration::minutes(1)).unwrap();
        list.revoke("b", now + Duration::hours(1)).unwrap();
        assert!(list.is_revoked("a").unwrap());
        assert_eq!(list.purge_expired(now).unwrap(), 1);
        assert!(!list.is_revoked("a").unwrap());
        assert!(list.is_revoked("b").unwrap());
    }
}
