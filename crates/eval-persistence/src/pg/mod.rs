//! Implementaciones Postgres (Diesel) de los traits del núcleo.
//!
//! Objetivo general del módulo:
//! - Paridad 1:1 con `eval_core::InMemoryStore` (mismos errores, mismo orden
//!   de listados, mismos eventos).
//! - Aislar el mapeo dominio ↔ filas de DB del `eval-core`.
//!
//! Concurrencia:
//! - Toda escritura sobre la raíz de una Evaluation toma `SELECT … FOR
//!   UPDATE` de la fila y compara `version` con `expected_version` dentro de
//!   la misma transacción; si difiere devuelve `VersionConflict` sin escribir.
//! - El evento del agregado se inserta en la misma transacción que la raíz.
//! - Errores transitorios (serialización, pool, desconexión) se reintentan
//!   con `with_retry`.

mod audit;
mod collab;
mod denylist;
mod directory;
mod evaluations;
mod processes;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use log::warn;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use denylist::PgDenylist;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo con `build_pool` se corre el set de migraciones
/// pendientes (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o un
/// proveedor alternativo en tests sin acoplar a r2d2. Debe devolver una
/// conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool.get().map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
///
/// Cubre conflictos de serialización, errores de IO del pool/conexión y
/// mensajes comunes de desconexión/timeout detectados por texto.
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry con backoff lineal corto: 3 reintentos (15ms, 30ms, 45ms).
///
/// Sólo repite la unidad de trabajo `f`; `VersionConflict` y las
/// violaciones de índice no se reintentan aquí (las decide el núcleo).
pub(crate) fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error attempt={} err={:?} sleep_ms={}", attempts + 1, e, delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

/// Store Postgres: implementa todos los traits de `eval_core::store` y
/// `EventStore`. Usar con `Stores::from_backend(Arc::new(PgStore::new(..)))`.
pub struct PgStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Lectura con retry (sin transacción explícita).
    pub(crate) fn read<T, F>(&self, f: F) -> Result<T, PersistenceError>
        where F: Fn(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            f(&mut conn)
        })
    }

    /// Unidad atómica read-write con retry ante errores transitorios.
    pub(crate) fn write<T, F>(&self, f: F) -> Result<T, PersistenceError>
        where F: Fn(&mut PgConnection) -> Result<T, PersistenceError>
    {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction().read_write().run(|tx| f(tx))
        })
    }
}

impl PgStore<PoolProvider> {
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

/// Construye un pool r2d2 y corre migraciones en el primer checkout.
///
/// - Si `min_size > max_size`, usa `min_size = max_size`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("pool min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(validated_min.min(validated_max)))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DB_URL, tamaños)
/// y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn retries_transient_then_gives_up() {
        let calls = Cell::new(0);
        let out: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::TransientIo("pool timeout".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn version_conflict_is_not_retried() {
        let calls = Cell::new(0);
        let out: Result<(), _> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(PersistenceError::VersionConflict)
        });
        assert!(matches!(out, Err(PersistenceError::VersionConflict)));
        assert_eq!(calls.get(), 1);
    }
}
