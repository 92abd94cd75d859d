//! eval-persistence
//!
//! Implementación Postgres (Diesel + r2d2) de los traits de `eval-core::store`
//! con la misma semántica que el backend en memoria.
//!
//! Módulos:
//! - `pg`: `PgStore` (todos los stores del núcleo) y `PgDenylist`.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema` / `models`: tablas Diesel y filas de lectura/escritura.

pub mod config;
pub mod error;
pub mod migrations;
pub mod models;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgDenylist, PgPool, PgStore, PoolProvider};
