//! EvalFlow
//!
//! Este crate une los crates del workspace en una aplicación:
//! - `config`: entorno (.env) validado en `AppConfig`.
//! - `app`: cableado de servicios sobre memoria o Postgres.
//! - `gateway`: borde async (deadline por request, handlers bloqueantes).
//! - `errors`: errores de arranque y cuerpo de error por request.

pub mod app;
pub mod config;
pub mod errors;
pub mod gateway;

pub use app::{App, Backend};
pub use config::{AppConfig, ConfigError};
pub use errors::{status_code, AppError, ErrorResponse};
pub use gateway::{Gateway, RequestMeta};
