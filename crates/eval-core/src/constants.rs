//! Constantes del motor.
//!
//! Límites de reintento y valores por defecto compartidos por los servicios.

/// Prefijo por defecto del número de evaluación (`EVAL-YYYYMMDD-NNNN`).
pub const DEFAULT_EVAL_PREFIX: &str = "EVAL";

/// Intentos de inserción ante colisión del número de evaluación.
pub const MAX_NUMBER_ATTEMPTS: u32 = 16;

/// Intentos de minteo de un fail code ante conflicto de índice único.
pub const MAX_FAIL_CODE_ATTEMPTS: u32 = 3;

/// Reintentos de una transición perdedora (versión optimista).
pub const CONFLICT_RETRIES: u32 = 1;

/// Profundidad por defecto de la vista en árbol de comentarios.
pub const DEFAULT_REPLY_DEPTH: usize = 5;

/// Versión lógica del registro de eventos; se guarda en cada payload.
pub const EVENT_SCHEMA_VERSION: u32 = 1;
