//! Registro de eventos por Evaluation y trait EventStore.

mod store;
mod types;

pub use store::{EventLog, EventStore};
pub use types::{EvaluationEvent, EvaluationEventKind};
