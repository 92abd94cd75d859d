//! Evaluation Aggregate (C3).
//!
//! - `numbering`: `PREFIX-YYYYMMDD-NNNN` con reintento ante colisión.
//! - `processes`: normalización del grafo Lot/Step/StepFailure.
//! - `service`: alta, patch, borrado, resultados y reescritura del grafo.

pub mod numbering;
pub mod processes;
pub mod service;

pub use numbering::EvaluationNumberGenerator;
pub use service::{EvaluationService, EvaluationView};
