//! eval-core: motor de workflow de evaluaciones de producto
//!
//! Componentes (de hojas a raíz):
//! - `identity`: resolución de principal y roles, contraseñas, tokens.
//! - `fail_code`: diccionario de códigos de falla (canonicalización y minteo
//!   de provisionales).
//! - `aggregate`: servicio del agregado Evaluation (alta, patch, grafo de
//!   proceso, numeración).
//! - `workflow`: máquina de estados con compuertas por rol y versión
//!   optimista.
//! - `notify`: fan-out de notificaciones in-app.
//! - `audit`: registro de operaciones (best-effort).
//! - `comments`: comentarios en árbol y resolución de menciones.
//!
//! La persistencia se abstrae con los traits de `store`; `store::memory`
//! provee la implementación en memoria (paridad con `eval-persistence`).

pub mod aggregate;
pub mod audit;
pub mod clock;
pub mod comments;
pub mod constants;
pub mod context;
pub mod errors;
pub mod event;
pub mod fail_code;
pub mod hashing;
pub mod identity;
pub mod notify;
pub mod services;
pub mod store;
pub mod workflow;

pub use aggregate::{EvaluationNumberGenerator, EvaluationService, EvaluationView};
pub use audit::AuditTrail;
pub use clock::{Clock, FixedClock, SystemClock};
pub use comments::CommentService;
pub use context::RequestContext;
pub use errors::{classify, ErrorClass, WorkflowError};
pub use event::{EvaluationEvent, EvaluationEventKind, EventStore};
pub use fail_code::FailCodeDictionary;
pub use identity::{AuthService, RoleResolver};
pub use notify::Notifier;
pub use services::Services;
pub use store::memory::InMemoryStore;
pub use store::{StoreError, StoreResult};
pub use workflow::WorkflowEngine;
