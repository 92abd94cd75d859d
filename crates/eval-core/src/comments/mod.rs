//! Comment & Mention Resolver (C7).
//!
//! Comentarios en árbol por evaluación (borrado lógico con tombstone) y
//! menciones `@usuario` resueltas contra el directorio.

pub mod mention;
pub mod service;

pub use mention::{parse_mentions, MentionResolution, MentionResolver, MentionToken, ResolvedMention};
pub use service::CommentService;
