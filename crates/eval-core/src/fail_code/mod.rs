//! Fail-Code Dictionary (C2).
//!
//! - `normalize`: forma canónica de un código (ASCII en mayúsculas o slug
//!   `LEGACY-…`).
//! - `extract`: minería de tokens candidatos en texto libre.
//! - `dictionary`: resolución contra el store con minteo de provisionales.

pub mod dictionary;
pub mod extract;
pub mod normalize;

pub use dictionary::{EnsureOutcome, FailCodeDictionary, MinedCode};
pub use extract::{extract_tokens, MinedToken, TokenType};
pub use normalize::{canonicalize, fold_width, legacy_slug, CanonicalCode};
