//! Diccionario de fail codes respaldado por `FailCodeStore`.
//!
//! El minteo concurrente se resuelve con el índice único sobre `code`: ante
//! `UniqueViolation` se relee la fila ganadora. Tras
//! `MAX_FAIL_CODE_ATTEMPTS` intentos sin converger se devuelve `Exhausted`.

use std::sync::Arc;

use eval_domain::{FailCode, NewFailCode, Principal, Role};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::extract::{extract_tokens, TokenType};
use super::normalize::canonicalize;
use crate::clock::Clock;
use crate::constants::MAX_FAIL_CODE_ATTEMPTS;
use crate::errors::WorkflowError;
use crate::identity::check_permission;
use crate::store::{FailCodeStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureOutcome {
    pub created: bool,
    pub updated: bool,
}

/// Token minado y el código al que resolvió.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedCode {
    pub token: String,
    pub token_type: TokenType,
    pub code: String,
    pub context: String,
}

#[derive(Clone)]
pub struct FailCodeDictionary {
    store: Arc<dyn FailCodeStore>,
    clock: Arc<dyn Clock>,
}

impl FailCodeDictionary {
    pub fn new(store: Arc<dyn FailCodeStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Devuelve la entrada del código canónico de `text`, minteando una
    /// provisional si no existe.
    pub fn resolve(&self, text: &str) -> Result<FailCode, WorkflowError> {
        let canonical = canonicalize(text)?;
        let (code, _) = self.ensure(&NewFailCode { code: canonical.code,
                                                   short_name: canonical.short_name,
                                                   description: None,
                                                   is_provisional: true,
                                                   source: Some(canonical.source) })?;
        Ok(code)
    }

    /// Inserta si falta; si existe completa `short_name`/`source` vacíos.
    /// Una entrada oficial nunca vuelve a provisional.
    pub fn ensure(&self, wanted: &NewFailCode) -> Result<(FailCode, EnsureOutcome), WorkflowError> {
        for attempt in 1..=MAX_FAIL_CODE_ATTEMPTS {
            if let Some(existing) = self.store.find_code(&wanted.code)? {
                return self.fill_missing(existing, wanted);
            }
            match self.store.insert_code(wanted, self.clock.now()) {
                Ok(row) => {
                    info!("fail_code_minted code={} provisional={} source={:?}",
                          row.code, row.is_provisional, row.source);
                    return Ok((row, EnsureOutcome { created: true, updated: false }));
                }
                Err(StoreError::UniqueViolation(_)) => {
                    debug!("fail_code_mint_conflict code={} attempt={}", wanted.code, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!("fail_code_mint_exhausted code={}", wanted.code);
        Err(WorkflowError::Exhausted(format!("fail code {}", wanted.code)))
    }

    fn fill_missing(&self, mut row: FailCode, wanted: &NewFailCode) -> Result<(FailCode, EnsureOutcome), WorkflowError> {
        let mut updated = false;
        if row.short_name.is_none() && wanted.short_name.is_some() {
            row.short_name = wanted.short_name.clone();
            updated = true;
        }
        if row.source.is_none() {
            if let Some(source) = wanted.source {
                row.source = Some(source.as_str().to_string());
                updated = true;
            }
        }
        if updated {
            row.updated_at = self.clock.now();
            row = self.store.update_code(&row)?;
        }
        Ok((row, EnsureOutcome { created: false, updated }))
    }

    /// Mina `text` y resuelve cada token (códigos y frases legacy).
    pub fn mine_text(&self, text: &str) -> Result<Vec<MinedCode>, WorkflowError> {
        let mut out = Vec::new();
        for token in extract_tokens(text) {
            let code = self.resolve(&token.token)?;
            out.push(MinedCode { token: token.token, token_type: token.token_type, code: code.code, context: token.context });
        }
        Ok(out)
    }

    /// Curaduría: confirma una entrada provisional (group_leader o superior).
    pub fn promote(&self, actor: &Principal, code: &str, short_name: Option<String>, description: Option<String>)
                   -> Result<FailCode, WorkflowError> {
        check_permission(actor, Role::GroupLeader)?;
        let mut row = self.store
                          .find_code(&canonicalize(code)?.code)?
                          .ok_or_else(|| WorkflowError::not_found("fail_code", code))?;
        row.is_provisional = false;
        if short_name.is_some() {
            row.short_name = short_name;
        }
        if description.is_some() {
            row.description = description;
        }
        row.updated_at = self.clock.now();
        Ok(self.store.update_code(&row)?)
    }

    pub fn find(&self, code: &str) -> Result<Option<FailCode>, WorkflowError> {
        Ok(self.store.find_code(&canonicalize(code)?.code)?)
    }

    pub fn list(&self, provisional_only: bool) -> Result<Vec<FailCode>, WorkflowError> {
        Ok(self.store.list_codes(provisional_only)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::memory::InMemoryStore;
    use eval_domain::FailCodeSource;

    fn dictionary() -> FailCodeDictionary {
        FailCodeDictionary::new(Arc::new(InMemoryStore::new()), Arc::new(SystemClock))
    }

    #[test]
    fn resolve_mints_once() {
        let dict = dictionary();
        let a = dict.resolve("sn-999").unwrap();
        let b = dict.resolve("SN-999").unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.is_provisional);
        assert_eq!(a.source.as_deref(), Some("text-extract"));
        assert_eq!(dict.list(true).unwrap().len(), 1);
    }

    #[test]
    fn promote_requires_curator_role() {
        let dict = dictionary();
        dict.resolve("SHORT").unwrap();
        let user = Principal { id: 1, username: "u".into(), role: Role::User, is_active: true };
        assert!(dict.promote(&user, "SHORT", None, None).is_err());
        let lead = Principal { role: Role::GroupLeader, ..user };
        let row = dict.promote(&lead, "short", Some("Short circuit".into()), None).unwrap();
        assert!(!row.is_provisional);
        assert_eq!(row.short_name.as_deref(), Some("Short circuit"));
        assert!(dict.list(true).unwrap().is_empty());
    }

    #[test]
    fn ensure_fills_missing_name() {
        let dict = dictionary();
        dict.resolve("201").unwrap();
        let (row, outcome) = dict.ensure(&NewFailCode { code: "201".into(),
                                                        short_name: Some("open".into()),
                                                        description: None,
                                                        is_provisional: true,
                                                        source: Some(FailCodeSource::Manual) })
                                 .unwrap();
        assert!(outcome.updated && !outcome.created);
        assert_eq!(row.short_name.as_deref(), Some("open"));
        assert_eq!(row.source.as_deref(), Some("text-extract"));
    }

    #[test]
    fn mining_resolves_every_token() {
        let dict = dictionary();
        let mined = dict.mine_text("201 开路 on lot A, SHORT again").unwrap();
        let codes: Vec<&str> = mined.iter().map(|m| m.code.as_str()).collect();
        assert!(codes.contains(&"201"));
        assert!(codes.contains(&"SHORT"));
        assert!(codes.iter().any(|c| c.starts_with("LEGACY-ZH")));
    }
}
