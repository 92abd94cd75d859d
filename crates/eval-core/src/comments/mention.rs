//! Parseo y resolución de menciones `@usuario`.

use std::sync::Arc;

use eval_domain::{Principal, UserId};
use indexmap::IndexMap;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::store::UserDirectory;

static MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").expect("mention pattern"));

/// Token `@usuario` con la posición (en caracteres) de su primera aparición.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionToken {
    pub username: String,
    pub position: i32,
}

/// Menciones únicas en orden de aparición.
pub fn parse_mentions(text: &str) -> Vec<MentionToken> {
    let mut unique: IndexMap<String, i32> = IndexMap::new();
    for caps in MENTION.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let position = text[..whole.start()].chars().count() as i32;
        unique.entry(name.as_str().to_string()).or_insert(position);
    }
    unique.into_iter().map(|(username, position)| MentionToken { username, position }).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMention {
    pub user_id: UserId,
    pub username: String,
    pub position: i32,
}

/// Resultado de la resolución: destinatarios y nombres que no se pudieron
/// resolver (se reportan como advertencias).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MentionResolution {
    pub targets: Vec<ResolvedMention>,
    pub unresolved: Vec<String>,
}

#[derive(Clone)]
pub struct MentionResolver {
    users: Arc<dyn UserDirectory>,
}

impl MentionResolver {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Usuarios activos mencionados en `text`, sin el propio autor. Nunca
    /// falla: errores de lookup quedan en `unresolved`.
    pub fn resolve(&self, text: &str, mentioner: &Principal) -> MentionResolution {
        let mut out = MentionResolution::default();
        for token in parse_mentions(text) {
            match self.users.find_by_username(&token.username) {
                Ok(Some(user)) if user.id == mentioner.id => {}
                Ok(Some(user)) if user.is_active => out.targets.push(ResolvedMention { user_id: user.id,
                                                                                       username: user.username,
                                                                                       position: token.position }),
                Ok(_) => out.unresolved.push(token.username),
                Err(e) => {
                    warn!("mention_lookup_failed username={} error={}", token.username, e);
                    out.unresolved.push(token.username);
                }
            }
        }
        out
    }
}
