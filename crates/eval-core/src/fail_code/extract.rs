//! Minería de candidatos a fail code en texto libre.
//!
//! Dos familias de tokens: códigos (regex ASCII, filtrados por deny-list y
//! stopwords) y nombres (frases de falla conocidas en chino). Cada token
//! lleva su contexto (30 caracteres a cada lado).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

const CONTEXT_CHARS: usize = 30;

static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| compile(&[r"\b[0-9]{3,6}\b", r"\b[A-Z]{2,6}\b"]));

static DENY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[r"^M\d{3}$", r"^R\d{3}$", r"^SN\d+$", r"^X0[A-Z0-9]+$", r"^\d+F/\d+ea$", r"^\d+(\.\d+)?h$"])
});

const STOPWORDS: &[&str] = &["DOE", "PFQ", "PRQ", "AQL", "TC", "SREP", "HOLD", "AGING", "REPAIR", "QA", "PROCESS",
                              "PASS", "RETEST", "ALL", "CLOSE"];

pub const FAILURE_PHRASES: &[&str] = &["不识别", "功能性不良", "开路", "短路", "坏块", "ECC错误", "掉电", "过温",
                                       "老化", "裂纹", "腐蚀", "焊点", "掉颗", "CTRL功能性不良"];

// alternancia con las frases más largas primero
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let mut phrases: Vec<&str> = FAILURE_PHRASES.to_vec();
    phrases.sort_by_key(|p| std::cmp::Reverse(p.chars().count()));
    let alternation = phrases.iter().map(|p| regex::escape(p)).collect::<Vec<_>>().join("|");
    Regex::new(&alternation).expect("failure phrase alternation")
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).expect("constant token pattern")).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Code,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedToken {
    pub token: String,
    pub token_type: TokenType,
    /// Offset en bytes dentro del texto.
    pub start: usize,
    pub context: String,
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let before: Vec<char> = text[..start].chars().rev().take(CONTEXT_CHARS).collect();
    let after = text[end..].chars().take(CONTEXT_CHARS);
    before.into_iter().rev().chain(text[start..end].chars()).chain(after).collect()
}

pub fn extract_tokens(text: &str) -> Vec<MinedToken> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut push = |start: usize, end: usize, token_type: TokenType| {
        if seen.insert((start, end, token_type)) {
            out.push(MinedToken { token: text[start..end].to_string(),
                                  token_type,
                                  start,
                                  context: context_around(text, start, end) });
        }
    };

    for pattern in CODE_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let upper = m.as_str().to_uppercase();
            if STOPWORDS.contains(&upper.as_str()) || DENY_PATTERNS.iter().any(|d| d.is_match(&upper)) {
                continue;
            }
            push(m.start(), m.end(), TokenType::Code);
        }
    }
    for m in NAME_PATTERN.find_iter(text) {
        push(m.start(), m.end(), TokenType::Name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<(String, TokenType)> {
        extract_tokens(text).into_iter().map(|t| (t.token, t.token_type)).collect()
    }

    #[test]
    fn codes_skip_stopwords_and_denied_shapes() {
        let found = tokens("DOE 201 fail, SHORT on M010, AQL retest, 12h aging");
        assert_eq!(found, vec![("201".into(), TokenType::Code), ("SHORT".into(), TokenType::Code)]);
    }

    #[test]
    fn longest_phrase_wins() {
        let found = tokens("lot 3: CTRL功能性不良 x2");
        assert!(found.contains(&("CTRL功能性不良".to_string(), TokenType::Name)));
        assert!(!found.contains(&("功能性不良".to_string(), TokenType::Name)));
    }

    #[test]
    fn patterns_compile() {
        assert_eq!(CODE_PATTERNS.len(), 2);
        assert_eq!(DENY_PATTERNS.len(), 6);
        assert!(NAME_PATTERN.is_match("ECC错误"));
    }

    #[test]
    fn each_occurrence_is_reported() {
        let found = tokens("SHORT 201 SHORT");
        let shorts = found.iter().filter(|(t, _)| t == "SHORT").count();
        assert_eq!(shorts, 2);
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn context_is_char_bounded() {
        let t = extract_tokens("开路开路开路 500");
        let code = t.iter().find(|t| t.token == "500").unwrap();
        assert_eq!(code.context, "开路开路开路 500");
    }
}
