use eval_domain::fail_code::FAIL_CODE_MAX_LEN;
use eval_domain::FailCodeSource;
use sha1::{Digest, Sha1};

use crate::errors::WorkflowError;

/// Código canónico y cómo se derivó.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalCode {
    pub code: String,
    pub source: FailCodeSource,
    /// Texto original para nombres legacy.
    pub short_name: Option<String>,
}

/// Pliega formas de ancho completo (U+FF01..U+FF5E) y el espacio ideográfico.
pub fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            other => other,
        })
        .collect()
}

/// `LEGACY-<slug>`: mayúsculas, corridas de `[^A-Z0-9]` → `-`, recorte de
/// guiones, 48 caracteres; si no queda nada, `ZH` + 10 hex de SHA-1.
pub fn legacy_slug(token: &str) -> String {
    let upper = token.to_uppercase();
    let mut slug = String::with_capacity(upper.len());
    let mut pending_dash = false;
    for c in upper.chars() {
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        let digest = hex::encode_upper(Sha1::digest(token.as_bytes()));
        format!("LEGACY-ZH{}", &digest[..10])
    } else {
        let cut: String = slug.chars().take(48).collect();
        format!("LEGACY-{}", cut.trim_end_matches('-'))
    }
}

/// Normaliza `text` (trim, ancho, mayúsculas ASCII) y decide el código.
pub fn canonicalize(text: &str) -> Result<CanonicalCode, WorkflowError> {
    let folded = fold_width(text);
    let trimmed = folded.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation("fail_code_text", "is required"));
    }
    let canonical = if trimmed.is_ascii() {
        CanonicalCode { code: trimmed.to_ascii_uppercase(), source: FailCodeSource::TextExtract, short_name: None }
    } else {
        CanonicalCode { code: legacy_slug(trimmed),
                        source: FailCodeSource::LegacyText,
                        short_name: Some(trimmed.to_string()) }
    };
    if canonical.code.chars().count() > FAIL_CODE_MAX_LEN {
        return Err(WorkflowError::validation("fail_code_text",
                                             format!("code must be at most {FAIL_CODE_MAX_LEN} characters")));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_codes_are_uppercased_and_width_folded() {
        let c = canonicalize("  short ").unwrap();
        assert_eq!(c.code, "SHORT");
        assert_eq!(c.source, FailCodeSource::TextExtract);
        assert_eq!(canonicalize("ＳＮ－９９９").unwrap().code, "SN-999");
        assert_eq!(canonicalize("201").unwrap().code, "201");
    }

    #[test]
    fn chinese_names_get_hashed_slug() {
        let c = canonicalize("开路").unwrap();
        assert!(c.code.starts_with("LEGACY-ZH"));
        assert_eq!(c.code.len(), "LEGACY-ZH".len() + 10);
        assert_eq!(c.short_name.as_deref(), Some("开路"));
        assert_eq!(c.source, FailCodeSource::LegacyText);
        assert_eq!(canonicalize("开路").unwrap().code, c.code);
    }

    #[test]
    fn mixed_names_keep_ascii_part() {
        assert_eq!(legacy_slug("CTRL功能性不良"), "LEGACY-CTRL");
        assert_eq!(legacy_slug("ECC错误 v2"), "LEGACY-ECC-V2");
        assert!(canonicalize("   ").is_err());
    }
}
