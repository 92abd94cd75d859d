//! Comentarios en árbol por Evaluation, con borrado lógico.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::{CommentId, EvaluationId, FieldError, UserId};

/// Contenido que reemplaza al texto original tras un borrado lógico.
pub const COMMENT_TOMBSTONE: &str = "[Comment deleted]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub evaluation_id: EvaluationId,
    pub author_id: UserId,
    pub parent_comment_id: Option<CommentId>,
    pub depth: i32,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub evaluation_id: EvaluationId,
    pub author_id: UserId,
    pub parent_comment_id: Option<CommentId>,
    pub depth: i32,
    pub content: String,
}

pub const COMMENT_MAX_LEN: usize = 5000;

impl Comment {
    pub fn edit(&mut self, content: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.is_deleted {
            return Err(DomainError::Validation(vec![FieldError::new("comment", "cannot edit a deleted comment")]));
        }
        self.content = validate_content(content)?;
        self.is_edited = true;
        self.edited_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.content = COMMENT_TOMBSTONE.to_string();
        self.updated_at = now;
    }

    /// Quita la marca de borrado; el contenido sigue siendo el tombstone.
    pub fn restore(&mut self, now: DateTime<Utc>) {
        if !self.is_deleted {
            return;
        }
        self.is_deleted = false;
        self.deleted_at = None;
        self.updated_at = now;
    }
}

pub fn validate_content(content: &str) -> Result<String, DomainError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(vec![FieldError::new("content", "is required")]));
    }
    if trimmed.chars().count() > COMMENT_MAX_LEN {
        return Err(DomainError::Validation(vec![FieldError::new("content",
                                                                format!("must be at most {COMMENT_MAX_LEN} characters"))]));
    }
    Ok(trimmed.to_string())
}

/// Nodo de la vista en árbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    pub comment: Comment,
    /// Respuestas directas no borradas.
    pub reply_count: usize,
    /// Todas las respuestas del subárbol (incluye borradas).
    pub all_replies_count: usize,
    pub replies: Vec<CommentNode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment() -> Comment {
        let now = Utc::now();
        Comment { id: 1,
                  evaluation_id: 1,
                  author_id: 1,
                  parent_comment_id: None,
                  depth: 0,
                  content: "hola".into(),
                  is_edited: false,
                  edited_at: None,
                  is_deleted: false,
                  deleted_at: None,
                  created_at: now,
                  updated_at: now }
    }

    #[test]
    fn soft_delete_uses_tombstone_and_blocks_edit() {
        let mut c = comment();
        c.soft_delete(Utc::now());
        assert!(c.is_deleted);
        assert_eq!(c.content, COMMENT_TOMBSTONE);
        assert!(c.edit("again", Utc::now()).is_err());
        c.restore(Utc::now());
        assert!(!c.is_deleted);
        assert_eq!(c.content, COMMENT_TOMBSTONE);
    }
}
