//! Servicio de comentarios.
//!
//! Reglas:
//! - las respuestas apuntan a un padre no borrado de la misma evaluación;
//! - sólo el autor edita, y nunca un comentario borrado;
//! - borra y restaura el autor o un admin;
//! - editar reemplaza las menciones del comentario (borrar + insertar).
//!
//! La resolución y notificación de menciones es best-effort: un error se
//! loguea y no afecta al comentario ya guardado.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use eval_domain::comment::validate_content;
use eval_domain::{Comment, CommentId, CommentNode, Evaluation, EvaluationId, Mention, MentionId, MentionStatus,
                  MentionType, NewComment, NewMention, OperationType, Principal, UserId};
use log::{info, warn};
use serde_json::json;

use super::mention::MentionResolver;
use crate::audit::{AuditEntry, AuditTrail};
use crate::clock::Clock;
use crate::constants::DEFAULT_REPLY_DEPTH;
use crate::context::RequestContext;
use crate::errors::WorkflowError;
use crate::identity::RoleResolver;
use crate::notify::Notifier;
use crate::store::{CommentStore, EvaluationStore, MentionScope, MentionStore, Stores};

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentStore>,
    mentions: Arc<dyn MentionStore>,
    evaluations: Arc<dyn EvaluationStore>,
    roles: RoleResolver,
    resolver: MentionResolver,
    notifier: Notifier,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
}

fn snapshot(c: &Comment) -> serde_json::Value {
    json!({
        "content": c.content,
        "is_deleted": c.is_deleted,
        "is_edited": c.is_edited,
        "parent_comment_id": c.parent_comment_id,
    })
}

impl CommentService {
    pub fn new(stores: &Stores, notifier: Notifier, audit: AuditTrail, clock: Arc<dyn Clock>) -> Self {
        Self { comments: stores.comments.clone(),
               mentions: stores.mentions.clone(),
               evaluations: stores.evaluations.clone(),
               roles: RoleResolver::new(stores.users.clone()),
               resolver: MentionResolver::new(stores.users.clone()),
               notifier,
               audit,
               clock }
    }

    fn evaluation(&self, id: EvaluationId) -> Result<Evaluation, WorkflowError> {
        self.evaluations.find_evaluation(id)?.ok_or_else(|| WorkflowError::not_found("evaluation", id))
    }

    fn comment(&self, id: CommentId) -> Result<Comment, WorkflowError> {
        self.comments.find_comment(id)?.ok_or_else(|| WorkflowError::not_found("comment", id))
    }

    pub fn create(&self, ctx: &RequestContext, evaluation_id: EvaluationId, content: &str,
                  parent_id: Option<CommentId>)
                  -> Result<Comment, WorkflowError> {
        let entry = AuditEntry::new(OperationType::Create, "comment");
        let outcome = self.create_inner(ctx, evaluation_id, content, parent_id);
        self.audit.track(ctx, entry, outcome, |c, e| {
                      e.target(c.id)
                       .describe(format!("comment on evaluation {}", c.evaluation_id))
                       .new_data(snapshot(c))
                       .created()
                  })
    }

    fn create_inner(&self, ctx: &RequestContext, evaluation_id: EvaluationId, content: &str,
                    parent_id: Option<CommentId>)
                    -> Result<Comment, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let evaluation = self.evaluation(evaluation_id)?;
        let content = validate_content(content)?;
        let depth = match parent_id {
            None => 0,
            Some(pid) => {
                let parent = self.comment(pid)?;
                if parent.evaluation_id != evaluation_id {
                    return Err(WorkflowError::validation("parent_comment_id",
                                                         "must belong to the same evaluation"));
                }
                if parent.is_deleted {
                    return Err(WorkflowError::validation("parent_comment_id", "cannot reply to a deleted comment"));
                }
                parent.depth + 1
            }
        };
        let row = NewComment { evaluation_id,
                               author_id: actor.id,
                               parent_comment_id: parent_id,
                               depth,
                               content };
        let comment = self.comments.insert_comment(&row, self.clock.now())?;
        info!("comment_created id={} evaluation={} depth={}", comment.id, evaluation_id, depth);
        self.sync_mentions(&actor, &evaluation, &comment);
        Ok(comment)
    }

    /// Reemplaza las menciones del comentario y notifica sólo a los
    /// destinatarios que no estaban mencionados. Devuelve la cantidad de
    /// menciones guardadas.
    fn sync_mentions(&self, actor: &Principal, evaluation: &Evaluation, comment: &Comment) -> usize {
        let scope = MentionScope::Comment(comment.id);
        let previous: HashSet<UserId> = match self.mentions.mentions_in(scope) {
            Ok(rows) => rows.into_iter().map(|m| m.mentioned_user_id).collect(),
            Err(e) => {
                warn!("mention_lookup_failed comment={} error={}", comment.id, e);
                HashSet::new()
            }
        };
        let resolution = self.resolver.resolve(&comment.content, actor);
        for name in &resolution.unresolved {
            warn!("mention_unresolved comment={} username={}", comment.id, name);
        }
        let rows: Vec<NewMention> = resolution.targets
                                              .iter()
                                              .map(|t| NewMention { mention_type: MentionType::EvaluationComment,
                                                                    mentioned_user_id: t.user_id,
                                                                    mentioner_id: actor.id,
                                                                    evaluation_id: Some(evaluation.id),
                                                                    comment_id: Some(comment.id),
                                                                    message_id: None,
                                                                    context_text: comment.content.clone(),
                                                                    mention_position: t.position })
                                              .collect();
        let saved = match self.mentions.replace_mentions(scope, &rows, self.clock.now()) {
            Ok(saved) => saved,
            Err(e) => {
                warn!("mention_replace_failed comment={} error={}", comment.id, e);
                return 0;
            }
        };
        for m in saved.iter().filter(|m| !previous.contains(&m.mentioned_user_id)) {
            self.notifier.mention(&evaluation.evaluation_number,
                                  Some(evaluation.id),
                                  actor,
                                  m.mentioned_user_id,
                                  &comment.content);
        }
        saved.len()
    }

    pub fn edit(&self, ctx: &RequestContext, id: CommentId, content: &str) -> Result<Comment, WorkflowError> {
        let entry = AuditEntry::new(OperationType::Update, "comment").target(id);
        let mut before = None;
        let outcome = self.edit_inner(ctx, id, content, &mut before);
        self.audit.track(ctx, entry, outcome, |c, e| {
                      let e = e.new_data(snapshot(c));
                      match &before {
                          Some(b) => e.old(snapshot(b)),
                          None => e,
                      }
                  })
    }

    fn edit_inner(&self, ctx: &RequestContext, id: CommentId, content: &str, before: &mut Option<Comment>)
                  -> Result<Comment, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let mut comment = self.comment(id)?;
        if comment.author_id != actor.id {
            return Err(WorkflowError::forbidden("only the author can edit a comment"));
        }
        *before = Some(comment.clone());
        comment.edit(content, self.clock.now())?;
        let saved = self.comments.update_comment(&comment)?;
        let evaluation = self.evaluation(saved.evaluation_id)?;
        self.sync_mentions(&actor, &evaluation, &saved);
        Ok(saved)
    }

    /// Borrado lógico: el contenido pasa a ser el tombstone y las respuestas
    /// siguen visibles.
    pub fn delete(&self, ctx: &RequestContext, id: CommentId) -> Result<Comment, WorkflowError> {
        self.toggle_deleted(ctx, id, OperationType::Delete, true)
    }

    /// Quita la marca de borrado (el contenido original no se recupera).
    pub fn restore(&self, ctx: &RequestContext, id: CommentId) -> Result<Comment, WorkflowError> {
        self.toggle_deleted(ctx, id, OperationType::Update, false)
    }

    fn toggle_deleted(&self, ctx: &RequestContext, id: CommentId, op: OperationType, delete: bool)
                      -> Result<Comment, WorkflowError> {
        let entry = AuditEntry::new(op, "comment").target(id);
        let mut before = None;
        let outcome = (|| -> Result<Comment, WorkflowError> {
            let actor = self.roles.authenticated(ctx)?;
            let mut comment = self.comment(id)?;
            if comment.author_id != actor.id && !actor.is_admin() {
                return Err(WorkflowError::forbidden("only the author or an admin can change this comment"));
            }
            before = Some(comment.clone());
            if delete {
                comment.soft_delete(self.clock.now());
            } else {
                comment.restore(self.clock.now());
            }
            Ok(self.comments.update_comment(&comment)?)
        })();
        self.audit.track(ctx, entry, outcome, |c, e| {
                      let e = e.new_data(snapshot(c));
                      match &before {
                          Some(b) => e.old(snapshot(b)),
                          None => e,
                      }
                  })
    }

    /// Comentarios de una evaluación en orden de creación (incluye borrados).
    pub fn list_for_evaluation(&self, ctx: &RequestContext, evaluation_id: EvaluationId)
                               -> Result<Vec<Comment>, WorkflowError> {
        self.roles.authenticated(ctx)?;
        self.evaluation(evaluation_id)?;
        let mut all = self.comments.list_comments(evaluation_id)?;
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }

    /// Vista en árbol. Los nodos más profundos que `max_depth` no se
    /// expanden, pero cuentan en `all_replies_count`.
    pub fn tree(&self, ctx: &RequestContext, evaluation_id: EvaluationId, max_depth: Option<usize>)
                -> Result<Vec<CommentNode>, WorkflowError> {
        let all = self.list_for_evaluation(ctx, evaluation_id)?;
        Ok(build_tree(all, max_depth.unwrap_or(DEFAULT_REPLY_DEPTH)))
    }

    pub fn mentions_for(&self, ctx: &RequestContext, status: Option<MentionStatus>)
                        -> Result<Vec<Mention>, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        Ok(self.mentions.mentions_for_user(actor.id, status)?)
    }

    pub fn mark_mention_read(&self, ctx: &RequestContext, id: MentionId) -> Result<Mention, WorkflowError> {
        self.update_own_mention(ctx, id, |m, now| m.mark_read(now))
    }

    pub fn acknowledge(&self, ctx: &RequestContext, id: MentionId) -> Result<Mention, WorkflowError> {
        self.update_own_mention(ctx, id, |m, now| m.acknowledge(now))
    }

    fn update_own_mention(&self, ctx: &RequestContext, id: MentionId,
                          apply: impl FnOnce(&mut Mention, chrono::DateTime<chrono::Utc>))
                          -> Result<Mention, WorkflowError> {
        let actor = self.roles.authenticated(ctx)?;
        let mut mention = self.mentions
                              .find_mention(id)?
                              .filter(|m| m.mentioned_user_id == actor.id)
                              .ok_or_else(|| WorkflowError::not_found("mention", id))?;
        apply(&mut mention, self.clock.now());
        Ok(self.mentions.update_mention(&mention)?)
    }
}

/// Arma el árbol a partir de la lista plana ordenada por creación.
pub fn build_tree(all: Vec<Comment>, max_depth: usize) -> Vec<CommentNode> {
    let mut children: HashMap<Option<CommentId>, Vec<Comment>> = HashMap::new();
    for c in all {
        children.entry(c.parent_comment_id).or_default().push(c);
    }
    let roots = children.remove(&None).unwrap_or_default();
    roots.into_iter().map(|c| node(c, &children, 0, max_depth)).collect()
}

fn node(comment: Comment, children: &HashMap<Option<CommentId>, Vec<Comment>>, level: usize, max_depth: usize)
        -> CommentNode {
    let direct = children.get(&Some(comment.id)).map(Vec::as_slice).unwrap_or_default();
    let reply_count = direct.iter().filter(|c| !c.is_deleted).count();
    let all_replies_count = count_subtree(comment.id, children);
    let replies = if level + 1 >= max_depth {
        Vec::new()
    } else {
        direct.iter().cloned().map(|c| node(c, children, level + 1, max_depth)).collect()
    };
    CommentNode { comment, reply_count, all_replies_count, replies }
}

fn count_subtree(id: CommentId, children: &HashMap<Option<CommentId>, Vec<Comment>>) -> usize {
    children.get(&Some(id))
            .map(|direct| direct.iter().map(|c| 1 + count_subtree(c.id, children)).sum())
            .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn c(id: CommentId, parent: Option<CommentId>, depth: i32, deleted: bool) -> Comment {
        let now = Utc::now();
        Comment { id,
                  evaluation_id: 1,
                  author_id: 1,
                  parent_comment_id: parent,
                  depth,
                  content: format!("c{id}"),
                  is_edited: false,
                  edited_at: None,
                  is_deleted: deleted,
                  deleted_at: None,
                  created_at: now,
                  updated_at: now }
    }

    #[test]
    fn counts_and_depth_cut() {
        let all = vec![c(1, None, 0, false), c(2, Some(1), 1, true), c(3, Some(1), 1, false), c(4, Some(2), 2, false)];
        let tree = build_tree(all.clone(), 5);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].reply_count, 1);
        assert_eq!(tree[0].all_replies_count, 3);
        assert_eq!(tree[0].replies[0].replies[0].comment.id, 4);

        let shallow = build_tree(all, 2);
        assert_eq!(shallow[0].replies.len(), 2);
        assert!(shallow[0].replies[0].replies.is_empty());
        assert_eq!(shallow[0].replies[0].all_replies_count, 1);
    }
}
