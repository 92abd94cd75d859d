//! Comentarios, menciones y bandeja de mensajes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use eval_core::store::{CommentStore, MentionScope, MentionStore, MessageStore, StoreResult};
use eval_domain::{Comment, CommentId, EvaluationId, Mention, MentionId, MentionStatus, MentionType, Message,
                  MessageId, NewComment, NewMention, NewMessage, UserId};

use super::{ConnectionProvider, PgStore};
use crate::error::PersistenceError;
use crate::models::{CommentChanges, CommentRow, MentionChanges, MentionRow, MessageRow, NewCommentRow,
                    NewMentionRow, NewMessageRow};
use crate::schema::{comments, evaluations, mentions, messages};

impl<P: ConnectionProvider> CommentStore for PgStore<P> {
    fn insert_comment(&self, comment: &NewComment, now: DateTime<Utc>) -> StoreResult<Comment> {
        Ok(self.write(|tx| {
                   let known: bool =
                       diesel::select(diesel::dsl::exists(evaluations::table.find(comment.evaluation_id))).get_result(tx)?;
                   if !known {
                       return Err(PersistenceError::NotFound);
                   }
                   Ok(diesel::insert_into(comments::table).values(NewCommentRow::new(comment, now))
                                                          .returning(CommentRow::as_returning())
                                                          .get_result::<CommentRow>(tx)?
                                                          .into())
               })?)
    }

    fn find_comment(&self, id: CommentId) -> StoreResult<Option<Comment>> {
        Ok(self.read(|conn| {
                   Ok(comments::table.find(id)
                                     .select(CommentRow::as_select())
                                     .first::<CommentRow>(conn)
                                     .optional()?
                                     .map(Comment::from))
               })?)
    }

    fn update_comment(&self, comment: &Comment) -> StoreResult<Comment> {
        Ok(self.write(|tx| {
                   Ok(diesel::update(comments::table.find(comment.id)).set(CommentChanges::from(comment))
                                                                      .returning(CommentRow::as_returning())
                                                                      .get_result::<CommentRow>(tx)?
                                                                      .into())
               })?)
    }

    fn list_comments(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<Comment>> {
        Ok(self.read(|conn| {
                   Ok(comments::table.filter(comments::evaluation_id.eq(evaluation_id))
                                     .order((comments::created_at.asc(), comments::id.asc()))
                                     .select(CommentRow::as_select())
                                     .load::<CommentRow>(conn)?
                                     .into_iter()
                                     .map(Comment::from)
                                     .collect())
               })?)
    }
}

/// Filtro de `mentions` para un ámbito de reemplazo.
fn scope_filter(scope: MentionScope) -> Box<dyn BoxableExpression<mentions::table, diesel::pg::Pg,
                                                                   SqlType = diesel::sql_types::Bool>> {
    match scope {
        MentionScope::Comment(id) => Box::new(mentions::comment_id.eq(id).assume_not_null()),
        MentionScope::EvaluationDescription(id) => {
            Box::new(mentions::mention_type.eq(MentionType::EvaluationDescription.as_str())
                                           .and(mentions::evaluation_id.eq(id).assume_not_null()))
        }
    }
}

impl<P: ConnectionProvider> MentionStore for PgStore<P> {
    fn replace_mentions(&self, scope: MentionScope, new_mentions: &[NewMention], now: DateTime<Utc>)
                        -> StoreResult<Vec<Mention>> {
        Ok(self.write(|tx| {
                   diesel::delete(mentions::table.filter(scope_filter(scope))).execute(tx)?;
                   if new_mentions.is_empty() {
                       return Ok(Vec::new());
                   }
                   let rows: Vec<NewMentionRow> = new_mentions.iter().map(|m| NewMentionRow::new(m, now)).collect();
                   diesel::insert_into(mentions::table).values(&rows)
                                                       .returning(MentionRow::as_returning())
                                                       .get_results::<MentionRow>(tx)?
                                                       .into_iter()
                                                       .map(MentionRow::into_domain)
                                                       .collect()
               })?)
    }

    fn mentions_in(&self, scope: MentionScope) -> StoreResult<Vec<Mention>> {
        Ok(self.read(|conn| {
                   mentions::table.filter(scope_filter(scope))
                                  .order(mentions::id.asc())
                                  .select(MentionRow::as_select())
                                  .load::<MentionRow>(conn)?
                                  .into_iter()
                                  .map(MentionRow::into_domain)
                                  .collect()
               })?)
    }

    fn mentions_for_user(&self, user_id: UserId, status: Option<MentionStatus>) -> StoreResult<Vec<Mention>> {
        Ok(self.read(|conn| {
                   let mut query = mentions::table.filter(mentions::mentioned_user_id.eq(user_id))
                                                  .select(MentionRow::as_select())
                                                  .into_boxed();
                   if let Some(s) = status {
                       query = query.filter(mentions::status.eq(s.as_str()));
                   }
                   query.order((mentions::created_at.desc(), mentions::id.desc()))
                        .load::<MentionRow>(conn)?
                        .into_iter()
                        .map(MentionRow::into_domain)
                        .collect()
               })?)
    }

    fn find_mention(&self, id: MentionId) -> StoreResult<Option<Mention>> {
        Ok(self.read(|conn| {
                   mentions::table.find(id)
                                  .select(MentionRow::as_select())
                                  .first::<MentionRow>(conn)
                                  .optional()?
                                  .map(MentionRow::into_domain)
                                  .transpose()
               })?)
    }

    fn update_mention(&self, mention: &Mention) -> StoreResult<Mention> {
        let changes = MentionChanges { status: mention.status.as_str(),
                                       read_at: mention.read_at,
                                       acknowledged_at: mention.acknowledged_at };
        Ok(self.write(|tx| {
                   diesel::update(mentions::table.find(mention.id)).set(&changes)
                                                                   .returning(MentionRow::as_returning())
                                                                   .get_result::<MentionRow>(tx)?
                                                                   .into_domain()
               })?)
    }
}

impl<P: ConnectionProvider> MessageStore for PgStore<P> {
    fn deliver(&self, message: &NewMessage, now: DateTime<Utc>) -> StoreResult<Message> {
        Ok(self.write(|tx| {
                   diesel::insert_into(messages::table).values(NewMessageRow::new(message, now))
                                                       .returning(MessageRow::as_returning())
                                                       .get_result::<MessageRow>(tx)?
                                                       .into_domain()
               })?)
    }

    fn inbox(&self, recipient_id: UserId, unread_only: bool) -> StoreResult<Vec<Message>> {
        Ok(self.read(|conn| {
                   let mut query = messages::table.filter(messages::recipient_id.eq(recipient_id))
                                                  .select(MessageRow::as_select())
                                                  .into_boxed();
                   if unread_only {
                       query = query.filter(messages::is_read.eq(false));
                   }
                   query.order((messages::created_at.desc(), messages::id.desc()))
                        .load::<MessageRow>(conn)?
                        .into_iter()
                        .map(MessageRow::into_domain)
                        .collect()
               })?)
    }

    fn find_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.read(|conn| {
                   messages::table.find(id)
                                  .select(MessageRow::as_select())
                                  .first::<MessageRow>(conn)
                                  .optional()?
                                  .map(MessageRow::into_domain)
                                  .transpose()
               })?)
    }

    fn set_read(&self, id: MessageId, read_at: Option<DateTime<Utc>>) -> StoreResult<Message> {
        Ok(self.write(|tx| {
                   diesel::update(messages::table.find(id)).set((messages::is_read.eq(read_at.is_some()),
                                                                 messages::read_at.eq(read_at)))
                                                           .returning(MessageRow::as_returning())
                                                           .get_result::<MessageRow>(tx)?
                                                           .into_domain()
               })?)
    }

    fn unread_count(&self, recipient_id: UserId) -> StoreResult<i64> {
        Ok(self.read(|conn| {
                   Ok(messages::table.filter(messages::recipient_id.eq(recipient_id).and(messages::is_read.eq(false)))
                                     .count()
                                     .get_result::<i64>(conn)?)
               })?)
    }
}
