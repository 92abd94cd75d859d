use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CommentId, EvaluationId, MentionId, MessageId, UserId};

string_tag! {
    pub enum MentionType : "mention_type" {
        EvaluationComment => "evaluation_comment",
        EvaluationDescription => "evaluation_description",
        Message => "message",
        TaskAssignment => "task_assignment",
    }
}

string_tag! {
    pub enum MentionStatus : "mention_status" {
        Unread => "unread",
        Read => "read",
        Acknowledged => "acknowledged",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: MentionId,
    pub mention_type: MentionType,
    pub mentioned_user_id: UserId,
    pub mentioner_id: UserId,
    pub evaluation_id: Option<EvaluationId>,
    pub comment_id: Option<CommentId>,
    pub message_id: Option<MessageId>,
    pub context_text: String,
    pub mention_position: i32,
    pub status: MentionStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMention {
    pub mention_type: MentionType,
    pub mentioned_user_id: UserId,
    pub mentioner_id: UserId,
    pub evaluation_id: Option<EvaluationId>,
    pub comment_id: Option<CommentId>,
    pub message_id: Option<MessageId>,
    pub context_text: String,
    pub mention_position: i32,
}

impl Mention {
    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        if self.status == MentionStatus::Unread {
            self.status = MentionStatus::Read;
            self.read_at = Some(now);
        }
    }

    pub fn acknowledge(&mut self, now: DateTime<Utc>) {
        if self.read_at.is_none() {
            self.read_at = Some(now);
        }
        self.status = MentionStatus::Acknowledged;
        self.acknowledged_at = Some(now);
    }
}
