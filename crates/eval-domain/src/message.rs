use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EvaluationId, MessageId, UserId};

string_tag! {
    pub enum MessageType : "message_type" {
        ApprovalRequest => "approval_request",
        StatusChange => "status_change",
        Mention => "mention",
        SystemAnnouncement => "system_announcement",
        EvaluationAssigned => "evaluation_assigned",
        EvaluationCompleted => "evaluation_completed",
    }
}

string_tag! {
    pub enum Priority : "priority" {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

/// Notificación in-app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub title: String,
    pub content: String,
    pub message_type: MessageType,
    pub priority: Priority,
    pub recipient_id: UserId,
    pub sender_id: Option<UserId>,
    pub evaluation_id: Option<EvaluationId>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub title: String,
    pub content: String,
    pub message_type: MessageType,
    pub priority: Priority,
    pub recipient_id: UserId,
    pub sender_id: Option<UserId>,
    pub evaluation_id: Option<EvaluationId>,
}
