use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::UserId;

string_tag! {
    pub enum OperationType : "operation_type" {
        Login => "login",
        Logout => "logout",
        Create => "create",
        Update => "update",
        Delete => "delete",
        Approve => "approve",
        Reject => "reject",
        Export => "export",
        View => "view",
    }
}

/// Entrada del registro de auditoría (timestamps en UTC).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLog {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub operation_type: OperationType,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub target_description: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub ip_address: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperationLog {
    pub user_id: Option<UserId>,
    pub operation_type: OperationType,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub target_description: Option<String>,
    pub old_data: Option<Value>,
    pub new_data: Option<Value>,
    pub ip_address: Option<String>,
    pub request_method: Option<String>,
    pub request_path: Option<String>,
    pub status_code: Option<i32>,
    pub success: bool,
    pub error_message: Option<String>,
}
