//! Workflow Engine (C4).
//!
//! - `engine`: transiciones con compuertas por rol, estampado de
//!   aprobadores y control de versión optimista.
//! - `queries`: aprobaciones pendientes, estadísticas e historial.

pub mod engine;
pub mod queries;

pub use engine::{BulkItem, BulkReport, WorkflowEngine};
pub use queries::{PendingApproval, StatusChange, WorkflowStatistics};

use eval_domain::{EvaluationStatus, OperationType};

/// Tipo de operación auditada para una transición hacia `to`.
pub fn operation_for(from: Option<EvaluationStatus>, to: EvaluationStatus) -> OperationType {
    match (from, to) {
        (_, EvaluationStatus::Rejected) => OperationType::Reject,
        (Some(EvaluationStatus::PendingPartApproval), EvaluationStatus::PendingGroupApproval)
        | (Some(EvaluationStatus::PendingGroupApproval), EvaluationStatus::Completed) => OperationType::Approve,
        _ => OperationType::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approvals_and_rejections_have_their_own_type() {
        use EvaluationStatus::*;
        assert_eq!(operation_for(Some(PendingPartApproval), PendingGroupApproval), OperationType::Approve);
        assert_eq!(operation_for(Some(PendingGroupApproval), Completed), OperationType::Approve);
        assert_eq!(operation_for(Some(InProgress), Completed), OperationType::Update);
        assert_eq!(operation_for(None, Rejected), OperationType::Reject);
    }
}
