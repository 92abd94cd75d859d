//! Estados del workflow y tipos de evaluación.

string_tag! {
    /// Estado persistido de una Evaluation. Los strings en minúsculas son la
    /// forma canónica.
    pub enum EvaluationStatus : "status" {
        Draft => "draft",
        InProgress => "in_progress",
        PendingPartApproval => "pending_part_approval",
        PendingGroupApproval => "pending_group_approval",
        Completed => "completed",
        Paused => "paused",
        Cancelled => "cancelled",
        Rejected => "rejected",
    }
}

string_tag! {
    pub enum EvaluationType : "evaluation_type" {
        NewProduct => "new_product",
        MassProduction => "mass_production",
    }
}

/// Nivel de aprobación pendiente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStage {
    Part,
    Group,
}

impl EvaluationStatus {
    /// `completed` y `cancelled` no admiten más transiciones.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Cancelled)
    }

    pub fn is_pending(&self) -> bool {
        self.approval_stage().is_some()
    }

    pub fn approval_stage(&self) -> Option<ApprovalStage> {
        match self {
            EvaluationStatus::PendingPartApproval => Some(ApprovalStage::Part),
            EvaluationStatus::PendingGroupApproval => Some(ApprovalStage::Group),
            _ => None,
        }
    }

    /// Etiqueta legible ("In Progress") para títulos de mensajes.
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|w| {
                let mut cs = w.chars();
                match cs.next() {
                    Some(c) => c.to_uppercase().chain(cs).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl EvaluationType {
    /// Sólo new_product pasa por la aprobación de dos etapas.
    pub fn requires_approval(&self) -> bool {
        matches!(self, EvaluationType::NewProduct)
    }
}

impl ApprovalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStage::Part => "part",
            ApprovalStage::Group => "group",
        }
    }
}
