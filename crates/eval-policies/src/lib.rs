//! eval-policies – Reglas de transición y edición del workflow
//!
//! Provee el contrato `TransitionPolicy` y la tabla estándar de transiciones
//! (dos etapas de aprobación: Part Leader → Group Leader). La política es
//! pura: recibe estado, tipo, actor y propiedad, y devuelve una decisión
//! tipada que el motor traduce a errores (`INVALID_TRANSITION`, `TERMINAL`,
//! `FORBIDDEN`).

use eval_domain::{EvaluationStatus as S, EvaluationType, Principal, Role};
use serde::{Deserialize, Serialize};

/// Quién puede ejecutar una transición.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", content = "role", rename_all = "snake_case")]
pub enum Gate {
    /// El evaluador dueño (o un admin).
    Owner,
    /// El dueño o cualquier rol ≥ part_leader.
    OwnerOrAbove,
    /// Rol mínimo requerido.
    AtLeast(Role),
}

impl Gate {
    pub fn admits(&self, actor: &Principal, is_owner: bool) -> bool {
        match self {
            Gate::Owner => is_owner || actor.is_admin(),
            Gate::OwnerOrAbove => is_owner || actor.has_permission(Role::PartLeader),
            Gate::AtLeast(role) => actor.has_permission(*role),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Gate::Owner => "owner".into(),
            Gate::OwnerOrAbove => "owner+".into(),
            Gate::AtLeast(role) => format!("{role}+"),
        }
    }
}

/// Celda de la tabla de transiciones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: S,
    pub to: S,
    pub gate: Gate,
    /// Restricción por tipo de evaluación (None = cualquiera).
    pub only_for: Option<EvaluationType>,
}

/// Solicitud evaluada por la política.
#[derive(Clone, Debug)]
pub struct TransitionRequest<'a> {
    pub from: S,
    pub to: S,
    pub evaluation_type: EvaluationType,
    pub actor: &'a Principal,
    pub is_owner: bool,
}

/// Decisión tipada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionDecision {
    Allowed(TransitionRule),
    /// El estado origen es terminal.
    Terminal,
    /// No existe celda (o el tipo no la habilita).
    NotInTable,
    /// Existe la celda pero el actor no pasa la compuerta.
    Forbidden(Gate),
}

/// Contrato de políticas de transición.
pub trait TransitionPolicy: Send + Sync {
    fn id(&self) -> &'static str;
    /// Celda aplicable para `(from, to, tipo)`.
    fn rule(&self, from: S, to: S, evaluation_type: EvaluationType) -> Option<TransitionRule>;
    /// Destinos alcanzables desde `from` (ignora actor).
    fn targets(&self, from: S, evaluation_type: EvaluationType) -> Vec<S>;

    fn decide(&self, req: &TransitionRequest<'_>) -> TransitionDecision {
        if req.from.is_terminal() {
            return TransitionDecision::Terminal;
        }
        match self.rule(req.from, req.to, req.evaluation_type) {
            None => TransitionDecision::NotInTable,
            Some(rule) if rule.gate.admits(req.actor, req.is_owner) => TransitionDecision::Allowed(rule),
            Some(rule) => TransitionDecision::Forbidden(rule.gate),
        }
    }
}

const fn cell(from: S, to: S, gate: Gate, only_for: Option<EvaluationType>) -> TransitionRule {
    TransitionRule { from, to, gate, only_for }
}

const NP: Option<EvaluationType> = Some(EvaluationType::NewProduct);
const MP: Option<EvaluationType> = Some(EvaluationType::MassProduction);

/// Tabla estándar de dos etapas.
pub const STANDARD_RULES: &[TransitionRule] = &[
    cell(S::Draft, S::InProgress, Gate::Owner, None),
    cell(S::Draft, S::PendingPartApproval, Gate::Owner, NP),
    cell(S::Draft, S::Completed, Gate::Owner, MP),
    cell(S::InProgress, S::PendingPartApproval, Gate::Owner, NP),
    cell(S::InProgress, S::Completed, Gate::Owner, MP),
    cell(S::InProgress, S::Paused, Gate::OwnerOrAbove, None),
    cell(S::InProgress, S::Cancelled, Gate::AtLeast(Role::PartLeader), None),
    cell(S::PendingPartApproval, S::PendingGroupApproval, Gate::AtLeast(Role::PartLeader), None),
    cell(S::PendingPartApproval, S::Rejected, Gate::AtLeast(Role::PartLeader), None),
    cell(S::PendingGroupApproval, S::PendingPartApproval, Gate::AtLeast(Role::GroupLeader), None),
    cell(S::PendingGroupApproval, S::Completed, Gate::AtLeast(Role::GroupLeader), None),
    cell(S::PendingGroupApproval, S::Rejected, Gate::AtLeast(Role::GroupLeader), None),
    cell(S::Paused, S::InProgress, Gate::OwnerOrAbove, None),
    cell(S::Paused, S::Cancelled, Gate::AtLeast(Role::PartLeader), None),
    cell(S::Rejected, S::InProgress, Gate::OwnerOrAbove, None),
];

/// Política: tabla estándar de dos etapas.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardTransitionPolicy;

impl StandardTransitionPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl TransitionPolicy for StandardTransitionPolicy {
    fn id(&self) -> &'static str {
        "two_stage_v1"
    }

    fn rule(&self, from: S, to: S, evaluation_type: EvaluationType) -> Option<TransitionRule> {
        STANDARD_RULES.iter()
                      .find(|r| r.from == from && r.to == to && r.only_for.map_or(true, |t| t == evaluation_type))
                      .copied()
    }

    fn targets(&self, from: S, evaluation_type: EvaluationType) -> Vec<S> {
        STANDARD_RULES.iter()
                      .filter(|r| r.from == from && r.only_for.map_or(true, |t| t == evaluation_type))
                      .map(|r| r.to)
                      .collect()
    }
}

/// Resultado de la política de edición.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditDecision {
    Allowed,
    Terminal,
    Forbidden,
}

/// Edición de la raíz:
/// - terminal: nadie;
/// - admin: cualquier otro estado;
/// - dueño: fuera de `pending_*`, o dentro si además es ≥ part_leader.
pub fn edit_decision(status: S, actor: &Principal, is_owner: bool) -> EditDecision {
    if status.is_terminal() {
        return EditDecision::Terminal;
    }
    if actor.is_admin() {
        return EditDecision::Allowed;
    }
    if !is_owner {
        return EditDecision::Forbidden;
    }
    if status.is_pending() && !actor.has_permission(Role::PartLeader) {
        return EditDecision::Forbidden;
    }
    EditDecision::Allowed
}

/// Borrado: admin (salvo completadas) o el dueño mientras está en borrador.
pub fn can_delete(status: S, actor: &Principal, is_owner: bool) -> bool {
    if actor.is_admin() {
        return status != S::Completed;
    }
    is_owner && status == S::Draft
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who(id: i64, role: Role) -> Principal {
        Principal { id, username: format!("u{id}"), role, is_active: true }
    }

    #[test]
    fn table_covers_expected_cells() {
        let p = StandardTransitionPolicy::new();
        assert_eq!(STANDARD_RULES.len(), 15);
        assert_eq!(p.targets(S::Draft, EvaluationType::NewProduct), vec![S::InProgress, S::PendingPartApproval]);
        assert_eq!(p.targets(S::InProgress, EvaluationType::MassProduction),
                   vec![S::Completed, S::Paused, S::Cancelled]);
        assert!(p.targets(S::Completed, EvaluationType::NewProduct).is_empty());
    }

    #[test]
    fn terminal_precedes_table_lookup() {
        let p = StandardTransitionPolicy::new();
        let admin = who(1, Role::Admin);
        let req = TransitionRequest { from: S::Cancelled,
                                      to: S::InProgress,
                                      evaluation_type: EvaluationType::NewProduct,
                                      actor: &admin,
                                      is_owner: true };
        assert_eq!(p.decide(&req), TransitionDecision::Terminal);
    }

    #[test]
    fn superior_roles_pass_lesser_gates() {
        let p = StandardTransitionPolicy::new();
        for role in [Role::PartLeader, Role::GroupLeader, Role::Admin] {
            let actor = who(9, role);
            let req = TransitionRequest { from: S::PendingPartApproval,
                                          to: S::PendingGroupApproval,
                                          evaluation_type: EvaluationType::NewProduct,
                                          actor: &actor,
                                          is_owner: false };
            assert!(matches!(p.decide(&req), TransitionDecision::Allowed(_)), "{role} should approve part stage");
        }
        let plain = who(9, Role::User);
        let req = TransitionRequest { from: S::PendingPartApproval,
                                      to: S::PendingGroupApproval,
                                      evaluation_type: EvaluationType::NewProduct,
                                      actor: &plain,
                                      is_owner: true };
        assert_eq!(p.decide(&req), TransitionDecision::Forbidden(Gate::AtLeast(Role::PartLeader)));
    }

    #[test]
    fn type_restricted_cells() {
        let p = StandardTransitionPolicy::new();
        let owner = who(3, Role::User);
        let mut req = TransitionRequest { from: S::InProgress,
                                          to: S::Completed,
                                          evaluation_type: EvaluationType::NewProduct,
                                          actor: &owner,
                                          is_owner: true };
        assert_eq!(p.decide(&req), TransitionDecision::NotInTable);
        req.evaluation_type = EvaluationType::MassProduction;
        assert!(matches!(p.decide(&req), TransitionDecision::Allowed(_)));
    }

    #[test]
    fn owner_gate_admits_admin_but_not_leaders() {
        let leader = who(5, Role::GroupLeader);
        let admin = who(6, Role::Admin);
        assert!(!Gate::Owner.admits(&leader, false));
        assert!(Gate::Owner.admits(&admin, false));
        assert!(Gate::OwnerOrAbove.admits(&leader, false));
    }

    #[test]
    fn edit_rules() {
        let owner = who(1, Role::User);
        let owner_leader = who(1, Role::PartLeader);
        let admin = who(2, Role::Admin);
        assert_eq!(edit_decision(S::InProgress, &owner, true), EditDecision::Allowed);
        assert_eq!(edit_decision(S::PendingPartApproval, &owner, true), EditDecision::Forbidden);
        assert_eq!(edit_decision(S::PendingPartApproval, &owner_leader, true), EditDecision::Allowed);
        assert_eq!(edit_decision(S::Completed, &admin, false), EditDecision::Terminal);
        assert_eq!(edit_decision(S::Rejected, &admin, false), EditDecision::Allowed);
        assert_eq!(edit_decision(S::Draft, &who(4, Role::GroupLeader), false), EditDecision::Forbidden);
        assert!(can_delete(S::Draft, &owner, true));
        assert!(!can_delete(S::InProgress, &owner, true));
        assert!(!can_delete(S::Completed, &admin, false));
    }
}
