use std::collections::HashMap;

use chrono::{DateTime, Utc};
use eval_domain::{EvaluationId, UserId};

use super::{EvaluationEvent, EvaluationEventKind};
use crate::store::StoreResult;

/// Almacenamiento de eventos append-only.
pub trait EventStore: Send + Sync {
    /// Agrega un evento a partir de su kind y devuelve el evento completo (con seq).
    fn append_kind(&self, evaluation_id: EvaluationId, actor_id: Option<UserId>, kind: EvaluationEventKind,
                   ts: DateTime<Utc>)
                   -> StoreResult<EvaluationEvent>;
    /// Lista eventos de una evaluación (orden ascendente por seq).
    fn list_events(&self, evaluation_id: EvaluationId) -> StoreResult<Vec<EvaluationEvent>>;
}

/// Log en memoria sin sincronización propia; el dueño decide el lock.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    next_seq: i64,
    inner: HashMap<EvaluationId, Vec<EvaluationEvent>>,
}

impl EventLog {
    pub fn append(&mut self, evaluation_id: EvaluationId, actor_id: Option<UserId>, kind: EvaluationEventKind,
                  ts: DateTime<Utc>)
                  -> EvaluationEvent {
        self.next_seq += 1;
        let ev = EvaluationEvent { seq: self.next_seq, evaluation_id, actor_id, kind, ts };
        self.inner.entry(evaluation_id).or_default().push(ev.clone());
        ev
    }

    pub fn list(&self, evaluation_id: EvaluationId) -> Vec<EvaluationEvent> {
        self.inner.get(&evaluation_id).cloned().unwrap_or_default()
    }

    /// Borra el historial (cascade del borrado de la raíz).
    pub fn purge(&mut self, evaluation_id: EvaluationId) {
        self.inner.remove(&evaluation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_domain::EvaluationStatus;

    #[test]
    fn seq_is_global_and_ascending() {
        let mut log = EventLog::default();
        let now = Utc::now();
        let kind = EvaluationEventKind::Created { evaluation_number: "EVAL-20250115-0001".into(),
                                                  status: EvaluationStatus::Draft };
        let a = log.append(1, Some(7), kind.clone(), now);
        let b = log.append(2, Some(7), kind.clone(), now);
        let c = log.append(1, None, EvaluationEventKind::Updated { changed: vec!["remarks".into()] }, now);
        assert!(a.seq < b.seq && b.seq < c.seq);
        let listed = log.list(1);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].kind.name(), "updated");
        log.purge(1);
        assert!(log.list(1).is_empty());
    }
}
