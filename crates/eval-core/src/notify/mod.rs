//! Notification Fan-out (C5) e inbox de mensajes.
//!
//! La entrega es best-effort: una falla del sink se loguea y se cuenta en
//! el `FanoutReport`; nunca aborta la operación que la originó.

pub mod fanout;

use std::sync::Arc;

use eval_domain::{Evaluation, EvaluationStatus, Message, MessageId, NewMessage, Principal, Priority, MessageType, Role,
                  UserId};
use indexmap::IndexSet;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::WorkflowError;
use crate::identity::check_permission;
use crate::store::{MessageStore, UserDirectory};
use fanout::Audience;

/// Resultado de una entrega múltiple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutReport {
    pub recipients: Vec<UserId>,
    pub delivered: usize,
    pub failed: usize,
}

impl FanoutReport {
    fn merge(&mut self, recipient: UserId, ok: bool) {
        self.recipients.push(recipient);
        if ok {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Clone)]
pub struct Notifier {
    messages: Arc<dyn MessageStore>,
    users: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    pub fn new(messages: Arc<dyn MessageStore>, users: Arc<dyn UserDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { messages, users, clock }
    }

    /// Entrega un mensaje; `false` si el sink falló.
    pub fn deliver(&self, message: &NewMessage) -> bool {
        match self.messages.deliver(message, self.clock.now()) {
            Ok(row) => {
                debug!("message_delivered id={} type={} recipient={}", row.id, row.message_type, row.recipient_id);
                true
            }
            Err(e) => {
                warn!("message_delivery_failed type={} recipient={} error={}",
                      message.message_type, message.recipient_id, e);
                false
            }
        }
    }

    /// Notifica una transición ya persistida (`evaluation.status` es el destino).
    pub fn transition(&self, evaluation: &Evaluation, from: EvaluationStatus, actor: &Principal,
                      comment: Option<&str>)
                      -> FanoutReport {
        let mut report = FanoutReport::default();
        match fanout::audience(evaluation, evaluation.status, actor.id) {
            Audience::Approvers(role) => {
                let approvers = match self.users.active_with_role(role) {
                    Ok(users) => users,
                    Err(e) => {
                        warn!("approver_lookup_failed role={} error={}", role, e);
                        report.failed += 1;
                        return report;
                    }
                };
                for user in approvers {
                    let msg = fanout::approval_request(evaluation, &actor.username, user.id, actor.id);
                    report.merge(user.id, self.deliver(&msg));
                }
            }
            Audience::Participants(ids) => {
                for id in ids {
                    let msg = fanout::status_update(evaluation, from, &actor.username, comment, id, actor.id);
                    report.merge(id, self.deliver(&msg));
                }
            }
        }
        report
    }

    /// Aviso de mención; las auto-menciones se descartan.
    pub fn mention(&self, evaluation_number: &str, evaluation_id: Option<i64>, mentioner: &Principal,
                   recipient_id: UserId, context: &str)
                   -> bool {
        if recipient_id == mentioner.id {
            return false;
        }
        let msg = fanout::mention_notice(evaluation_number, evaluation_id, &mentioner.username, context, recipient_id,
                                         mentioner.id);
        self.deliver(&msg)
    }

    /// Anuncio del sistema (sólo admin). Destinatarios deduplicados.
    pub fn announce(&self, actor: &Principal, title: &str, content: &str, recipients: &[UserId], priority: Priority)
                    -> Result<FanoutReport, WorkflowError> {
        check_permission(actor, Role::Admin)?;
        if title.trim().is_empty() {
            return Err(WorkflowError::validation("title", "is required"));
        }
        let unique: IndexSet<UserId> = recipients.iter().copied().collect();
        let mut report = FanoutReport::default();
        for id in unique {
            let msg = NewMessage { title: title.trim().to_string(),
                                   content: content.to_string(),
                                   message_type: MessageType::SystemAnnouncement,
                                   priority,
                                   recipient_id: id,
                                   sender_id: Some(actor.id),
                                   evaluation_id: None };
            report.merge(id, self.deliver(&msg));
        }
        Ok(report)
    }

    pub fn inbox(&self, principal: &Principal, unread_only: bool) -> Result<Vec<Message>, WorkflowError> {
        Ok(self.messages.inbox(principal.id, unread_only)?)
    }

    pub fn unread_count(&self, principal: &Principal) -> Result<i64, WorkflowError> {
        Ok(self.messages.unread_count(principal.id)?)
    }

    pub fn mark_read(&self, principal: &Principal, id: MessageId) -> Result<Message, WorkflowError> {
        self.owned(principal, id)?;
        Ok(self.messages.set_read(id, Some(self.clock.now()))?)
    }

    pub fn mark_unread(&self, principal: &Principal, id: MessageId) -> Result<Message, WorkflowError> {
        self.owned(principal, id)?;
        Ok(self.messages.set_read(id, None)?)
    }

    // mensajes ajenos se reportan como inexistentes
    fn owned(&self, principal: &Principal, id: MessageId) -> Result<Message, WorkflowError> {
        match self.messages.find_message(id)? {
            Some(m) if m.recipient_id == principal.id => Ok(m),
            _ => Err(WorkflowError::not_found("message", id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::memory::InMemoryStore;

    fn who(id: i64, role: Role) -> Principal {
        Principal { id, username: format!("u{id}"), role, is_active: true }
    }

    #[test]
    fn inbox_read_cycle_is_scoped_to_recipient() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Notifier::new(store.clone(), store.clone(), Arc::new(SystemClock));
        let admin = who(1, Role::Admin);
        let report = notifier.announce(&admin, "Maintenance", "tonight", &[2, 2, 3], Priority::Low).unwrap();
        assert_eq!(report.delivered, 2);

        let bob = who(2, Role::User);
        let inbox = notifier.inbox(&bob, true).unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(notifier.mark_read(&who(3, Role::User), inbox[0].id).is_err());
        notifier.mark_read(&bob, inbox[0].id).unwrap();
        assert_eq!(notifier.unread_count(&bob).unwrap(), 0);
        notifier.mark_unread(&bob, inbox[0].id).unwrap();
        assert_eq!(notifier.unread_count(&bob).unwrap(), 1);

        assert!(notifier.announce(&bob, "x", "y", &[3], Priority::Low).is_err());
    }

    #[test]
    fn sink_failure_is_counted_not_raised() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Notifier::new(store.clone(), store.clone(), Arc::new(SystemClock));
        store.set_message_failure(true);
        let report = notifier.announce(&who(1, Role::Admin), "t", "c", &[2, 3], Priority::Normal).unwrap();
        assert_eq!((report.delivered, report.failed), (0, 2));
        assert!(!notifier.mention("EVAL-20250115-0001", None, &who(4, Role::User), 4, "self"));
    }
}
