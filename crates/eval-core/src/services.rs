//! Cableado de los servicios del núcleo sobre un conjunto de stores.

use std::sync::Arc;

use eval_policies::{StandardTransitionPolicy, TransitionPolicy};

use crate::aggregate::{EvaluationNumberGenerator, EvaluationService};
use crate::audit::AuditTrail;
use crate::clock::Clock;
use crate::comments::CommentService;
use crate::fail_code::FailCodeDictionary;
use crate::notify::Notifier;
use crate::store::Stores;
use crate::workflow::WorkflowEngine;

#[derive(Clone)]
pub struct Services {
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub audit: AuditTrail,
    pub notifier: Notifier,
    pub fail_codes: FailCodeDictionary,
    pub workflow: WorkflowEngine,
    pub evaluations: EvaluationService,
    pub comments: CommentService,
}

impl Services {
    pub fn wire(stores: Stores, clock: Arc<dyn Clock>, numbers: EvaluationNumberGenerator,
                policy: Arc<dyn TransitionPolicy>)
                -> Self {
        let audit = AuditTrail::new(stores.audit.clone(), clock.clone());
        let notifier = Notifier::new(stores.messages.clone(), stores.users.clone(), clock.clone());
        let fail_codes = FailCodeDictionary::new(stores.fail_codes.clone(), clock.clone());
        let workflow = WorkflowEngine::new(&stores, policy, notifier.clone(), audit.clone(), clock.clone());
        let evaluations = EvaluationService::new(&stores,
                                                 numbers,
                                                 fail_codes.clone(),
                                                 workflow.clone(),
                                                 notifier.clone(),
                                                 audit.clone(),
                                                 clock.clone());
        let comments = CommentService::new(&stores, notifier.clone(), audit.clone(), clock.clone());
        Self { stores, clock, audit, notifier, fail_codes, workflow, evaluations, comments }
    }

    /// Prefijo `EVAL` y tabla estándar de dos etapas.
    pub fn standard(stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self::wire(stores,
                   clock,
                   EvaluationNumberGenerator::default(),
                   Arc::new(StandardTransitionPolicy::new()))
    }
}
