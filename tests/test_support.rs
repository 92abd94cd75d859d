#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use eval_core::identity::RegisterUser;
use eval_core::{FixedClock, InMemoryStore, RequestContext};
use eval_domain::{Evaluation, EvaluationStatus, NewEvaluation, Role, User};
use evalflow::{App, AppConfig, Gateway};

pub const PASSWORD: &str = "secret-pass";

pub fn config(timeout_ms: u64) -> AppConfig {
    let timeout = timeout_ms.to_string();
    let vars: HashMap<String, String> = [("JWT_SECRET", "test-access"),
                                         ("REFRESH_SECRET", "test-refresh"),
                                         ("PASSWORD_ITERATIONS", "1000"),
                                         ("REQUEST_TIMEOUT_MS", timeout.as_str())]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    AppConfig::from_map(&vars).expect("test config")
}

/// App en memoria con reloj fijo en 2025-01-15 09:00 UTC.
pub struct World {
    pub app: Arc<App>,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub gw: Gateway,
}

impl World {
    pub fn new() -> Self {
        Self::with_timeout(2_000)
    }

    pub fn with_timeout(timeout_ms: u64) -> Self {
        let cfg = config(timeout_ms);
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()));
        let (app, store) = App::in_memory(&cfg, clock.clone()).expect("in-memory app");
        let app = Arc::new(app);
        let gw = Gateway::new(app.clone(), cfg.request_timeout);
        Self { app, store, clock, gw }
    }

    pub fn user(&self, username: &str, role: Role) -> User {
        self.app
            .auth
            .provision(&RegisterUser { username: username.into(),
                                       email: format!("{username}@example.com"),
                                       full_name: username.to_uppercase(),
                                       password: PASSWORD.into(),
                                       role,
                                       department: None,
                                       position: None })
            .expect("provision user")
    }

    pub fn ctx(&self, user: &User) -> RequestContext {
        RequestContext::for_principal(user.principal()).with_ip("10.0.0.7")
    }

    pub fn create(&self, owner: &User, evaluation_type: &str, status: Option<&str>) -> Evaluation {
        let cmd = NewEvaluation { evaluation_type: evaluation_type.into(),
                                  product_name: "A".into(),
                                  part_number: "P-1".into(),
                                  start_date: NaiveDate::from_ymd_opt(2025, 1, 15),
                                  status: status.map(String::from),
                                  ..Default::default() };
        self.app.services.evaluations.create(&self.ctx(owner), &cmd).expect("create evaluation")
    }

    /// Borrador llevado hasta `pending_part_approval` por su dueño.
    pub fn awaiting_part(&self, owner: &User) -> Evaluation {
        let ev = self.create(owner, "new_product", None);
        let wf = &self.app.services.workflow;
        wf.transition(&self.ctx(owner), ev.id, EvaluationStatus::InProgress, None).expect("to in_progress");
        wf.transition(&self.ctx(owner), ev.id, EvaluationStatus::PendingPartApproval, None).expect("to pending_part")
    }
}
