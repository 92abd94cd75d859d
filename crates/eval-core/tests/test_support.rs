#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use eval_core::store::{Stores, UserDirectory};
use eval_core::{FixedClock, InMemoryStore, RequestContext, Services};
use eval_domain::{Evaluation, NewEvaluation, NewUser, Role, User};

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<FixedClock>,
    pub svc: Services,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()));
        let svc = Services::standard(Stores::from_backend(store.clone()), clock.clone());
        Self { store, clock, svc }
    }

    pub fn user(&self, username: &str, role: Role) -> User {
        self.store
            .insert_user(&NewUser { username: username.into(),
                                    email: format!("{username}@example.com"),
                                    full_name: username.to_uppercase(),
                                    password_hash: String::new(),
                                    role,
                                    department: None,
                                    position: None },
                         Utc::now())
            .unwrap()
    }

    pub fn ctx(&self, user: &User) -> RequestContext {
        RequestContext::for_principal(user.principal()).with_ip("10.0.0.1")
    }

    pub fn draft(&self, owner: &User, evaluation_type: &str) -> Evaluation {
        let cmd = NewEvaluation { evaluation_type: evaluation_type.into(),
                                  product_name: "A".into(),
                                  part_number: "P-1".into(),
                                  start_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 15),
                                  ..Default::default() };
        self.svc.evaluations.create(&self.ctx(owner), &cmd).unwrap()
    }
}
