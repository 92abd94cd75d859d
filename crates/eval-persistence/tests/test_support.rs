#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use eval_core::store::{Stores, UserDirectory};
use eval_core::{RequestContext, Services, SystemClock};
use eval_domain::{NewUser, Role, User};
use eval_persistence::config::DbConfig;
use eval_persistence::pg::{build_pool, PgPool, PgStore, PoolProvider};
use once_cell::sync::Lazy;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    if std::env::var("DATABASE_URL").is_err() && std::env::var("DB_URL").is_err() {
        return None;
    }
    let cfg = DbConfig::from_env().ok()?;
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("No se pudo construir pool de test: {e}");
            None
        }
    }
});

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    match TEST_POOL.as_ref() {
        Some(p) => Some(f(p)),
        None => {
            eprintln!("skip (no DATABASE_URL)");
            None
        }
    }
}

pub fn store(pool: &PgPool) -> Arc<PgStore<PoolProvider>> {
    Arc::new(PgStore::from_pool(pool.clone()))
}

pub fn services(store: Arc<PgStore<PoolProvider>>) -> Services {
    Services::standard(Stores::from_backend(store), Arc::new(SystemClock))
}

static SEQ: AtomicU32 = AtomicU32::new(0);

/// Nombre único por corrida (la base persiste entre ejecuciones).
pub fn unique(prefix: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{prefix}_{nanos}_{}", SEQ.fetch_add(1, Ordering::SeqCst))
}

pub fn user(store: &PgStore<PoolProvider>, prefix: &str, role: Role) -> User {
    let username = unique(prefix);
    store.insert_user(&NewUser { username: username.clone(),
                                 email: format!("{username}@example.com"),
                                 full_name: prefix.to_uppercase(),
                                 password_hash: String::new(),
                                 role,
                                 department: None,
                                 position: None },
                      Utc::now())
         .expect("insert user")
}

pub fn ctx(user: &User) -> RequestContext {
    RequestContext::for_principal(user.principal())
}
