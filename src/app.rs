//! Cableado de servicios: backend en memoria o Postgres, según configuración.

use std::sync::Arc;

use eval_core::aggregate::EvaluationNumberGenerator;
use eval_core::identity::{InMemoryDenylist, PasswordHasher, TokenDenylist, TokenIssuer};
use eval_core::store::Stores;
use eval_core::{AuthService, Clock, InMemoryStore, Services, SystemClock};
use eval_persistence::{build_pool, PgDenylist, PgStore, PoolProvider};
use eval_policies::StandardTransitionPolicy;
use log::info;

use crate::config::AppConfig;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Postgres,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Postgres => "postgres",
        }
    }
}

/// Servicios del núcleo más autenticación, listos para el gateway.
pub struct App {
    pub services: Services,
    pub auth: AuthService,
    pub denylist: Arc<dyn TokenDenylist>,
    pub backend: Backend,
}

impl App {
    /// Postgres si hay URL de base de datos; si no, memoria.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AppError> {
        match cfg.database.url.as_deref() {
            Some(url) => Self::postgres(cfg, url),
            None => Ok(Self::in_memory(cfg, Arc::new(SystemClock))?.0),
        }
    }

    /// Backend en memoria; devuelve también el store para inspección.
    pub fn in_memory(cfg: &AppConfig, clock: Arc<dyn Clock>) -> Result<(Self, Arc<InMemoryStore>), AppError> {
        let store = Arc::new(InMemoryStore::new());
        let denylist: Arc<dyn TokenDenylist> = Arc::new(InMemoryDenylist::new());
        let app = Self::wire(cfg, Stores::from_backend(store.clone()), denylist, clock, Backend::Memory)?;
        Ok((app, store))
    }

    pub fn postgres(cfg: &AppConfig, url: &str) -> Result<Self, AppError> {
        let pool = build_pool(url, cfg.database.min_connections, cfg.database.max_connections)?;
        let store = Arc::new(PgStore::new(PoolProvider { pool: pool.clone() }));
        let denylist: Arc<dyn TokenDenylist> = Arc::new(PgDenylist::new(PoolProvider { pool }));
        Self::wire(cfg, Stores::from_backend(store), denylist, Arc::new(SystemClock), Backend::Postgres)
    }

    fn wire(cfg: &AppConfig, stores: Stores, denylist: Arc<dyn TokenDenylist>, clock: Arc<dyn Clock>,
            backend: Backend)
            -> Result<Self, AppError> {
        let numbers = EvaluationNumberGenerator::new(&cfg.eval_prefix)?;
        let services = Services::wire(stores, clock.clone(), numbers, Arc::new(StandardTransitionPolicy::new()));
        let issuer = TokenIssuer::new(&cfg.auth.jwt_secret,
                                      &cfg.auth.refresh_secret,
                                      chrono_duration(cfg.auth.access_ttl),
                                      chrono_duration(cfg.auth.refresh_ttl));
        let auth = AuthService::new(services.stores.users.clone(),
                                    PasswordHasher::new(cfg.auth.password_iterations),
                                    issuer,
                                    denylist.clone(),
                                    clock,
                                    services.audit.clone());
        info!("app_wired backend={} prefix={} tz={}", backend.as_str(), cfg.eval_prefix, cfg.default_tz);
        Ok(Self { services, auth, denylist, backend })
    }

    /// Limpia la denylist de tokens ya expirados.
    pub fn purge_revoked(&self) -> Result<usize, AppError> {
        let now = self.services.clock.now();
        self.denylist
            .purge_expired(now)
            .map_err(|e| AppError::Workflow(e.into()))
    }
}

fn chrono_duration(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
