//! Borde async de requests.
//!
//! Cada handler es síncrono (los stores bloquean) y corre en
//! `spawn_blocking` bajo un deadline por request. El token, si viene, se
//! resuelve a principal dentro del mismo hilo bloqueante.
//!
//! Al vencer el deadline la respuesta es `Infrastructure("deadline
//! exceeded")`. El hilo bloqueante no se puede abortar: si ya confirmó su
//! transacción el cambio queda aplicado y el cliente debe releer.

use std::sync::Arc;
use std::time::Duration;

use eval_core::{RequestContext, WorkflowError};
use log::{debug, error, warn};

use crate::app::App;
use crate::errors::ErrorResponse;

/// Metadatos de transporte de un request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub bearer: Option<String>,
    pub ip_address: Option<String>,
    pub method: String,
    pub path: String,
}

impl RequestMeta {
    pub fn new(method: &str, path: &str) -> Self {
        Self { method: method.to_string(), path: path.to_string(), ..Default::default() }
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn from_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}

#[derive(Clone)]
pub struct Gateway {
    app: Arc<App>,
    timeout: Duration,
}

impl Gateway {
    pub fn new(app: Arc<App>, timeout: Duration) -> Self {
        Self { app, timeout }
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// Ejecuta `handler` con el contexto del request.
    pub async fn call<T, F>(&self, meta: RequestMeta, handler: F) -> Result<T, WorkflowError>
        where T: Send + 'static,
              F: FnOnce(&App, &RequestContext) -> Result<T, WorkflowError> + Send + 'static
    {
        let app = self.app.clone();
        let label = format!("{} {}", meta.method, meta.path);
        let task = tokio::task::spawn_blocking(move || {
            let ctx = context_for(&app, &meta)?;
            handler(&app, &ctx)
        });
        let outcome = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                error!("handler_panicked request={} err={}", label, join);
                Err(WorkflowError::Infrastructure("handler aborted".into()))
            }
            Err(_) => {
                warn!("deadline_exceeded request={} timeout_ms={}", label, self.timeout.as_millis());
                Err(WorkflowError::Infrastructure("deadline exceeded".into()))
            }
        };
        match &outcome {
            Err(WorkflowError::Infrastructure(msg)) => error!("request_failed request={} err={}", label, msg),
            Err(e) => debug!("request_rejected request={} code={}", label, e.code()),
            Ok(_) => debug!("request_ok request={}", label),
        }
        outcome
    }

    /// Como `call`, con el error ya convertido al cuerpo de respuesta.
    pub async fn respond<T, F>(&self, meta: RequestMeta, handler: F) -> Result<T, ErrorResponse>
        where T: Send + 'static,
              F: FnOnce(&App, &RequestContext) -> Result<T, WorkflowError> + Send + 'static
    {
        self.call(meta, handler).await.map_err(|e| ErrorResponse::from(&e))
    }
}

fn context_for(app: &App, meta: &RequestMeta) -> Result<RequestContext, WorkflowError> {
    let mut ctx = match &meta.bearer {
        Some(token) => RequestContext::for_principal(app.auth.authenticate(token)?),
        None => RequestContext::default(),
    };
    ctx.ip_address = meta.ip_address.clone();
    Ok(ctx.with_request(meta.method.clone(), meta.path.clone()))
}
