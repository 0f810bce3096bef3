//! HTTP engine.
//!
//! # Responsibilities
//! - Build an `HttpInstance` from the merged configuration
//! - Bind one listener per inbound and serve status/health routes
//! - Stop gracefully on `close()`, bounded by `timeouts.shutdown_ms`
//!
//! # Design Decisions
//! - Every listener is bound before any serve task is spawned, so a failed
//!   start leaves nothing running
//! - Sockets use SO_REUSEADDR and, on Unix, SO_REUSEPORT: a replacement
//!   instance can bind the same addresses while the old one still serves

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::loader::MergedConfig;
use crate::config::schema::{EngineConfig, InboundConfig};
use crate::config::validation::validate_engine_config;
use crate::engine::{BuildError, CloseError, Server, ServerBuilder, StartError};
use crate::lifecycle::Shutdown;

const LISTEN_BACKLOG: u32 = 1024;

/// Builder for [`HttpInstance`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpEngine;

impl ServerBuilder for HttpEngine {
    fn build(&self, config: &MergedConfig) -> Result<Box<dyn Server>, BuildError> {
        let engine_config: EngineConfig =
            serde_json::from_value(config.as_value().clone()).map_err(BuildError::Schema)?;
        validate_engine_config(&engine_config).map_err(BuildError::Validation)?;

        let instance = HttpInstance::new(engine_config);
        tracing::debug!(instance_id = %instance.id, "Instance built");
        Ok(Box::new(instance))
    }
}

/// State injected into inbound handlers.
#[derive(Clone)]
struct InboundState {
    instance_id: Uuid,
    tag: Arc<str>,
    message: Option<Arc<str>>,
}

struct RunningInbound {
    tag: String,
    addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
}

/// One service instance serving every configured inbound.
pub struct HttpInstance {
    id: Uuid,
    config: EngineConfig,
    shutdown: Shutdown,
    inbounds: Vec<RunningInbound>,
}

impl HttpInstance {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            shutdown: Shutdown::new(),
            inbounds: Vec::new(),
        }
    }
}

#[async_trait]
impl Server for HttpInstance {
    fn instance_id(&self) -> Uuid {
        self.id
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.inbounds.iter().map(|i| i.addr).collect()
    }

    async fn start(&mut self) -> Result<(), StartError> {
        if !self.inbounds.is_empty() {
            return Err(StartError::AlreadyStarted);
        }

        let mut bound = Vec::with_capacity(self.config.inbounds.len());
        for inbound in &self.config.inbounds {
            let bind_err = |source| StartError::Bind {
                tag: inbound.tag.clone(),
                listen: inbound.listen.clone(),
                source,
            };
            let listener = bind_reusable(&inbound.listen).map_err(bind_err)?;
            let addr = listener.local_addr().map_err(bind_err)?;
            bound.push((inbound, listener, addr));
        }

        let request_timeout = Duration::from_secs(self.config.timeouts.request_secs);
        for (inbound, listener, addr) in bound {
            let app = build_router(self.id, inbound, request_timeout);
            let mut stop = self.shutdown.subscribe();
            let task = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.recv().await;
                    })
                    .await
            });

            tracing::info!(
                instance_id = %self.id,
                tag = %inbound.tag,
                address = %addr,
                "Inbound listening"
            );
            self.inbounds.push(RunningInbound {
                tag: inbound.tag.clone(),
                addr,
                task,
            });
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CloseError> {
        if self.inbounds.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            instance_id = %self.id,
            listeners = self.shutdown.receiver_count(),
            "Stopping inbounds"
        );
        self.shutdown.trigger();
        let timeout_ms = self.config.timeouts.shutdown_ms;
        let mut first_error = None;

        for RunningInbound { tag, addr, mut task } in self.inbounds.drain(..) {
            let result = match tokio::time::timeout(Duration::from_millis(timeout_ms), &mut task).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(CloseError::Task {
                    tag,
                    reason: e.to_string(),
                }),
                Ok(Err(e)) => Err(CloseError::Task {
                    tag,
                    reason: e.to_string(),
                }),
                Err(_) => {
                    task.abort();
                    Err(CloseError::Timeout { tag, timeout_ms })
                }
            };

            match result {
                Ok(()) => tracing::debug!(address = %addr, "Inbound stopped"),
                Err(e) => {
                    tracing::warn!(address = %addr, error = %e, "Inbound did not stop cleanly");
                    first_error.get_or_insert(e);
                }
            }
        }

        tracing::info!(instance_id = %self.id, "Instance closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for HttpInstance {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[allow(deprecated)]
fn build_router(instance_id: Uuid, inbound: &InboundConfig, request_timeout: Duration) -> Router {
    let state = InboundState {
        instance_id,
        tag: Arc::from(inbound.tag.as_str()),
        message: inbound.message.as_deref().map(Arc::from),
    };

    Router::new()
        .route("/", get(status_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn status_handler(State(state): State<InboundState>) -> Json<serde_json::Value> {
    Json(json!({
        "instance_id": state.instance_id,
        "inbound": &*state.tag,
        "message": state.message.as_deref(),
    }))
}

async fn health_handler() -> &'static str {
    "ok"
}

fn bind_reusable(listen: &str) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(unix)]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}
