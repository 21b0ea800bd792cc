//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Open the config store and wire the release coordinator
//! - Create the Axum router with all admin handlers
//! - Wire up middleware (request id, tracing, timeout, body limit, metrics)
//! - Serve plain TCP or TLS until shutdown
//! - Apply hot-reloaded gateway targets, purge expired revocations

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, middleware, Router};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::AccessControl;
use crate::config::schema::AdminConfig;
use crate::error::AdminError;
use crate::http::middleware::track_metrics;
use crate::release::{
    GatewayPush, HttpGatewayPush, ReleaseCoordinator, ReleaseSettings, TargetRegistry,
};
use crate::store::ConfigStore;

const REVOCATION_PURGE_INTERVAL: Duration = Duration::from_secs(60);
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub coordinator: Arc<ReleaseCoordinator>,
    pub access: Arc<AccessControl>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to open config store: {0}")]
    Store(#[from] AdminError),

    #[error("failed to build gateway push client: {0}")]
    PushClient(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The admin API server.
pub struct AdminServer {
    router: Router,
    state: AppState,
    config: AdminConfig,
}

impl AdminServer {
    /// Create a server that pushes releases over HTTP.
    pub fn new(config: AdminConfig) -> Result<Self, ServerError> {
        let pusher = HttpGatewayPush::new(Duration::from_millis(config.release.push_timeout_ms))?;
        Self::with_pusher(config, Arc::new(pusher))
    }

    /// Create a server with a custom gateway push implementation.
    pub fn with_pusher(
        config: AdminConfig,
        pusher: Arc<dyn GatewayPush>,
    ) -> Result<Self, ServerError> {
        let store = Arc::new(ConfigStore::open(&config.store)?);
        let targets = Arc::new(TargetRegistry::new(config.release.targets.clone()));
        let coordinator = Arc::new(ReleaseCoordinator::new(
            store.clone(),
            targets,
            pusher,
            ReleaseSettings::from(&config.release),
        ));
        let access = Arc::new(AccessControl::new(&config.auth));

        let state = AppState {
            store,
            coordinator,
            access,
        };
        let router = Self::build_router(&config, state.clone());

        Ok(Self {
            router,
            state,
            config,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AdminConfig, state: AppState) -> Router {
        crate::admin::router(state)
            .route_layer(middleware::from_fn(track_metrics))
            .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.request_timeout_secs,
            )))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "admin_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<AdminConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, tls = false, "Admin API starting");

        let maintenance = self.spawn_maintenance(config_updates, shutdown.resubscribe());

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        maintenance.abort();
        tracing::info!("Admin API stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        config_updates: mpsc::UnboundedReceiver<AdminConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(address = %addr, tls = true, "Admin API starting");

        let maintenance = self.spawn_maintenance(config_updates, shutdown.resubscribe());

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        maintenance.abort();
        tracing::info!("Admin API stopped");
        Ok(())
    }

    fn spawn_maintenance(
        &self,
        mut updates: mpsc::UnboundedReceiver<AdminConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let access = self.state.access.clone();
        let targets = self.state.coordinator.targets().clone();
        let mut current = self.config.clone();

        tokio::spawn(async move {
            let mut purge = tokio::time::interval(REVOCATION_PURGE_INTERVAL);
            purge.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut updates_open = true;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = purge.tick() => {
                        let purged = access.purge_revoked();
                        if purged > 0 {
                            tracing::debug!(purged, "Expired revocations purged");
                        }
                    }
                    update = updates.recv(), if updates_open => match update {
                        Some(next) => apply_config_update(&mut current, next, &targets),
                        None => updates_open = false,
                    },
                }
            }
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }
}

/// Apply a reloaded configuration. Only the gateway target list is live;
/// every other changed section is reported as needing a restart.
pub(crate) fn apply_config_update(
    current: &mut AdminConfig,
    next: AdminConfig,
    targets: &TargetRegistry,
) {
    if next.release.targets != current.release.targets {
        targets.replace(next.release.targets.clone());
    }

    let release_changed = {
        let mut a = current.release.clone();
        let mut b = next.release.clone();
        a.targets.clear();
        b.targets.clear();
        a != b
    };
    let restart_needed: Vec<&str> = [
        ("server", next.server != current.server),
        ("auth", next.auth != current.auth),
        ("store", next.store != current.store),
        ("release", release_changed),
        ("observability", next.observability != current.observability),
    ]
    .into_iter()
    .filter_map(|(section, changed)| changed.then_some(section))
    .collect();

    if !restart_needed.is_empty() {
        tracing::warn!(
            sections = ?restart_needed,
            "Configuration changes require a restart to take effect"
        );
    }

    *current = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::GatewayTarget;

    fn target(name: &str) -> GatewayTarget {
        GatewayTarget {
            name: name.to_string(),
            url: format!("http://{name}.internal:9000").parse().unwrap(),
        }
    }

    #[test]
    fn test_config_update_replaces_targets() {
        let mut current = AdminConfig::default();
        current.release.targets = vec![target("gw-1")];
        let registry = TargetRegistry::new(current.release.targets.clone());

        let mut next = current.clone();
        next.release.targets = vec![target("gw-1"), target("gw-2")];
        next.server.request_timeout_secs = 5;
        apply_config_update(&mut current, next.clone(), &registry);

        assert_eq!(registry.len(), 2);
        assert_eq!(current, next);
    }
}
