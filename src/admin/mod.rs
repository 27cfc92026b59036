//! Admin introspection API.
//!
//! # Routes
//! ```text
//! GET    /admin/status               version, visibility, counts
//! GET    /admin/polls                scheduler debug snapshot
//! GET    /admin/polls/{key}          one key
//! DELETE /admin/polls/{key}          stop polling a key
//! POST   /admin/polls/{key}/restart  re-register (resumes a paused key)
//! GET    /admin/circuits             breaker snapshots
//! POST   /admin/visibility           {"visible": bool}
//! POST   /admin/cache/clear          drop cache and last-data snapshots
//! ```
//!
//! Every route requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::Shutdown;
use crate::resilience::CircuitBreakers;
use crate::scheduler::PollingScheduler;
use crate::transport::Transport;

/// Shared state behind every admin handler.
pub struct AdminState<P: Transport> {
    pub scheduler: PollingScheduler<P>,
    pub breakers: CircuitBreakers,
}

impl<P: Transport> Clone for AdminState<P> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            breakers: self.breakers.clone(),
        }
    }
}

pub fn setup_admin_router<P: Transport>(state: AdminState<P>, api_key: &str) -> Router {
    Router::new()
        .route("/admin/status", get(get_status::<P>))
        .route("/admin/polls", get(get_polls::<P>))
        .route("/admin/polls/{key}", get(get_poll::<P>).delete(stop_poll::<P>))
        .route("/admin/polls/{key}/restart", post(restart_poll::<P>))
        .route("/admin/circuits", get(get_circuits::<P>))
        .route("/admin/visibility", post(set_visibility::<P>))
        .route("/admin/cache/clear", post(clear_cache::<P>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    Arc::<str>::from(api_key),
                    admin_auth_middleware,
                )),
        )
        .with_state(state)
}

/// Serve the admin router until shutdown is triggered.
pub async fn serve(listener: TcpListener, router: Router, shutdown: Shutdown) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "Admin API listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}
