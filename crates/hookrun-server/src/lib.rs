pub mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use state::AppState;

/// Build the axum Router. Every path and method lands on the hook handler.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(routes::hook::receive)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve hook deliveries on a pre-bound listener until `shutdown` resolves.
///
/// In-flight HTTP responses are drained first; dispatches still running are
/// then given up to `grace` to finish before being abandoned.
pub async fn serve_on<F>(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: F,
    grace: Duration,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let tasks = state.tasks.clone();
    let app = build_router(state);

    info!("hookrun listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    info!("HTTP server stopped");
    drain_dispatches(&tasks, grace).await;
    Ok(())
}

/// Stop accepting new dispatches and wait up to `grace` for the running
/// ones. Returns how many were abandoned.
pub async fn drain_dispatches(tasks: &TaskTracker, grace: Duration) -> usize {
    tasks.close();
    let pending = tasks.len();
    if pending == 0 {
        return 0;
    }
    if grace.is_zero() {
        warn!(pending, "abandoning in-flight dispatches");
        return pending;
    }

    info!(pending, grace_secs = grace.as_secs(), "waiting for in-flight dispatches");
    match tokio::time::timeout(grace, tasks.wait()).await {
        Ok(()) => 0,
        Err(_) => {
            let abandoned = tasks.len();
            warn!(abandoned, "grace period elapsed, abandoning in-flight dispatches");
            abandoned
        }
    }
}
