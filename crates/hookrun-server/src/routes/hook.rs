use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use hookrun_core::notification::{self, EVENT_HEADER};
use hookrun_core::{EventKind, HookError};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::state::AppState;

/// Largest body read from a delivery. Matches the hosting service's own cap.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const RECEIVED: (StatusCode, &str) = (StatusCode::OK, "received");

// ---------------------------------------------------------------------------
// Any method, any path — the hook endpoint
// ---------------------------------------------------------------------------

/// Accept a delivery, log it, and hand pushes to the dispatcher.
///
/// The response is always 200 "received": the sender only needs to know the
/// delivery arrived. Parse failures, unknown events and action outcomes show
/// up in the log only.
pub async fn receive(State(app): State<AppState>, request: Request) -> (StatusCode, &'static str) {
    let received_at = Instant::now();
    let (parts, body) = request.into_parts();

    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    info!(
        host = header_str(&parts.headers, header::HOST.as_str()).unwrap_or("-"),
        method = %parts.method,
        remote_addr = %remote_addr,
        uri = %parts.uri,
        "request"
    );
    trace!(headers = ?parts.headers, "request headers");

    let body: Bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return RECEIVED;
        }
    };
    if !body.is_empty() {
        trace!(body = %String::from_utf8_lossy(&body), "request body");
    }

    let parsed = notification::parse(
        header_str(&parts.headers, header::CONTENT_TYPE.as_str()),
        header_str(&parts.headers, EVENT_HEADER),
        &body,
    );

    match parsed {
        Ok(None) => debug!("not a JSON delivery, ignored"),
        Ok(Some(n)) if n.kind == EventKind::Ping => {
            info!(
                repository = %n.repository_id,
                hook_id = ?n.hook_id,
                "ping event received"
            );
        }
        Ok(Some(n)) => {
            info!(repository = %n.repository_id, event = %n.kind, "event received");
            if n.is_dispatchable() {
                app.spawn_dispatch(n.repository_id, received_at);
            }
        }
        Err(HookError::UnrecognizedEvent(event)) => {
            warn!(event = %event, "unknown event received");
        }
        Err(e) => error!(error = %e, "can't parse payload"),
    }

    RECEIVED
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
