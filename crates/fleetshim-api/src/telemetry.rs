//! Request telemetry interception.
//!
//! Handlers describe who served a request by attaching [`ServedBy`] to
//! the response extensions. The middleware turns that into exactly one
//! buffered event per request, after the handler has finished.
//!
//! Only requests that matched a route are recorded, and exclusions are
//! checked against the route pattern rather than the raw URI.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use fleetshim_core::{TelemetryEvent, node_tag};

use crate::AppState;

/// Which node handled a request, and under what operation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedBy {
    pub node: &'static str,
    pub operation: &'static str,
}

impl ServedBy {
    pub fn new(node: &'static str, operation: &'static str) -> Self {
        Self { node, operation }
    }
}

pub async fn record_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(route) = request.extensions().get::<MatchedPath>().cloned() else {
        return next.run(request).await;
    };
    if state.is_excluded(route.as_str()) {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let method = request.method().clone();

    let response = next.run(request).await;

    let event = match response.extensions().get::<ServedBy>() {
        Some(served) => TelemetryEvent::new(path, served.operation, served.node),
        None => TelemetryEvent::new(path, method.as_str(), node_tag::BACKEND),
    };
    state.buffer.record(event);
    response
}
