//! Terminal API — the endpoint the console's terminal talks to.
//!
//! Routing and authorization live in [`crate::router`]. This module only
//! decides which paths are authenticated and hands the caller, taken from the
//! extensions set by [`user_auth_middleware`], to the router.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware,
    response::Response,
    routing::{any, get},
    Extension, Json, Router,
};
use serde_json::{json, Value};

use crate::{
    api::user_auth::{user_auth_middleware, User, UserInfo},
    error::ProxyError,
    router::ProxyState,
};

/// Path prefix served by the terminal proxy.
pub const TERMINAL_ENDPOINT: &str = "/api/terminal/";

/// Build the axum router.
///
/// Only the terminal routes are authenticated; `/healthz` stays open for
/// probes.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route(&format!("{TERMINAL_ENDPOINT}{{*path}}"), any(terminal))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            user_auth_middleware,
        ))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// `GET /healthz`: liveness only. The cluster is not consulted, so a cluster
/// outage does not get the proxy restarted.
async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `ANY /api/terminal/{namespace}/{workspace}/{path}`: authorize and forward.
pub async fn terminal(
    State(state): State<Arc<ProxyState>>,
    Extension(user): Extension<User>,
    Extension(user_info): Extension<UserInfo>,
    req: Request,
) -> Result<Response, ProxyError> {
    crate::router::handle(&state, &user, &user_info, req).await
}
