//! Bearer-token authentication for the terminal routes.
//!
//! Every terminal request must carry `Authorization: Bearer <token>`. The
//! token is presented to the cluster's user API (`users/~`), which answers
//! with the user it belongs to. The resolved [`User`] and the raw identity
//! object ([`UserInfo`]) are injected as request extensions so the terminal
//! handler never has to look at the header again.
//!
//! The proxy holds no credentials of its own: a token the cluster rejects is
//! answered with `401 Unauthorized`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kube::api::DynamicObject;
use serde_json::Value;
use tracing::debug;

use crate::{error::ProxyError, router::ProxyState};

/// The authenticated caller of a terminal request.
#[derive(Clone)]
pub struct User {
    /// Identity compared against a workspace's creator annotation.
    pub id: String,
    pub name: String,
    /// Bearer token, used both towards the cluster and the workspace.
    pub token: String,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl User {
    /// Build a user from the object the cluster returned for `token`.
    ///
    /// Virtual users such as `kube:admin` have no UID; their name is used
    /// as the ID instead.
    pub fn from_identity(identity: &DynamicObject, token: String) -> Option<Self> {
        let name = identity.metadata.name.clone().filter(|n| !n.is_empty())?;
        let id = identity
            .metadata
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| name.clone());
        Some(Self { id, name, token })
    }
}

/// Identity object of the caller, outside its metadata (`groups`, `identities`, ...).
#[derive(Clone, Debug)]
pub struct UserInfo(pub Value);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Axum middleware: resolves the bearer token to a [`User`] and [`UserInfo`].
pub async fn user_auth_middleware(
    State(state): State<Arc<ProxyState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_owned) else {
        return ProxyError::Unauthenticated(
            "Terminal API requires Authorization: Bearer <token>.".into(),
        )
        .into_response();
    };

    let identity = match state.cluster.for_token(&token) {
        Ok(client) => client.current_user().await,
        Err(e) => Err(e),
    };
    let identity = match identity {
        Ok(identity) => identity,
        Err(e) => {
            debug!(error = %e, "cluster rejected bearer token");
            return ProxyError::Unauthenticated("Bearer token was rejected by the cluster.".into())
                .into_response();
        }
    };

    let Some(user) = User::from_identity(&identity, token) else {
        return ProxyError::Unauthenticated("Cluster returned a user without a name.".into())
            .into_response();
    };

    debug!(user = %user.name, "authenticated terminal request");
    req.extensions_mut().insert(user);
    req.extensions_mut().insert(UserInfo(identity.data));
    next.run(req).await
}
