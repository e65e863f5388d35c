//! Request-level error taxonomy for the terminal proxy.
//!
//! Every failure on the proxy path is terminal for the request: it becomes a
//! [`ProxyError`], which converts into an HTTP response via [`IntoResponse`]
//! before any byte of a proxied response has been written. Handlers return
//! `Result<Response, ProxyError>` and propagate with `?`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{permissions::PermissionError, workspace::EndpointError};

/// Why a terminal request was refused or could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No usable bearer token, or the cluster rejected it.
    #[error("{0}")]
    Unauthenticated(String),

    /// The request path is not `/api/terminal/{namespace}/{workspace}/{path}`.
    #[error("not found")]
    PathMalformed,

    /// The caller's groups do not allow proxying into this namespace.
    #[error("User is not allowed to use the terminal in namespace {namespace}")]
    PermissionDenied { namespace: String },

    /// The caller's identity object could not be evaluated.
    #[error("Failed to check user permissions. Cause: {0}")]
    PermissionCheckFailed(#[from] PermissionError),

    /// Any cluster error while fetching the workspace, not-found included.
    #[error("Failed to get the requested workspace. Cause: {0}")]
    ResolutionFailed(#[source] kube::Error),

    #[error("User is not an owner of the requested workspace")]
    OwnershipMismatch,

    #[error("Received workspace does not have ideUrl in its status")]
    EndpointMissing,

    #[error("Failed to parse workspace ideUrl {ide_url}")]
    EndpointUnparsable { ide_url: String },

    /// The workspace endpoint could not be reached.
    #[error("Failed to reach the workspace. Cause: {0}")]
    Upstream(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::PathMalformed => StatusCode::NOT_FOUND,
            Self::PermissionDenied { .. }
            | Self::ResolutionFailed(_)
            | Self::OwnershipMismatch => StatusCode::FORBIDDEN,
            Self::PermissionCheckFailed(_)
            | Self::EndpointMissing
            | Self::EndpointUnparsable { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<EndpointError> for ProxyError {
    fn from(e: EndpointError) -> Self {
        match e {
            EndpointError::Missing => Self::EndpointMissing,
            EndpointError::Unparsable { ide_url } => Self::EndpointUnparsable { ide_url },
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, %status, "terminal request failed");
        } else {
            tracing::debug!(error = %self, %status, "terminal request rejected");
        }

        let body = Json(json!({ "error": self.to_string() }));
        match self {
            Self::Unauthenticated(_) => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer realm=\"terminal-proxy\"")],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    // -----------------------------------------------------------------------
    // Status mapping
    // -----------------------------------------------------------------------

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        assert_eq!(ProxyError::PathMalformed.status(), StatusCode::NOT_FOUND);
        assert_eq!(ProxyError::OwnershipMismatch.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ProxyError::PermissionDenied { namespace: "openshift-terminal".into() }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::ResolutionFailed(kube::Error::Api(kube::core::ErrorResponse {
                status: "Failure".into(),
                message: "workspaces.workspace.che.eclipse.org \"ws1\" not found".into(),
                reason: "NotFound".into(),
                code: 404,
            }))
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ProxyError::EndpointMissing.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ProxyError::EndpointUnparsable { ide_url: "::".into() }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::PermissionCheckFailed(PermissionError::GroupsNotStringList).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::Unauthenticated("no token".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn endpoint_errors_convert_to_matching_variants() {
        assert!(matches!(
            ProxyError::from(EndpointError::Missing),
            ProxyError::EndpointMissing
        ));
        assert!(matches!(
            ProxyError::from(EndpointError::Unparsable { ide_url: "x".into() }),
            ProxyError::EndpointUnparsable { ide_url } if ide_url == "x"
        ));
    }

    // -----------------------------------------------------------------------
    // IntoResponse
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn into_response_returns_json_error_body() {
        let response = ProxyError::OwnershipMismatch.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["error"], "User is not an owner of the requested workspace");
    }

    #[tokio::test]
    async fn unauthenticated_response_carries_bearer_challenge() {
        let response = ProxyError::Unauthenticated("missing token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[header::WWW_AUTHENTICATE],
            "Bearer realm=\"terminal-proxy\""
        );
        let json = body_json(response).await;
        assert_eq!(json["error"], "missing token");
    }

    #[tokio::test]
    async fn unparsable_endpoint_message_names_the_url() {
        let response = ProxyError::EndpointUnparsable { ide_url: "not a url".into() }.into_response();
        let json = body_json(response).await;
        assert!(
            json["error"].as_str().unwrap().contains("not a url"),
            "error text not propagated: {json:?}"
        );
    }
}
