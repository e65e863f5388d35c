//! Terminal request routing — the decision path of terminal-proxy.
//!
//! A request for `/api/terminal/{namespace}/{workspace}/{path}` goes through
//! a fixed sequence of checks, each of which can end the request:
//!
//! 1. the path is parsed (404 when malformed),
//! 2. the user's groups are checked against the namespace (403),
//! 3. the workspace is fetched as the user (403 on any cluster error),
//! 4. the workspace's creator must be the user (403),
//! 5. `status.ideUrl` must be present and parse as a URL (500),
//!
//! and only then is the request forwarded to the workspace with the user's
//! token attached. Nothing is retried.

use std::sync::Arc;

use axum::{extract::Request, http::HeaderValue, response::Response};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::{
    api::user_auth::{User, UserInfo},
    cluster::ClusterConnector,
    config::Config,
    error::ProxyError,
    permissions::check_user_permissions,
    transport::WorkspaceTransport,
};

/// Shared application state injected into every request handler via [`axum::extract::State`].
///
/// Immutable after startup; requests share nothing mutable.
pub struct ProxyState {
    pub config: Arc<Config>,
    /// Builds per-user cluster clients for identity and workspace lookups.
    pub cluster: ClusterConnector,
    /// Pooled client used for every forwarded request.
    pub transport: WorkspaceTransport,
}

impl ProxyState {
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let cluster = ClusterConnector::new(&config.cluster)?;
        let transport = WorkspaceTransport::new(&config.workspace)?;
        Ok(Self {
            config,
            cluster,
            transport,
        })
    }
}

/// Components of a terminal request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalPath {
    pub namespace: String,
    pub workspace: String,
    /// Everything after the workspace name, without a leading slash.
    pub subpath: String,
}

/// Split `/api/terminal/{namespace}/{workspace}/{path...}`.
///
/// The slash after the workspace name is required; `{path}` may be empty.
/// Namespace and workspace are percent-decoded so the permission check and
/// the cluster lookup see the same name; `{path}` is kept as sent.
pub fn parse_terminal_path(path: &str) -> Option<TerminalPath> {
    // 0   1      2          3           4         5
    //   /api/terminal/{namespace}/{workspace}/{path...}
    let segments: Vec<&str> = path.splitn(6, '/').collect();
    let [root, api, terminal, namespace, workspace, subpath] = segments.as_slice() else {
        return None;
    };
    if !root.is_empty() || *api != "api" || *terminal != "terminal" {
        return None;
    }
    Some(TerminalPath {
        namespace: decode_name(namespace)?,
        workspace: decode_name(workspace)?,
        subpath: (*subpath).to_owned(),
    })
}

/// Percent-decode a namespace or workspace segment.
///
/// Anything that could change which cluster URL the name lands in is
/// rejected: separators, a second round of escapes, dot segments, controls.
fn decode_name(segment: &str) -> Option<String> {
    let name = percent_decode_str(segment).decode_utf8().ok()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    let forbidden = |c: char| {
        matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
    };
    if name.contains(forbidden) {
        return None;
    }
    Some(name.into_owned())
}

/// Authorize a terminal request for `user` and forward it to the workspace.
#[tracing::instrument(
    skip_all,
    fields(
        user = %user.name,
        namespace = tracing::field::Empty,
        workspace = tracing::field::Empty,
    )
)]
pub async fn handle(
    state: &ProxyState,
    user: &User,
    user_info: &UserInfo,
    req: Request,
) -> Result<Response, ProxyError> {
    let path = parse_terminal_path(req.uri().path()).ok_or(ProxyError::PathMalformed)?;

    let span = tracing::Span::current();
    span.record("namespace", path.namespace.as_str());
    span.record("workspace", path.workspace.as_str());

    if !check_user_permissions(&user_info.0, &path.namespace)? {
        return Err(ProxyError::PermissionDenied {
            namespace: path.namespace,
        });
    }

    let workspace = state
        .cluster
        .for_token(&user.token)
        .map_err(ProxyError::ResolutionFailed)?
        .get_workspace(&path.namespace, &path.workspace)
        .await
        .map_err(ProxyError::ResolutionFailed)?;

    if !workspace.is_owned_by(&user.id) {
        debug!(creator = ?workspace.creator(), user_id = %user.id, "workspace owned by someone else");
        return Err(ProxyError::OwnershipMismatch);
    }

    let target = workspace.endpoint()?;
    let access_token = access_token_value(&user.token)?;

    debug!(target = %target.origin(), subpath = %path.subpath, "workspace resolved");

    state
        .transport
        .forward(&target, &path.subpath, access_token, req)
        .await
        .map_err(ProxyError::Upstream)
}

fn access_token_value(token: &str) -> Result<HeaderValue, ProxyError> {
    let mut value = HeaderValue::from_str(token).map_err(|_| {
        ProxyError::Unauthenticated("bearer token is not a valid header value".into())
    })?;
    value.set_sensitive(true);
    Ok(value)
}
