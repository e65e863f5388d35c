//! Cluster API access made on behalf of the requesting user.
//!
//! A [`UserClient`] is built fresh per request from the user's bearer token,
//! so every lookup runs under the user's own RBAC rather than a service
//! account. Building the client is cheap compared to the round trip it makes.

use axum::http::Uri;
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use tracing::instrument;

use crate::{
    config::ClusterConfig,
    workspace::{Workspace, WORKSPACE_GROUP, WORKSPACE_KIND, WORKSPACE_PLURAL, WORKSPACE_VERSION},
};

/// Name the user API resolves to whoever presents the token.
const CURRENT_USER: &str = "~";

/// Builds per-user cluster clients from the static cluster settings.
#[derive(Debug, Clone)]
pub struct ClusterConnector {
    endpoint: Uri,
    insecure_skip_tls_verify: bool,
}

impl ClusterConnector {
    pub fn new(cfg: &ClusterConfig) -> anyhow::Result<Self> {
        let endpoint = cfg
            .endpoint
            .parse::<Uri>()
            .map_err(|e| anyhow::anyhow!("invalid cluster endpoint `{}`: {e}", cfg.endpoint))?;
        Ok(Self {
            endpoint,
            insecure_skip_tls_verify: cfg.insecure_skip_tls_verify,
        })
    }

    /// A client that authenticates to the cluster with `token`.
    pub fn for_token(&self, token: &str) -> Result<UserClient, kube::Error> {
        let mut config = kube::Config::new(self.endpoint.clone());
        config.accept_invalid_certs = self.insecure_skip_tls_verify;
        config.auth_info = kube::config::AuthInfo {
            token: Some(token.to_string().into()),
            ..Default::default()
        };
        Ok(UserClient {
            kube: Client::try_from(config)?,
        })
    }
}

/// Cluster client carrying one user's credentials.
#[derive(Clone)]
pub struct UserClient {
    kube: Client,
}

impl UserClient {
    /// Fetch `name` from the workspaces of `namespace`.
    ///
    /// Cluster errors are returned unchanged; the caller decides how they
    /// surface to the client.
    #[instrument(level = "debug", skip(self), err(Display))]
    pub async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Workspace, kube::Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.kube.clone(), namespace, &workspace_resource());
        api.get(name).await.map(Workspace::from)
    }

    /// The user object the cluster associates with this client's token.
    #[instrument(level = "debug", skip(self), err(Display))]
    pub async fn current_user(&self) -> Result<DynamicObject, kube::Error> {
        let api: Api<DynamicObject> = Api::all_with(self.kube.clone(), &user_resource());
        api.get(CURRENT_USER).await
    }
}

fn workspace_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk(WORKSPACE_GROUP, WORKSPACE_VERSION, WORKSPACE_KIND);
    ApiResource::from_gvk_with_plural(&gvk, WORKSPACE_PLURAL)
}

fn user_resource() -> ApiResource {
    let gvk = GroupVersionKind::gvk("user.openshift.io", "v1", "User");
    ApiResource::from_gvk_with_plural(&gvk, "users")
}
