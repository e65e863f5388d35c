//! Read-only view of a Che workspace resource and the proxy target derived
//! from its status.

use kube::api::DynamicObject;
use url::Url;

/// Annotation naming the user who provisioned the workspace.
pub const CREATOR_ANNOTATION: &str = "org.eclipse.che.workspace/creator";

pub const WORKSPACE_GROUP: &str = "workspace.che.eclipse.org";
pub const WORKSPACE_VERSION: &str = "v1alpha1";
pub const WORKSPACE_KIND: &str = "Workspace";
pub const WORKSPACE_PLURAL: &str = "workspaces";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EndpointError {
    /// `status.ideUrl` is absent or not a string.
    #[error("workspace status has no ideUrl")]
    Missing,
    #[error("workspace ideUrl `{ide_url}` is not an absolute URL with a host")]
    Unparsable { ide_url: String },
}

/// A workspace as returned by the cluster.
#[derive(Debug, Clone)]
pub struct Workspace(DynamicObject);

impl Workspace {
    pub fn creator(&self) -> Option<&str> {
        self.0
            .metadata
            .annotations
            .as_ref()?
            .get(CREATOR_ANNOTATION)
            .map(String::as_str)
    }

    pub fn ide_url(&self) -> Option<&str> {
        self.0.data.get("status")?.get("ideUrl")?.as_str()
    }

    /// Whether `user_id` provisioned this workspace.
    ///
    /// A workspace without a creator annotation is owned by nobody.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.creator() == Some(user_id)
    }

    /// Resolve where traffic for this workspace should be sent.
    pub fn endpoint(&self) -> Result<ProxyTarget, EndpointError> {
        let ide_url = self.ide_url().ok_or(EndpointError::Missing)?;
        ProxyTarget::parse(ide_url)
    }
}

impl From<DynamicObject> for Workspace {
    fn from(object: DynamicObject) -> Self {
        Self(object)
    }
}

/// Scheme and authority of a workspace endpoint.
///
/// Only the origin of `ideUrl` is kept; its path is replaced by the
/// subpath of each proxied request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    scheme: String,
    authority: String,
}

impl ProxyTarget {
    pub fn parse(ide_url: &str) -> Result<Self, EndpointError> {
        let unparsable = || EndpointError::Unparsable {
            ide_url: ide_url.to_owned(),
        };
        let url = Url::parse(ide_url).map_err(|_| unparsable())?;
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(unparsable)?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        Ok(Self {
            scheme: url.scheme().to_owned(),
            authority,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// `scheme://authority` with no path.
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme(), self.authority())
    }

    /// Build the outbound URL for `subpath` (no leading slash) and an optional
    /// raw query string.
    pub fn url_for(&self, subpath: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.origin(), subpath);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}
