//! Configuration types for terminal-proxy.
//!
//! Config is loaded once at startup from a TOML file and validated before the
//! server opens any ports. Invalid configs are rejected with a clear error
//! rather than silently falling back to defaults.
//!
//! # Example
//! ```toml
//! [server]
//! port = 8080
//!
//! [cluster]
//! endpoint = "https://kubernetes.default.svc"
//! insecure_skip_tls_verify = true
//!
//! [workspace]
//! ca_file = "/var/run/secrets/kubernetes.io/serviceaccount/service-ca.crt"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Where workspace and user lookups are sent.
    pub cluster: ClusterConfig,

    /// TLS settings for traffic forwarded to workspace endpoints.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&content).context("parsing config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let endpoint = Url::parse(&self.cluster.endpoint)
            .with_context(|| format!("cluster endpoint `{}` is not a URL", self.cluster.endpoint))?;
        anyhow::ensure!(
            matches!(endpoint.scheme(), "http" | "https"),
            "cluster endpoint `{}` must use http or https",
            self.cluster.endpoint
        );
        anyhow::ensure!(
            endpoint.host_str().is_some(),
            "cluster endpoint `{}` has no host",
            self.cluster.endpoint
        );

        if let Some(level) = &self.server.log_level {
            anyhow::ensure!(
                level.parse::<tracing_subscriber::EnvFilter>().is_ok(),
                "server.log_level `{level}` is not a valid filter directive"
            );
        }

        Ok(())
    }
}

/// Listener and logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port for the terminal API (default: 8080).
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Log level override (also controlled by `RUST_LOG` env var).
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: defaults::port(),
            log_level: None,
        }
    }
}

/// Cluster API connection settings.
///
/// Every request is made with the calling user's own bearer token; no
/// service-account credentials are configured here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Base URL of the cluster API server, e.g. `https://kubernetes.default.svc`.
    pub endpoint: String,

    /// Skip certificate verification on cluster API calls (default: true).
    ///
    /// Matches the behaviour the console has always shipped with. A warning
    /// is logged at startup while this is enabled.
    #[serde(default = "defaults::cluster_insecure")]
    pub insecure_skip_tls_verify: bool,
}

/// TLS settings for the shared workspace transport.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkspaceConfig {
    /// Skip certificate verification on forwarded requests (default: false).
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Extra PEM bundle trusted for workspace endpoints, typically the
    /// cluster's service CA.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
}

mod defaults {
    pub fn port() -> u16 { 8080 }
    pub fn cluster_insecure() -> bool { true }
}
