//! Outbound HTTP transport towards workspace endpoints.
//!
//! One [`WorkspaceTransport`] is built at startup and shared by every
//! request. [`reqwest::Client`] pools connections per host internally, so a
//! single instance serves all workspaces; per-request state (target, path,
//! access token) is applied in [`WorkspaceTransport::forward`] only.

use anyhow::Context;
use axum::{
    body::{Body, HttpBody},
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use reqwest::{redirect, Certificate, Client};
use tracing::debug;

use crate::{config::WorkspaceConfig, workspace::ProxyTarget};

/// Header carrying the user's bearer token to the workspace.
pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-forwarded-access-token");

/// Headers that describe a single connection and must not be relayed.
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, Clone)]
pub struct WorkspaceTransport {
    client: Client,
}

impl WorkspaceTransport {
    pub fn new(cfg: &WorkspaceConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(cfg.insecure_skip_tls_verify);

        if let Some(path) = &cfg.ca_file {
            let pem = std::fs::read(path)
                .with_context(|| format!("reading workspace CA file {}", path.display()))?;
            let cert = Certificate::from_pem(&pem)
                .with_context(|| format!("parsing workspace CA file {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().context("building workspace transport")?;
        Ok(Self { client })
    }

    /// Send `req` to `target` with its path replaced by `/{subpath}` and the
    /// access-token header set, then relay the workspace's response.
    ///
    /// Method, query string, end-to-end headers and body are forwarded as-is;
    /// the response body is streamed back without buffering.
    pub async fn forward(
        &self,
        target: &ProxyTarget,
        subpath: &str,
        access_token: HeaderValue,
        req: Request,
    ) -> Result<Response, reqwest::Error> {
        let (parts, body) = req.into_parts();
        let url = target.url_for(subpath, parts.uri.query());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.insert(ACCESS_TOKEN_HEADER, access_token);

        debug!(method = %parts.method, %url, "forwarding to workspace");

        let mut outbound = self.client.request(parts.method, &url).headers(headers);
        if !body.is_end_stream() {
            outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = outbound.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use wiremock::matchers::{body_string, header as header_is, method, path, query_param};
    use wiremock::{Mock, MockServer, Request as MockRequest, ResponseTemplate};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn transport() -> WorkspaceTransport {
        WorkspaceTransport::new(&WorkspaceConfig::default()).unwrap()
    }

    fn target_for(server: &MockServer) -> ProxyTarget {
        ProxyTarget::parse(&format!("{}/term", server.uri())).unwrap()
    }

    fn token(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    // -----------------------------------------------------------------------
    // WorkspaceTransport::new
    // -----------------------------------------------------------------------

    #[test]
    fn new_fails_when_ca_file_is_missing() {
        let cfg = WorkspaceConfig {
            insecure_skip_tls_verify: false,
            ca_file: Some("/definitely/not/here/ca.crt".into()),
        };
        let err = WorkspaceTransport::new(&cfg).unwrap_err();
        assert!(err.to_string().contains("workspace CA file"), "unexpected error: {err}");
    }

    // -----------------------------------------------------------------------
    // strip_hop_by_hop
    // -----------------------------------------------------------------------

    #[test]
    fn strip_hop_by_hop_removes_connection_scoped_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, "keep-alive, x-session-hint".parse().unwrap());
        headers.insert("keep-alive", "timeout=5".parse().unwrap());
        headers.insert("x-session-hint", "abc".parse().unwrap());
        headers.insert(header::TRANSFER_ENCODING, "chunked".parse().unwrap());
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    }

    // -----------------------------------------------------------------------
    // forward
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn forward_rewrites_path_and_injects_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/console/foo"))
            .and(query_param("tab", "2"))
            .and(header_is("x-forwarded-access-token", "alice-token"))
            .and(header_is("x-custom", "kept"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-workspace", "ws1")
                    .set_body_string("terminal ready"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let req = Request::builder()
            .method("GET")
            .uri("/api/terminal/ns1/ws1/console/foo?tab=2")
            .header("x-custom", "kept")
            .header("x-forwarded-access-token", "spoofed")
            .body(Body::empty())
            .unwrap();

        let resp = transport()
            .forward(&target_for(&server), "console/foo", token("alice-token"), req)
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["x-workspace"], "ws1");
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"terminal ready");
    }

    #[tokio::test]
    async fn forward_relays_method_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/exec/init"))
            .and(body_string("ls -la"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let req = Request::builder()
            .method("POST")
            .uri("/api/terminal/ns1/ws1/exec/init")
            .body(Body::from("ls -la"))
            .unwrap();

        let resp = transport()
            .forward(&target_for(&server), "exec/init", token("t"), req)
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    #[tokio::test]
    async fn forward_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/login"))
            .mount(&server)
            .await;

        let req = Request::builder().uri("/api/terminal/ns1/ws1/").body(Body::empty()).unwrap();
        let resp = transport()
            .forward(&target_for(&server), "", token("t"), req)
            .await
            .unwrap();

        assert_eq!(resp.status(), 302);
        assert_eq!(resp.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn forward_drops_host_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(|req: &MockRequest| {
                let host = req
                    .headers
                    .get("host")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_owned();
                ResponseTemplate::new(200).set_body_string(host)
            })
            .mount(&server)
            .await;

        let req = Request::builder()
            .uri("/api/terminal/ns1/ws1/x")
            .header(header::HOST, "console.apps.example.com")
            .body(Body::empty())
            .unwrap();
        let target = target_for(&server);
        let resp = transport().forward(&target, "x", token("t"), req).await.unwrap();

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(std::str::from_utf8(&body).unwrap(), target.authority());
    }

    #[tokio::test]
    async fn forward_errors_when_workspace_is_unreachable() {
        // Nothing listens on port 1.
        let target = ProxyTarget::parse("http://127.0.0.1:1/term").unwrap();
        let req = Request::builder().uri("/api/terminal/ns1/ws1/x").body(Body::empty()).unwrap();
        assert!(transport().forward(&target, "x", token("t"), req).await.is_err());
    }
}
