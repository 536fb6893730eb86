//! Reverse-proxy forwarding to a single upstream

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, Response, Uri};
use rondo_core::{RondoError, RondoResult};
use std::net::SocketAddr;
use tracing::debug;
use url::Url;

/// Headers that only apply to a single connection and are never relayed
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

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Relays requests to an upstream address
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send the request upstream and return the response unmodified
    async fn forward(&self, request: Request<Body>) -> RondoResult<Response<Body>>;
}

/// Forwarder for one upstream base address
pub struct ReverseProxy {
    client: reqwest::Client,
    base: Url,
}

impl ReverseProxy {
    /// Create a proxy for `base` sharing the given client
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    /// Build the HTTP client used for forwarding.
    ///
    /// Redirects are relayed to the caller rather than followed, and
    /// environment proxy settings are ignored.
    pub fn client() -> RondoResult<reqwest::Client> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| RondoError::Config(format!("Failed to create HTTP client: {}", e)))
    }

    /// Base address requests are sent to
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Rewrite an inbound URI onto the upstream base address
    fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        url.set_path(&join_paths(self.base.path(), uri.path()));

        let query = match (self.base.query(), uri.query()) {
            (Some(base), Some(query)) if !base.is_empty() => Some(format!("{base}&{query}")),
            (Some(base), None) if !base.is_empty() => Some(base.to_string()),
            (_, query) => query.map(str::to_string),
        };
        url.set_query(query.as_deref());
        url
    }
}

#[async_trait]
impl Forwarder for ReverseProxy {
    async fn forward(&self, request: Request<Body>) -> RondoResult<Response<Body>> {
        let (parts, body) = request.into_parts();
        let url = self.target_url(&parts.uri);

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, peer);
        }

        let body = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| RondoError::Forwarding(format!("Failed to read request body: {}", e)))?;

        debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| RondoError::Forwarding(e.to_string()))?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            *headers = strip_hop_by_hop(upstream.headers());
        }

        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| RondoError::Forwarding(e.to_string()))
    }
}

/// Join two URL paths with exactly one slash between them
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in HOP_BY_HOP.iter() {
        out.remove(name);
    }
    out
}

fn append_forwarded_for(headers: &mut HeaderMap, peer: &SocketAddr) {
    let client_ip = peer.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client_ip),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(base: &str) -> ReverseProxy {
        ReverseProxy::new(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn test_join_paths() {
        assert_eq!(join_paths("/", "/users"), "/users");
        assert_eq!(join_paths("/api", "/users"), "/api/users");
        assert_eq!(join_paths("/api/", "/users"), "/api/users");
        assert_eq!(join_paths("/api", "users"), "/api/users");
    }

    #[test]
    fn test_target_url_keeps_path_and_query() {
        let proxy = proxy("http://10.0.0.1:8000");
        let uri: Uri = "/v1/items?limit=5".parse().unwrap();
        assert_eq!(
            proxy.target_url(&uri).as_str(),
            "http://10.0.0.1:8000/v1/items?limit=5"
        );
    }

    #[test]
    fn test_target_url_merges_base_path_and_query() {
        let proxy = proxy("https://example.com/api?key=abc");
        let uri: Uri = "/v1/items?limit=5".parse().unwrap();
        assert_eq!(
            proxy.target_url(&uri).as_str(),
            "https://example.com/api/v1/items?key=abc&limit=5"
        );

        let uri: Uri = "/".parse().unwrap();
        assert_eq!(
            proxy.target_url(&uri).as_str(),
            "https://example.com/api/?key=abc"
        );
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        let stripped = strip_hop_by_hop(&headers);
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key(header::ACCEPT));
    }

    #[test]
    fn test_append_forwarded_for() {
        let peer: SocketAddr = "192.168.1.7:51234".parse().unwrap();

        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, &peer);
        assert_eq!(headers[&X_FORWARDED_FOR], "192.168.1.7");

        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.1.1.1"));
        append_forwarded_for(&mut headers, &peer);
        assert_eq!(headers[&X_FORWARDED_FOR], "10.1.1.1, 192.168.1.7");
    }

    #[tokio::test]
    async fn test_forward_to_closed_port_is_forwarding_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = proxy(&format!("http://{}", addr));
        let err = proxy
            .forward(Request::new(Body::empty()))
            .await
            .err()
            .expect("request should fail");
        assert!(matches!(err, RondoError::Forwarding(_)));
    }
}
