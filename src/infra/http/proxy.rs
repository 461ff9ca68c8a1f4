//! Streaming reverse proxy to one backend service.

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderMap, HeaderName, Request, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::debug;
use url::Url;

use crate::error::HttpError;

const SOURCE: &str = "infra::http::proxy::forward";
pub const FALLBACK_MESSAGE: &str = "service temporarily unavailable";

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Backend a route forwards to.
#[derive(Clone)]
pub struct Upstream {
    pub name: Arc<str>,
    pub base: Url,
    pub client: reqwest::Client,
}

impl Upstream {
    pub fn new(name: &str, base: Url, client: reqwest::Client) -> Self {
        Self {
            name: Arc::from(name),
            base,
            client,
        }
    }

    /// Target URL for an inbound request: the base URL's path joined with the
    /// full inbound path, query kept verbatim.
    pub fn target(&self, uri: &Uri) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}{}", self.base.path().trim_end_matches('/'), uri.path());
        url.set_path(&path);
        url.set_query(uri.query());
        url
    }
}

pub async fn forward(State(upstream): State<Upstream>, request: Request<Body>) -> Response {
    match proxy(&upstream, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn proxy(upstream: &Upstream, request: Request<Body>) -> Result<Response, HttpError> {
    let (parts, body) = request.into_parts();
    let target = upstream.target(&parts.uri);

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);

    let mut outbound = upstream
        .client
        .request(parts.method.clone(), target.clone())
        .headers(headers);
    if body.size_hint().exact() != Some(0) {
        outbound = outbound.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let reply = outbound.send().await.map_err(|err| {
        HttpError::from_error(
            SOURCE,
            StatusCode::SERVICE_UNAVAILABLE,
            FALLBACK_MESSAGE,
            &err,
        )
    })?;

    debug!(
        upstream = %upstream.name,
        method = %parts.method,
        target = %target,
        status = reply.status().as_u16(),
        "upstream responded"
    );

    let status = reply.status();
    let mut headers = reply.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(reply.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn upstream(base: &str) -> Upstream {
        Upstream::new(
            "products",
            Url::parse(base).expect("base url"),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn target_keeps_path_and_query() {
        let target = upstream("http://127.0.0.1:8083")
            .target(&"/api/products?page=2".parse().expect("uri"));
        assert_eq!(target.as_str(), "http://127.0.0.1:8083/api/products?page=2");
    }

    #[test]
    fn target_appends_to_base_path() {
        let target = upstream("http://catalogue.internal/v1/")
            .target(&"/api/products/7".parse().expect("uri"));
        assert_eq!(target.as_str(), "http://catalogue.internal/v1/api/products/7");
    }

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONNECTION,
            HeaderValue::from_static("keep-alive, x-session-hint"),
        );
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-session-hint", HeaderValue::from_static("abc"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[tokio::test]
    async fn unreachable_upstream_yields_fallback() {
        let request = Request::get("/api/products")
            .body(Body::empty())
            .expect("request");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let response = forward(State(upstream(&format!("http://{addr}"))), request).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["error"], FALLBACK_MESSAGE);
    }
}
