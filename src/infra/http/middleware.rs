use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::error::ErrorReport;

pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Longest inbound correlation id that is propagated as-is.
const MAX_CORRELATION_ID_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
}

/// Reuse the caller's `x-correlation-id` or mint one, forward it upstream and
/// echo it on the response.
pub async fn correlation_id(mut request: Request<Body>, next: Next) -> Response {
    let inbound = request
        .headers()
        .get(&CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= MAX_CORRELATION_ID_LEN)
        .map(str::to_string);

    let correlation_id = inbound.unwrap_or_else(|| Uuid::new_v4().to_string());
    let header_value = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = header_value.clone() {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    let ctx = RequestContext { correlation_id };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Some(value) = header_value {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.correlation_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("upstream", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "storegate::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                correlation_id = correlation_id,
                "request failed",
            );
        } else {
            warn!(
                target = "storegate::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                correlation_id = correlation_id,
                "client request error",
            );
        }
    }

    response
}
