//! Response capture on the MISS path.
//!
//! The downstream body is forwarded to the client chunk by chunk while a single
//! ordered copy is accumulated. Only after the body ended cleanly is the copy
//! handed to a detached task that writes it to the store; the client never
//! waits on that write.

use std::{sync::Arc, time::Duration};

use async_stream::stream;
use axum::{
    Error as BodyError,
    body::{Body, BodyDataStream},
    http::{HeaderName, HeaderValue},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use super::{
    keys::CacheKey,
    stats::CacheStats,
    store::{CacheStore, bounded},
};

/// Response header reporting the cache outcome.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

pub const HIT: HeaderValue = HeaderValue::from_static("HIT");
pub const MISS: HeaderValue = HeaderValue::from_static("MISS");

/// Where and how a captured body gets stored.
pub struct CaptureTarget {
    pub store: Arc<dyn CacheStore>,
    pub key: CacheKey,
    pub ttl: Duration,
    pub operation_timeout: Duration,
    pub max_body_bytes: usize,
    pub cache_name: String,
    pub stats: Arc<CacheStats>,
}

/// Tag a response as a miss without touching its body.
pub fn mark_miss(mut response: Response) -> Response {
    response.headers_mut().insert(X_CACHE, MISS);
    response
}

/// Wrap a downstream response so that a successful body populates the store
/// once it has been fully streamed.
pub fn capture(response: Response, target: CaptureTarget) -> Response {
    let response = mark_miss(response);
    if !response.status().is_success() {
        debug!(
            cache = %target.cache_name,
            key = %target.key,
            status = response.status().as_u16(),
            "response not stored"
        );
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = Body::from_stream(tee(body.into_data_stream(), target));
    Response::from_parts(parts, body)
}

fn tee(
    mut upstream: BodyDataStream,
    target: CaptureTarget,
) -> impl Stream<Item = Result<Bytes, BodyError>> + Send + 'static {
    stream! {
        let mut copy = BytesMut::new();
        let mut overflowed = false;
        let mut completed = true;

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    if !overflowed {
                        if copy.len() + bytes.len() > target.max_body_bytes {
                            overflowed = true;
                            copy = BytesMut::new();
                            debug!(
                                cache = %target.cache_name,
                                key = %target.key,
                                limit = target.max_body_bytes,
                                "body exceeds cacheable size, streaming without storing"
                            );
                        } else {
                            copy.extend_from_slice(&bytes);
                        }
                    }
                    yield Ok(bytes);
                }
                Err(err) => {
                    warn!(
                        cache = %target.cache_name,
                        key = %target.key,
                        error = %err,
                        "downstream body failed, nothing stored"
                    );
                    completed = false;
                    yield Err(err);
                    break;
                }
            }
        }

        if completed && !overflowed {
            persist(target, copy.freeze());
        }
    }
}

fn persist(target: CaptureTarget, body: Bytes) {
    let value = match String::from_utf8(body.to_vec()) {
        Ok(value) => value,
        Err(err) => {
            target
                .stats
                .record_store_error(&target.cache_name, "encoding");
            warn!(
                cache = %target.cache_name,
                key = %target.key,
                error = %err,
                "response body is not valid UTF-8, not stored"
            );
            return;
        }
    };

    tokio::spawn(async move {
        let result = bounded(
            "set",
            target.operation_timeout,
            target.store.set(target.key.as_str(), &value, target.ttl),
        )
        .await;

        match result {
            Ok(()) => {
                target.stats.record_write(&target.cache_name);
                debug!(
                    cache = %target.cache_name,
                    key = %target.key,
                    bytes = value.len(),
                    ttl_secs = target.ttl.as_secs(),
                    "response stored"
                );
            }
            Err(err) => {
                target
                    .stats
                    .record_store_error(&target.cache_name, err.kind());
                warn!(
                    cache = %target.cache_name,
                    key = %target.key,
                    error = %err,
                    "failed to store response"
                );
            }
        }
    });
}
