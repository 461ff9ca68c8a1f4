//! Gateway HTTP surface: one proxied sub-router per configured route, with
//! the response cache layered onto the routes that declare one.

mod middleware;
mod proxy;

pub use middleware::{CORRELATION_ID_HEADER, RequestContext, correlation_id, log_responses};
pub use proxy::{FALLBACK_MESSAGE, Upstream, forward};

use std::sync::Arc;

use axum::{
    Router,
    http::{StatusCode, Uri},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::any,
};
use tracing::info;

use crate::{
    cache::{CacheState, CacheStore, RouteCacheConfig, invalidate_on_write, response_cache_layer},
    config::{RouteSettings, Settings, UpstreamSettings},
    error::HttpError,
    infra::error::InfraError,
};

/// A route ready to be mounted, with its cache state when caching applies.
#[derive(Clone)]
pub struct GatewayRoute {
    pub settings: RouteSettings,
    pub cache: Option<CacheState>,
}

/// Pair each configured route with a cache when caching is enabled, a store
/// is available and the route declares a cache section.
pub fn gateway_routes(settings: &Settings, store: Option<Arc<dyn CacheStore>>) -> Vec<GatewayRoute> {
    settings
        .routes
        .iter()
        .map(|route| {
            let cache = match (&route.cache, &store) {
                (Some(route_cache), Some(store)) if settings.cache.enabled => {
                    Some(CacheState::new(
                        RouteCacheConfig::from_settings(&route.name, route_cache, &settings.cache),
                        store.clone(),
                    ))
                }
                _ => None,
            };
            GatewayRoute {
                settings: route.clone(),
                cache,
            }
        })
        .collect()
}

pub fn upstream_client(settings: &UpstreamSettings) -> Result<reqwest::Client, InfraError> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .build()
        .map_err(|err| InfraError::client(format!("failed to build upstream client: {err}")))
}

pub fn build_router(routes: Vec<GatewayRoute>, client: reqwest::Client) -> Router {
    let mut router = Router::new();

    for route in routes {
        let GatewayRoute { settings, cache } = route;
        let upstream = Upstream::new(&settings.name, settings.upstream.clone(), client.clone());

        let mut proxied = Router::new()
            .route(&settings.path, any(forward))
            .route(&format!("{}/{{*rest}}", settings.path), any(forward))
            .with_state(upstream);

        match cache {
            Some(cache) => {
                info!(
                    route = %settings.name,
                    path = %settings.path,
                    upstream = %settings.upstream,
                    key_prefix = cache.config.keys.prefix(),
                    ttl_secs = cache.config.ttl.as_secs(),
                    "mounted cached route"
                );
                proxied = proxied
                    .layer(from_fn_with_state(cache.clone(), response_cache_layer))
                    .layer(from_fn_with_state(cache, invalidate_on_write));
            }
            None => {
                info!(
                    route = %settings.name,
                    path = %settings.path,
                    upstream = %settings.upstream,
                    "mounted route"
                );
            }
        }

        router = router.merge(proxied);
    }

    router
        .fallback(not_found)
        .layer(from_fn(log_responses))
        .layer(from_fn(correlation_id))
}

async fn not_found(uri: Uri) -> Response {
    HttpError::new(
        "infra::http::not_found",
        StatusCode::NOT_FOUND,
        "not found",
        format!("no route for `{}`", uri.path()),
    )
    .into_response()
}
