//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use axum::http::Method;
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::PathPredicate;

mod cli;

pub use cli::{CliArgs, Command, InvalidateArgs, ServeArgs, ServeOverrides, StoreOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "storegate";
const ENV_PREFIX: &str = "STOREGATE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_STORE_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_STORE_OPERATION_TIMEOUT_MS: u64 = 250;
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Characters with glob meaning in store key patterns.
const GLOB_SPECIALS: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub upstream: UpstreamSettings,
    pub routes: Vec<RouteSettings>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen_addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Store connection and limits shared by every caching route.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: StoreBackend,
    pub connect_timeout: Duration,
    pub operation_timeout: Duration,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store; entries are lost on restart and not shared between instances.
    Memory,
    Redis { url: Url },
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// One proxied path prefix.
#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub name: String,
    /// Path prefix, e.g. `/api/products`. Matches the prefix itself and anything below it.
    pub path: String,
    pub upstream: Url,
    pub cache: Option<RouteCacheSettings>,
}

#[derive(Debug, Clone)]
pub struct RouteCacheSettings {
    pub key_prefix: String,
    pub ttl: Duration,
    pub methods: Vec<Method>,
    pub path: PathPredicate,
    pub invalidate_on_write: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Invalidate(args)) => raw.apply_store_overrides(&args.store),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

/// Route table used when the configuration names none: the four backend
/// services, with the product catalogue cached.
pub fn default_routes(cache_ttl: Duration) -> Vec<RouteSettings> {
    [
        ("orders", "/api/orders", "http://127.0.0.1:8081", None),
        ("inventory", "/api/inventory", "http://127.0.0.1:8082", None),
        (
            "products",
            "/api/products",
            "http://127.0.0.1:8083",
            Some("products:cache:"),
        ),
        ("payments", "/api/payments", "http://127.0.0.1:8084", None),
    ]
    .into_iter()
    .filter_map(|(name, path, upstream, key_prefix)| {
        Some(RouteSettings {
            name: name.to_string(),
            path: path.to_string(),
            upstream: Url::parse(upstream).ok()?,
            cache: key_prefix.map(|prefix| RouteCacheSettings {
                key_prefix: prefix.to_string(),
                ttl: cache_ttl,
                methods: vec![Method::GET],
                path: PathPredicate::Any,
                invalidate_on_write: true,
            }),
        })
    })
    .collect()
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    upstream: RawUpstreamSettings,
    routes: Option<Vec<RawRouteSettings>>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(timeout) = overrides.cache_operation_timeout_ms {
            self.cache.operation_timeout_ms = Some(timeout);
        }

        self.apply_store_overrides(&overrides.store);
    }

    fn apply_store_overrides(&mut self, overrides: &StoreOverrides) {
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            upstream,
            routes,
        } = raw;

        let default_ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
        if default_ttl_secs == 0 {
            return Err(LoadError::invalid(
                "cache.default_ttl_seconds",
                "must be greater than zero",
            ));
        }

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let upstream = build_upstream_settings(upstream)?;
        let default_ttl = Duration::from_secs(default_ttl_secs);
        let routes = match routes {
            Some(routes) => build_routes(routes, default_ttl)?,
            None => default_routes(default_ttl),
        };

        Ok(Self {
            server,
            logging,
            cache,
            upstream,
            routes,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let listen_addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.listen_addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        listen_addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache
        .backend
        .as_deref()
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        None | Some("redis") => {
            let raw_url = cache
                .redis_url
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
            let url = Url::parse(raw_url.trim()).map_err(|err| {
                LoadError::invalid("cache.redis_url", format!("invalid URL `{raw_url}`: {err}"))
            })?;
            if !matches!(url.scheme(), "redis" | "rediss") {
                return Err(LoadError::invalid(
                    "cache.redis_url",
                    format!("unsupported scheme `{}`", url.scheme()),
                ));
            }
            StoreBackend::Redis { url }
        }
        Some("memory") => StoreBackend::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected redis or memory)"),
            ));
        }
    };

    let connect_timeout_ms = cache
        .connect_timeout_ms
        .unwrap_or(DEFAULT_STORE_CONNECT_TIMEOUT_MS);
    if connect_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.connect_timeout_ms",
            "must be greater than zero",
        ));
    }

    let operation_timeout_ms = cache
        .operation_timeout_ms
        .unwrap_or(DEFAULT_STORE_OPERATION_TIMEOUT_MS);
    if operation_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.operation_timeout_ms",
            "must be greater than zero",
        ));
    }

    let max_body_bytes_value = cache.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES);
    if max_body_bytes_value == 0 {
        return Err(LoadError::invalid(
            "cache.max_body_bytes",
            "must be greater than zero",
        ));
    }
    let max_body_bytes = usize::try_from(max_body_bytes_value).map_err(|_| {
        LoadError::invalid(
            "cache.max_body_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        connect_timeout: Duration::from_millis(connect_timeout_ms),
        operation_timeout: Duration::from_millis(operation_timeout_ms),
        max_body_bytes,
    })
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let request_secs = upstream
        .request_timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_REQUEST_TIMEOUT_SECS);
    if request_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let connect_secs = upstream
        .connect_timeout_seconds
        .unwrap_or(DEFAULT_UPSTREAM_CONNECT_TIMEOUT_SECS);
    if connect_secs == 0 {
        return Err(LoadError::invalid(
            "upstream.connect_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(UpstreamSettings {
        request_timeout: Duration::from_secs(request_secs),
        connect_timeout: Duration::from_secs(connect_secs),
    })
}

fn build_routes(
    routes: Vec<RawRouteSettings>,
    default_ttl: Duration,
) -> Result<Vec<RouteSettings>, LoadError> {
    let mut built: Vec<RouteSettings> = Vec::with_capacity(routes.len());

    for (index, route) in routes.into_iter().enumerate() {
        let route = build_route(index, route, default_ttl)?;
        if built.iter().any(|existing| existing.name == route.name) {
            return Err(LoadError::invalid(
                format!("routes[{index}].name"),
                format!("duplicate route name `{}`", route.name),
            ));
        }
        if built.iter().any(|existing| existing.path == route.path) {
            return Err(LoadError::invalid(
                format!("routes[{index}].path"),
                format!("duplicate route path `{}`", route.path),
            ));
        }
        built.push(route);
    }

    Ok(built)
}

fn build_route(
    index: usize,
    route: RawRouteSettings,
    default_ttl: Duration,
) -> Result<RouteSettings, LoadError> {
    let key = |field: &str| format!("routes[{index}].{field}");

    let name = route
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| LoadError::invalid(key("name"), "must not be empty"))?;

    let path = route
        .path
        .ok_or_else(|| LoadError::invalid(key("path"), "must be set"))?;
    validate_route_path(&path).map_err(|reason| LoadError::invalid(key("path"), reason))?;

    let raw_upstream = route
        .upstream
        .ok_or_else(|| LoadError::invalid(key("upstream"), "must be set"))?;
    let upstream = Url::parse(raw_upstream.trim()).map_err(|err| {
        LoadError::invalid(key("upstream"), format!("invalid URL `{raw_upstream}`: {err}"))
    })?;
    if !matches!(upstream.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            key("upstream"),
            format!("unsupported scheme `{}`", upstream.scheme()),
        ));
    }

    let cache = route
        .cache
        .map(|cache| build_route_cache(index, &name, cache, default_ttl))
        .transpose()?;

    Ok(RouteSettings {
        name,
        path,
        upstream,
        cache,
    })
}

fn build_route_cache(
    index: usize,
    route_name: &str,
    cache: RawRouteCacheSettings,
    default_ttl: Duration,
) -> Result<RouteCacheSettings, LoadError> {
    let key = |field: &str| format!("routes[{index}].cache.{field}");

    let key_prefix = cache
        .key_prefix
        .unwrap_or_else(|| format!("{route_name}:cache:"));
    if key_prefix.is_empty() {
        return Err(LoadError::invalid(key("key_prefix"), "must not be empty"));
    }
    if key_prefix.contains(GLOB_SPECIALS) {
        return Err(LoadError::invalid(
            key("key_prefix"),
            "must not contain glob characters (* ? [ ] \\)",
        ));
    }

    let ttl = match cache.ttl_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                key("ttl_seconds"),
                "must be greater than zero",
            ));
        }
        Some(seconds) => Duration::from_secs(seconds),
        None => default_ttl,
    };

    let methods = match cache.methods {
        Some(methods) if methods.is_empty() => {
            return Err(LoadError::invalid(key("methods"), "must not be empty"));
        }
        Some(methods) => methods
            .iter()
            .map(|method| parse_cacheable_method(method))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| LoadError::invalid(key("methods"), reason))?,
        None => vec![Method::GET],
    };

    let path = match cache.path_pattern {
        Some(pattern) => PathPredicate::pattern(&pattern).map_err(|err| {
            LoadError::invalid(key("path_pattern"), format!("invalid expression: {err}"))
        })?,
        None => PathPredicate::Any,
    };

    Ok(RouteCacheSettings {
        key_prefix,
        ttl,
        methods,
        path,
        invalidate_on_write: cache.invalidate_on_write.unwrap_or(true),
    })
}

fn validate_route_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("`{path}` must start with `/`"));
    }
    if path == "/" {
        return Err("the root path cannot be proxied as a prefix".to_string());
    }
    if path.ends_with('/') {
        return Err(format!("`{path}` must not end with `/`"));
    }
    if path.contains(['{', '}', '*']) {
        return Err(format!("`{path}` must be a literal prefix"));
    }
    Ok(())
}

fn parse_cacheable_method(raw: &str) -> Result<Method, String> {
    let method = Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid method `{raw}`"))?;
    if !method.is_safe() {
        return Err(format!("`{method}` responses cannot be cached"));
    }
    Ok(method)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    connect_timeout_ms: Option<u64>,
    operation_timeout_ms: Option<u64>,
    max_body_bytes: Option<u64>,
    default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    request_timeout_seconds: Option<u64>,
    connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRouteSettings {
    name: Option<String>,
    path: Option<String>,
    upstream: Option<String>,
    cache: Option<RawRouteCacheSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRouteCacheSettings {
    key_prefix: Option<String>,
    ttl_seconds: Option<u64>,
    methods: Option<Vec<String>>,
    path_pattern: Option<String>,
    invalidate_on_write: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

#[cfg(test)]
mod tests;
