use super::*;

fn route(name: &str, path: &str) -> RawRouteSettings {
    RawRouteSettings {
        name: Some(name.to_string()),
        path: Some(path.to_string()),
        upstream: Some("http://127.0.0.1:9000".to_string()),
        cache: None,
    }
}

fn invalid_key(result: Result<Settings, LoadError>) -> String {
    match result {
        Err(LoadError::Invalid { key, .. }) => key,
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("settings should have been rejected"),
    }
}

#[test]
fn defaults_describe_the_local_gateway() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.listen_addr.to_string(), "127.0.0.1:8080");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
    assert!(settings.cache.enabled);
    assert_eq!(
        settings.cache.backend,
        StoreBackend::Redis {
            url: Url::parse("redis://127.0.0.1:6379").expect("url")
        }
    );
    assert_eq!(settings.cache.operation_timeout, Duration::from_millis(250));
    assert_eq!(settings.cache.max_body_bytes, 1024 * 1024);
    assert_eq!(settings.upstream.request_timeout, Duration::from_secs(30));
}

#[test]
fn default_routes_cache_only_products() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let paths: Vec<_> = settings.routes.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        ["/api/orders", "/api/inventory", "/api/products", "/api/payments"]
    );

    let cached: Vec<_> = settings
        .routes
        .iter()
        .filter(|r| r.cache.is_some())
        .collect();
    assert_eq!(cached.len(), 1);
    let products = cached[0].cache.as_ref().expect("products cache");
    assert_eq!(cached[0].name, "products");
    assert_eq!(products.key_prefix, "products:cache:");
    assert_eq!(products.ttl, Duration::from_secs(600));
    assert_eq!(products.methods, vec![Method::GET]);
    assert!(products.invalidate_on_write);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.backend = Some("redis".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_enabled: Some(false),
        store: StoreOverrides {
            cache_backend: Some("memory".to_string()),
            redis_url: None,
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.listen_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert!(!settings.cache.enabled);
    assert_eq!(settings.cache.backend, StoreBackend::Memory);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());
    assert_eq!(invalid_key(Settings::from_raw(raw)), "cache.backend");
}

#[test]
fn non_redis_store_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some("http://127.0.0.1:6379".to_string());
    assert_eq!(invalid_key(Settings::from_raw(raw)), "cache.redis_url");
}

#[test]
fn zero_operation_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.operation_timeout_ms = Some(0);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "cache.operation_timeout_ms");
}

#[test]
fn configured_routes_replace_the_defaults() {
    let mut raw = RawSettings::default();
    raw.cache.default_ttl_seconds = Some(120);
    let mut products = route("catalogue", "/api/catalogue");
    products.cache = Some(RawRouteCacheSettings {
        methods: Some(vec!["get".to_string(), "HEAD".to_string()]),
        path_pattern: Some("/api/catalogue(/[0-9]+)?".to_string()),
        ..Default::default()
    });
    raw.routes = Some(vec![route("orders", "/api/orders"), products]);

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.routes.len(), 2);
    let cache = settings.routes[1].cache.as_ref().expect("cache section");
    assert_eq!(cache.key_prefix, "catalogue:cache:");
    assert_eq!(cache.ttl, Duration::from_secs(120));
    assert_eq!(cache.methods, vec![Method::GET, Method::HEAD]);
    assert!(cache.path.matches("/api/catalogue/12"));
    assert!(!cache.path.matches("/api/catalogue/abc"));
}

#[test]
fn route_paths_must_be_literal_prefixes() {
    for path in ["api/orders", "/", "/api/orders/", "/api/{id}"] {
        let mut raw = RawSettings::default();
        raw.routes = Some(vec![route("orders", path)]);
        assert_eq!(invalid_key(Settings::from_raw(raw)), "routes[0].path", "{path}");
    }
}

#[test]
fn duplicate_routes_are_rejected() {
    let mut raw = RawSettings::default();
    raw.routes = Some(vec![
        route("orders", "/api/orders"),
        route("orders", "/api/orders-v2"),
    ]);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "routes[1].name");

    let mut raw = RawSettings::default();
    raw.routes = Some(vec![
        route("orders", "/api/orders"),
        route("orders-v2", "/api/orders"),
    ]);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "routes[1].path");
}

#[test]
fn write_methods_cannot_be_cached() {
    let mut raw = RawSettings::default();
    let mut orders = route("orders", "/api/orders");
    orders.cache = Some(RawRouteCacheSettings {
        methods: Some(vec!["POST".to_string()]),
        ..Default::default()
    });
    raw.routes = Some(vec![orders]);
    assert_eq!(invalid_key(Settings::from_raw(raw)), "routes[0].cache.methods");
}

#[test]
fn key_prefix_must_not_contain_glob_characters() {
    let mut raw = RawSettings::default();
    let mut orders = route("orders", "/api/orders");
    orders.cache = Some(RawRouteCacheSettings {
        key_prefix: Some("orders:*".to_string()),
        ..Default::default()
    });
    raw.routes = Some(vec![orders]);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "routes[0].cache.key_prefix"
    );
}

#[test]
fn invalid_path_pattern_is_rejected() {
    let mut raw = RawSettings::default();
    let mut orders = route("orders", "/api/orders");
    orders.cache = Some(RawRouteCacheSettings {
        path_pattern: Some("(".to_string()),
        ..Default::default()
    });
    raw.routes = Some(vec![orders]);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "routes[0].cache.path_pattern"
    );
}

#[test]
fn zero_route_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    let mut orders = route("orders", "/api/orders");
    orders.cache = Some(RawRouteCacheSettings {
        ttl_seconds: Some(0),
        ..Default::default()
    });
    raw.routes = Some(vec![orders]);
    assert_eq!(
        invalid_key(Settings::from_raw(raw)),
        "routes[0].cache.ttl_seconds"
    );
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["storegate"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "storegate",
        "serve",
        "--server-port",
        "9090",
        "--cache-enabled",
        "false",
        "--redis-url",
        "redis://cache.internal:6379",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_port, Some(9090));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(
                serve.overrides.store.redis_url.as_deref(),
                Some("redis://cache.internal:6379")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_invalidate_arguments() {
    let args = CliArgs::parse_from([
        "storegate",
        "invalidate",
        "--cache-backend",
        "memory",
        "products:cache:*",
    ]);

    match args.command.expect("invalidate command") {
        Command::Invalidate(invalidate) => {
            assert_eq!(invalidate.pattern, "products:cache:*");
            assert_eq!(invalidate.store.cache_backend.as_deref(), Some("memory"));
        }
        _ => panic!("wrong command parsed"),
    }
}
