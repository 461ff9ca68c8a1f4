use std::{process, sync::Arc};

use storegate::{
    cache::{self, CacheStore, Invalidator},
    config,
    error::AppError,
    infra::{error::InfraError, http, telemetry},
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Invalidate(args) => run_invalidate(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = open_store(&settings).await;
    let client = http::upstream_client(&settings.upstream)?;
    let routes = http::gateway_routes(&settings, store);
    let router = http::build_router(routes, client);

    let listener = tokio::net::TcpListener::bind(settings.server.listen_addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "storegate::serve",
        addr = %settings.server.listen_addr,
        routes = settings.routes.len(),
        "gateway listening"
    );

    let stopping = Arc::new(Notify::new());
    let signal = {
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            info!(target = "storegate::serve", "shutdown requested, draining connections");
            stopping.notify_one();
        }
    };

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(signal)
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(settings.server.graceful_shutdown).await;
        } => {
            warn!(
                target = "storegate::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out, dropping open connections"
            );
        }
    }

    Ok(())
}

/// Connect to the cache store when some route caches. A store that cannot be
/// reached at startup leaves the gateway serving uncached.
async fn open_store(settings: &config::Settings) -> Option<Arc<dyn CacheStore>> {
    if !settings.cache.enabled {
        info!(target = "storegate::serve", "response caching disabled");
        return None;
    }
    if settings.routes.iter().all(|route| route.cache.is_none()) {
        return None;
    }

    match cache::connect(&settings.cache).await {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(
                target = "storegate::serve",
                error = %err,
                "cache store unavailable, serving without response cache"
            );
            None
        }
    }
}

async fn run_invalidate(
    settings: config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let store = cache::connect(&settings.cache).await?;
    let removed = Invalidator::new(store, settings.cache.operation_timeout)
        .invalidate(&args.pattern)
        .await;

    info!(
        target = "storegate::invalidate",
        pattern = %args.pattern,
        removed,
        "invalidation finished"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
