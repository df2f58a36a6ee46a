use std::{process, sync::Arc};

use casale::{
    application::{
        error::AppError,
        properties::PropertyService,
        repos::{PropertiesRepo, PropertiesWriteRepo},
        seed,
    },
    cache::{CacheConfig, CacheStore, MemoryStore, PropertyCache, RedisStore},
    config::{self, CacheBackend},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use serde::Serialize;
use tokio::sync::oneshot;
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let app = build_application_context(&settings).await?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, app).await,
        config::Command::Warm(_) => print_json(&app.cache.warm().await?),
        config::Command::Stats(_) => run_stats(&app).await,
        config::Command::Metrics(args) => {
            if args.analysis {
                print_json(&app.cache.analysis().await)
            } else if args.trend {
                print_json(&app.cache.metrics_trend().await)
            } else {
                print_json(&app.cache.collect_metrics().await)
            }
        }
        config::Command::ResetMetrics(_) => print_json(&app.cache.reset_metrics().await),
        config::Command::Clear(args) => run_clear(&app, args).await,
        config::Command::Seed(args) => {
            let created = seed::seed_properties(&app.properties, args.count).await;
            print_json(&serde_json::json!({ "requested": args.count, "created": created }))
        }
    }
}

struct ApplicationContext {
    cache: Arc<PropertyCache>,
    properties: Arc<PropertyService>,
}

async fn build_application_context(
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let store = build_store(&settings.cache)?;
    let (reader, writer) = init_repositories(settings).await?;

    let cache = Arc::new(PropertyCache::new(
        store,
        reader,
        &CacheConfig::from(&settings.cache),
    ));
    let properties = Arc::new(PropertyService::new(writer, Arc::clone(&cache)));

    Ok(ApplicationContext { cache, properties })
}

fn build_store(cache: &config::CacheSettings) -> Result<Arc<dyn CacheStore>, AppError> {
    let store: Arc<dyn CacheStore> = match &cache.backend {
        CacheBackend::Memory => {
            let store = MemoryStore::new(cache.memory_max_entries);
            if cache.pattern_sweep {
                Arc::new(store)
            } else {
                Arc::new(store.without_pattern_support())
            }
        }
        CacheBackend::Redis { url } => {
            let store = RedisStore::open(url).map_err(InfraError::from)?;
            if cache.pattern_sweep {
                Arc::new(store)
            } else {
                Arc::new(store.without_pattern_support())
            }
        }
    };

    info!(
        backend = cache.backend.name(),
        pattern_sweep = store.supports_patterns(),
        "Cache store ready"
    );
    Ok(store)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<(Arc<dyn PropertiesRepo>, Arc<dyn PropertiesWriteRepo>), AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!("database url is not configured; listings are kept in memory");
        let repositories = Arc::new(InMemoryRepositories::new());
        let reader: Arc<dyn PropertiesRepo> = repositories.clone();
        let writer: Arc<dyn PropertiesWriteRepo> = repositories;
        return Ok((reader, writer));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let reader: Arc<dyn PropertiesRepo> = repositories.clone();
    let writer: Arc<dyn PropertiesWriteRepo> = repositories;
    Ok((reader, writer))
}

async fn run_serve(settings: &config::Settings, app: ApplicationContext) -> Result<(), AppError> {
    let metrics_handle = settings.cache.metrics_interval.map(|period| {
        let cache = Arc::clone(&app.cache);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let metrics = cache.collect_metrics().await;
                if !metrics.is_success() {
                    warn!(error = %metrics.message, "Periodic metrics collection failed");
                }
            }
        })
    });

    let state = HttpState {
        cache: app.cache,
        properties: app.properties,
    };
    let result = serve_http(settings, state).await;

    if let Some(handle) = metrics_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::listener(settings.server.addr, err)))?;
    info!(addr = %settings.server.addr, "Listening");

    let (signalled_tx, mut signalled_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .await
    });

    let joined = tokio::select! {
        joined = &mut server => joined,
        Ok(()) = &mut signalled_rx => {
            info!(
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "Shutdown requested; draining connections"
            );
            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("Graceful shutdown window elapsed; dropping open connections");
                    server.abort();
                    return Ok(());
                }
            }
        }
    };

    joined
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_stats(app: &ApplicationContext) -> Result<(), AppError> {
    #[derive(Serialize)]
    struct StatsOutput {
        cache: casale::cache::CacheStats,
        invalidations: casale::cache::InvalidationStats,
    }

    let output = StatsOutput {
        cache: app.cache.cache_stats().await?,
        invalidations: app.cache.invalidation_stats().await?,
    };
    print_json(&output)
}

async fn run_clear(app: &ApplicationContext, args: config::ClearArgs) -> Result<(), AppError> {
    let removed = match args.pattern.as_deref() {
        Some(pattern) => app.cache.clear_pattern(pattern).await?,
        None => app.cache.clear_all().await?,
    };
    print_json(&serde_json::json!({ "removed": removed, "pattern": args.pattern }))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
