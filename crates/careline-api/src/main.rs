use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use careline_api::{router, AppState, PassthroughMediaUrlSigner, ServerConfig};
use careline_db::{Database, PoolConfig};
use careline_jobs::{
    register_listeners, AnalyticsForwarder, EmailService, EventBus, EventBusConfig,
    HttpEmailService, MessageComposer, TracingAnalyticsLogger, WorkerBuilder, WorkerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _log_guard = init_logging();

    let config = ServerConfig::from_env()?;

    let db = Database::connect_with_config(&config.database_url, PoolConfig::from_env()).await?;
    db.migrate().await?;
    info!(subsystem = "api", "Database ready");

    let store = db.store();
    let bus = Arc::new(EventBus::new(EventBusConfig::from_env()));
    let composer = Arc::new(MessageComposer::new(store.clone(), bus.clone()));

    register_listeners(&bus, store.clone(), composer.clone()).await;
    Arc::new(
        AnalyticsForwarder::new(Arc::new(TracingAnalyticsLogger))
            .with_store(db.analytics_store()),
    )
    .register(&bus)
    .await;

    // Scheduled-message worker
    let worker_config = WorkerConfig::from_env();
    let worker = if worker_config.enabled {
        let email = HttpEmailService::from_env()?.map(|s| Arc::new(s) as Arc<dyn EmailService>);
        if email.is_none() {
            info!(subsystem = "api", "EMAIL_SERVICE_URL not set, email deliveries stay queued");
        }
        let worker = WorkerBuilder::new(store.clone())
            .with_config(worker_config)
            .with_standard_deliverers(composer.clone(), email)
            .build()
            .await;
        Some(worker.start())
    } else {
        info!(subsystem = "api", "Scheduled message worker disabled");
        None
    };

    let signer = Arc::new(PassthroughMediaUrlSigner::new(config.media_url_expiration));
    let state = AppState::new(store, bus, composer, signer, config.app_url_scheme.clone());
    let app = router(state);

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(handle) = worker {
        handle.shutdown().await?;
    }
    info!("Server stopped");
    Ok(())
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors
///   RUST_LOG    - standard env filter
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "careline_api=debug,careline_jobs=info,careline_core=info,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("careline-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(log_ansi.unwrap_or(false)),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
