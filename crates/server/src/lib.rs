pub mod app_state;
pub mod classify;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod ports;
pub mod routes;
pub mod runtime;
pub mod services;
pub mod sidelog;
pub mod telemetry;
pub mod test_support;
pub mod validation;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::app_state::AppState;
use crate::forwarder::ForwarderRegistry;
use crate::metrics::init_metrics_recorder;
use crate::runtime::DynContainerRuntime;

/// Boot the server and block until shutdown.
pub async fn run() -> Result<()> {
    run_with_shutdown(shutdown_signal()).await
}

pub async fn run_with_shutdown<S>(shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app_config = config::load()?;
    let metrics_handle = init_metrics_recorder();

    let db = persistence::migrations::init_pool(&app_config.database.url).await?;
    let applied = persistence::migrations::run_migrations(&db).await?;
    if applied.is_empty() {
        info!("database schema is up to date");
    } else {
        for mig in &applied {
            info!(
                version = mig.version,
                description = mig.description,
                "applied database migration"
            );
        }
    }

    let runtime: DynContainerRuntime = Arc::new(runtime::DockerRuntime::connect()?);
    let state = AppState {
        db: db.clone(),
        runtime: runtime.clone(),
        forwarders: ForwarderRegistry::new(),
        raw_log: Arc::new(sidelog::FileRawLogSink::new(&app_config.raw_log.dir)),
        limits: app_config.limits.clone(),
        provision: app_config.provision.clone(),
        metrics_handle,
    };

    // Containers from a previous run keep producing logs; pick their streams
    // back up before accepting requests.
    let reattached = forwarder::reattach_forwarders(&db, &runtime, &state.forwarders).await?;
    info!(reattached, "log forwarders restored");

    let addr: SocketAddr = format!("{}:{}", app_config.server.host, app_config.server.port)
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid listen address: {}", err))?;

    let app = routes::build_router().with_state(state.clone());
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "apiary server listening");

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| anyhow::anyhow!("server failed: {err}"))?;

    Ok(())
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => stream.recv().await,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                None
            }
        };
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
}
