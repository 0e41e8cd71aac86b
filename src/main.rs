mod config;
mod error;
mod evaluation;
mod repository;
mod routes;
mod scheduler;
mod state;

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, FeatureSource};
use crate::error::RepositoryError;
use crate::evaluation::FeatureManager;
use crate::repository::{
    FeatureRepository, FileFeatureRepository, InMemoryFeatureRepository, RemoteFeatureRepository,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feature_manager_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "feature manager service stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    let Some(repository) = build_repository(&config.source, shutdown_signal()).await? else {
        return Ok(());
    };
    let manager = Arc::new(FeatureManager::with_defaults(repository));
    warn_unregistered_filters(&manager);
    info!(?manager, "feature manager ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = scheduler::spawn_refresh(Arc::clone(&manager), config.refresh_interval, shutdown_rx);

    let state = state::AppState { manager };
    let app = routes::routes().with_state(state);

    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!("server is chilling at http://{}", config.addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    scheduler.await?;
    Ok(())
}

/// Returns `None` when `shutdown` fires before the initial remote load finishes.
async fn build_repository(
    source: &FeatureSource,
    shutdown: impl Future<Output = ()>,
) -> Result<Option<Arc<dyn FeatureRepository>>, RepositoryError> {
    let repository: Arc<dyn FeatureRepository> = match source {
        FeatureSource::Memory { seed_demo: true } => Arc::new(InMemoryFeatureRepository::with_demo_features()),
        FeatureSource::Memory { seed_demo: false } => Arc::new(InMemoryFeatureRepository::new()),
        FeatureSource::File(path) => {
            let file = FileFeatureRepository::open(path.clone())?;
            info!(path = %file.path().display(), "reading features from file");
            Arc::new(file)
        }
        FeatureSource::Remote(settings) => {
            let remote = RemoteFeatureRepository::new(settings.clone())?;
            tokio::select! {
                result = remote.refresh() => result?,
                _ = shutdown => {
                    info!("shutdown requested during initial remote load");
                    return Ok(None);
                }
            }
            Arc::new(remote)
        }
    };

    info!(
        source = repository.name(),
        features = repository.get_all_features().len(),
        "feature repository loaded"
    );
    Ok(Some(repository))
}

// Unregistered names are legal but silently route to the default filter.
fn warn_unregistered_filters(manager: &FeatureManager) {
    let filters = manager.filters();
    for def in manager.repository().get_all_features().values() {
        for config in def.filters.iter().filter(|c| !filters.contains(&c.name)) {
            warn!(
                feature = %def.name,
                filter = %config.name,
                registered = filters.len(),
                "feature references an unregistered filter"
            );
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
