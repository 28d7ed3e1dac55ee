//! Helmsman control plane: the manager owns the node inventory, the
//! template catalog, business scheduling and the telemetry ingest path.

use anyhow::{Context, Result};
use helmsman_core::ManagerConfig;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

pub mod api;
pub mod business;
pub mod liveness;
pub mod metrics;
pub mod scheduler;
pub mod store;

use business::BusinessManager;
use liveness::LivenessMonitor;
use metrics::MetricsCache;
use store::Store;

/// Manager process wiring: store, metrics cache, business manager and the
/// liveness sweeper behind one HTTP surface.
pub struct Manager {
    config: ManagerConfig,
    store: Arc<Store>,
    cache: Arc<MetricsCache>,
    business: Arc<BusinessManager>,
    liveness: LivenessMonitor,
}

impl Manager {
    pub async fn new(config: ManagerConfig) -> Result<Self> {
        let store = Arc::new(
            Store::new(&config.db_path)
                .await
                .context("Failed to initialize store")?,
        );
        let cache = Arc::new(MetricsCache::new());
        let business = Arc::new(
            BusinessManager::new(Arc::clone(&store), Arc::clone(&cache), config.fanout)
                .context("Failed to initialize business manager")?,
        );
        let liveness = LivenessMonitor::new(Arc::clone(&store), config.liveness_secs);

        Ok(Self {
            config,
            store,
            cache,
            business,
            liveness,
        })
    }

    pub fn router(&self) -> axum::Router {
        api::create_router(api::ApiState {
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
            business: Arc::clone(&self.business),
        })
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Serve the control plane until the shutdown future resolves, then
    /// tear the background loops down.
    pub async fn serve(&self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        self.liveness.start().await;

        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind manager port {}", self.config.port))?;
        info!("Manager listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Manager HTTP server failed")?;

        self.liveness.stop().await;
        info!("Manager shutdown complete");
        Ok(())
    }
}
