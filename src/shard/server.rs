//! Shard replica server

use crate::common::{Result, ShardConfig};
use crate::coordinator::server::shutdown_signal;
use crate::shard::http::{create_router, ShardState};
use crate::shard::index::{InMemoryIndex, SearchBackend};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::OnceCell;

pub struct ShardServer {
    config: ShardConfig,
}

impl ShardServer {
    pub fn new(config: ShardConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener. The index loads in the
    /// background; `/internal/ready` reports 503 until it is done.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let config = self.config;

        tracing::info!("Starting shard replica: {}", config.replica_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Shard group: {}", config.shard_group_id);
        tracing::info!(
            "  Ownership: doc_id % {} == {}",
            config.num_shards,
            config.shard_index
        );

        let backend: Arc<OnceCell<Arc<dyn SearchBackend>>> = Arc::new(OnceCell::new());
        let loader = {
            let backend = backend.clone();
            let config = config.clone();
            tokio::spawn(async move {
                let index = match &config.data_path {
                    Some(path) => {
                        match InMemoryIndex::load(path, config.shard_index, config.num_shards)
                            .await
                        {
                            Ok(index) => index,
                            Err(e) => {
                                tracing::error!(path = %path.display(), error = %e, "Failed to load index");
                                return;
                            }
                        }
                    }
                    None => {
                        tracing::warn!("No data_path configured, serving an empty index");
                        InMemoryIndex::new()
                    }
                };
                let _ = backend.set(Arc::new(index) as Arc<dyn SearchBackend>);
                tracing::info!("✓ Shard replica ready");
            })
        };

        let router = create_router(ShardState {
            replica_id: config.replica_id.clone(),
            shard_group_id: config.shard_group_id.clone(),
            backend,
        });

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await;
        loader.abort();
        served?;

        tracing::info!("Shard replica {} stopped", config.replica_id);
        Ok(())
    }
}
