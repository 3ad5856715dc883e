//! Coordinator server

use crate::common::{CoordinatorConfig, Result};
use crate::coordinator::health::HealthMonitor;
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::quorum::QuorumExecutor;
use crate::coordinator::replica_client::{HttpReplicaClient, ReplicaTransport};
use crate::coordinator::service::CoordinatorService;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Coordinator {
    config: CoordinatorConfig,
    node_id: String,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, node_id: String) -> Self {
        Self { config, node_id }
    }

    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let groups = self.config.shard_groups()?;

        tracing::info!("Starting coordinator: {}", self.node_id);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!(
            "  Shard groups: {} ({} replicas)",
            groups.len(),
            groups.iter().map(|g| g.replica_count()).sum::<usize>()
        );
        tracing::info!("  Suspect policy: {:?}", self.config.suspect_policy);

        let health_policy = self.config.health_policy();
        let transport: Arc<dyn ReplicaTransport> =
            Arc::new(HttpReplicaClient::new(health_policy.probe_timeout)?);

        let monitor = Arc::new(HealthMonitor::new(
            &groups,
            transport.clone(),
            health_policy,
        ));
        let _probes = monitor.start();

        let executor = QuorumExecutor::new(monitor.clone(), transport, self.config.query_policy());
        let service = Arc::new(CoordinatorService::new(
            groups,
            executor,
            self.config.fail_open,
        ));

        let router = create_router(CoordState {
            node_id: self.node_id.clone(),
            service,
            monitor,
        });

        tracing::info!("✓ Coordinator ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Coordinator {} stopped", self.node_id);
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
