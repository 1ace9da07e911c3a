use fexec_common::protocol::error::{FexecError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ExecutorConfig;
use crate::executor::Executor;
use crate::fallback::{FallbackAddressStore, FallbackDelivery, FallbackListener};
use crate::http_server::InvocationServer;
use crate::registry::HandlerRegistry;

/// The whole sidecar: invocation server and fallback listener side by side.
///
/// The two endpoints share nothing in memory. Each builds its own view of the
/// fallback file from the configured path.
pub struct Sidecar {
    config: ExecutorConfig,
    registry: Arc<HandlerRegistry>,
}

impl Sidecar {
    /// Sidecar with the standard handler registry.
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            registry: Arc::new(HandlerRegistry::standard()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Binds both endpoints and serves until one of them fails.
    pub async fn run(self) -> Result<()> {
        self.config.validate()?;
        let invocation = bind(self.config.invocation_addr()).await?;
        let fallback = bind(self.config.fallback_listener_addr()?).await?;
        self.serve(invocation, fallback).await
    }

    /// Serves on listeners bound by the caller.
    pub async fn serve(self, invocation: TcpListener, fallback: TcpListener) -> Result<()> {
        let executor = Arc::new(Executor::new(self.registry, self.config.context.clone()));
        let delivery = Arc::new(
            FallbackDelivery::new(FallbackAddressStore::new(&self.config.fallback_file))
                .with_receive_port(self.config.receive_port)
                .with_attempt_timeout(self.config.delivery_timeout),
        );
        let listener = FallbackListener::new(FallbackAddressStore::new(&self.config.fallback_file));

        tracing::info!("Container services correctly initialized");
        tokio::try_join!(
            InvocationServer::new(executor, delivery).serve(invocation),
            listener.serve(fallback)
        )?;
        Ok(())
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| FexecError::Transport(format!("Failed to bind to {}: {}", addr, e)))
}
