use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use services::services::{config::ConversionConfig, conversion::ConversionService};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &ConversionConfig;

    fn conversion(&self) -> &ConversionService;

    /// Start the background sweep that evicts expired imports
    fn spawn_cache_eviction(&self) -> tokio::task::JoinHandle<()> {
        tracing::info!(
            "Evicting cached imports older than {}s every {}s",
            self.config().cache_ttl_secs,
            self.config().cache_sweep_interval_secs
        );
        self.conversion().spawn_cache_eviction()
    }
}
