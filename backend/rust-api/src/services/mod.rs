use std::sync::Arc;

use crate::config::Config;
use crate::storage::FormStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn FormStore>,
}

impl AppState {
    pub async fn new(config: Config, store: Arc<dyn FormStore>) -> anyhow::Result<Self> {
        tracing::info!("Checking store connectivity...");

        tokio::time::timeout(std::time::Duration::from_secs(5), store.ping())
            .await
            .map_err(|_| anyhow::anyhow!("Store ping timeout after 5s"))?
            .map_err(|e| anyhow::anyhow!("Store ping failed: {}", e))?;

        tracing::info!("Store connection established");

        Ok(Self { config, store })
    }
}

pub mod notifier;
pub mod scoring;
pub mod uploads;
pub mod workflow;
