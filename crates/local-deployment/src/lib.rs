use std::sync::Arc;

use async_trait::async_trait;
use deployment::{Deployment, DeploymentError};
use services::services::{
    config::ConversionConfig,
    conversion::{Collaborators, ConversionService},
    file_area::TempFileArea,
};
use utils::assets::upload_root;

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<ConversionConfig>,
    conversion: ConversionService,
}

impl LocalDeployment {
    /// Assemble a deployment from an already configured service
    pub fn from_parts(config: ConversionConfig, conversion: ConversionService) -> Self {
        Self {
            config: Arc::new(config),
            conversion,
        }
    }
}

fn check_config(config: &ConversionConfig) -> Result<(), DeploymentError> {
    if config.cache_max_entries == 0 {
        return Err(DeploymentError::Config(
            "TOPOLOGY_CACHE_MAX_ENTRIES must be at least 1".to_string(),
        ));
    }
    if config.max_upload_bytes == 0 {
        return Err(DeploymentError::Config(
            "MAX_UPLOAD_BYTES must be at least 1".to_string(),
        ));
    }
    if config.overpass_url.trim().is_empty() {
        return Err(DeploymentError::Config("OVERPASS_URL is empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        let config = ConversionConfig::from_env();
        check_config(&config)?;

        let root = upload_root()?;
        let files = TempFileArea::new_in(&root)?;
        tracing::info!("Temporary file area: {}", files.path().display());

        let collaborators = Collaborators::builtin(&config);
        let conversion = ConversionService::new(collaborators, files, config.clone());

        Ok(Self::from_parts(config, conversion))
    }

    fn config(&self) -> &ConversionConfig {
        &self.config
    }

    fn conversion(&self) -> &ConversionService {
        &self.conversion
    }
}
