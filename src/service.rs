//! Wires configured sources to the executor.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::executor::InventoryExecutor;
use crate::harvest::http::HttpTransport;
use crate::harvest::pipeline::{ExternalCommand, LocalInventoryPipeline};
use crate::harvest::registry::RegistryHarvester;
use crate::harvest::table::ColumnarTextParser;
use crate::harvest::traits::TransportError;
use crate::model::{IgnoreSet, ImageRecord, SourceInventory, UnifiedInventory};
use crate::traits::{InventorySource, SourceError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} configuration incomplete")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Both inventory sources behind one executor.
pub struct InventoryService {
    executor: InventoryExecutor,
    local: Option<Arc<dyn InventorySource>>,
    registry: Option<Arc<dyn InventorySource>>,
}

impl InventoryService {
    pub fn new(
        executor: InventoryExecutor,
        local: Option<Arc<dyn InventorySource>>,
        registry: Option<Arc<dyn InventorySource>>,
    ) -> Self {
        Self {
            executor,
            local,
            registry,
        }
    }

    /// Builds the sources described by `settings`.
    ///
    /// The local source is skipped when no command is configured, the
    /// registry source when no URL is.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the registry HTTP client cannot be built.
    pub fn from_settings(
        settings: &Settings,
        ignore: Arc<IgnoreSet>,
    ) -> Result<Self, TransportError> {
        let local = match ExternalCommand::from_argv(&settings.runtime.command) {
            Some(command) => {
                info!(command = %settings.runtime.command.join(" "), "Local runtime source enabled");
                let pipeline = LocalInventoryPipeline::new(command, ColumnarTextParser::default())
                    .with_timeout(settings.runtime.timeout())
                    .with_ignore_set(ignore);
                Some(Arc::new(pipeline) as Arc<dyn InventorySource>)
            }
            None => {
                warn!("No runtime command configured, local source disabled");
                None
            }
        };

        let registry = if settings.registry.is_configured() {
            let transport = HttpTransport::new(settings.registry.http_settings())?;
            let harvester = RegistryHarvester::new(transport, &settings.registry.url)
                .with_page_size(settings.registry.page_size)
                .with_max_pages(settings.registry.max_pages);
            info!(api = harvester.api_base(), "Registry source enabled");
            Some(Arc::new(harvester) as Arc<dyn InventorySource>)
        } else {
            warn!("No registry URL configured, registry source disabled");
            None
        };

        Ok(Self::new(
            InventoryExecutor::new(settings.server.max_concurrent_harvests),
            local,
            registry,
        ))
    }

    /// Local runtime images.
    pub async fn local_images(&self) -> Result<Vec<ImageRecord>, ServiceError> {
        let source = self.local.as_deref().ok_or(ServiceError::NotConfigured("containerd"))?;
        Ok(self.executor.execute(source).await?.images)
    }

    /// Registry images plus the failures contained along the way.
    pub async fn registry_inventory(&self) -> Result<SourceInventory, ServiceError> {
        let source = self.registry.as_deref().ok_or(ServiceError::NotConfigured("harbor"))?;
        Ok(self.executor.execute(source).await?)
    }

    /// Both sources merged; never fails.
    pub async fn unified(&self) -> UnifiedInventory {
        self.executor
            .collect_all(self.local.as_deref(), self.registry.as_deref())
            .await
    }
}
