use crate::model::{ImageRecord, SourceErrorEntry, SourceInventory, UnifiedInventory};
use crate::traits::{InventorySource, SourceError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

pub struct InventoryExecutor {
    semaphore: Arc<Semaphore>,
}

impl InventoryExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    #[instrument(skip(self, source), fields(source = source.source_id()))]
    pub async fn execute(
        &self,
        source: &dyn InventorySource,
    ) -> Result<SourceInventory, SourceError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| SourceError::Unknown(format!("Semaphore error: {}", e)))?;

        info!("Starting harvest for source: {}", source.source_id());

        let result = source.collect().await;

        match &result {
            Ok(inventory) => info!(
                images = inventory.images.len(),
                failures = inventory.failures.len(),
                "Finished harvest for source: {}",
                source.source_id()
            ),
            Err(e) => error!(error = %e, "Harvest failed for source: {}", source.source_id()),
        }
        result
    }

    /// Harvests both sources concurrently and merges them into one report.
    ///
    /// Each source fills its own inventory; merging happens after both
    /// finish. A `None` source was not configured and is reported as such.
    pub async fn collect_all(
        &self,
        local: Option<&dyn InventorySource>,
        registry: Option<&dyn InventorySource>,
    ) -> UnifiedInventory {
        let (local_result, registry_result) =
            tokio::join!(self.run_optional(local), self.run_optional(registry));

        let mut errors = Vec::new();
        let containerd_images = merge(local_result, "containerd", &mut errors);
        let harbor_images = merge(registry_result, "harbor", &mut errors);

        UnifiedInventory {
            containerd_images,
            harbor_images,
            errors,
        }
    }

    async fn run_optional(
        &self,
        source: Option<&dyn InventorySource>,
    ) -> Option<Result<SourceInventory, SourceError>> {
        match source {
            Some(source) => Some(self.execute(source).await),
            None => None,
        }
    }
}

/// Returns a source's images and moves its failures into `errors`.
fn merge(
    result: Option<Result<SourceInventory, SourceError>>,
    source: &str,
    errors: &mut Vec<SourceErrorEntry>,
) -> Vec<ImageRecord> {
    match result {
        None => {
            warn!(source, "Source not configured");
            errors.push(SourceErrorEntry {
                source: source.to_string(),
                error: format!("{} configuration incomplete", source),
                unit: None,
            });
            Vec::new()
        }
        Some(Err(e)) => {
            errors.push(SourceErrorEntry {
                source: source.to_string(),
                error: e.to_string(),
                unit: None,
            });
            Vec::new()
        }
        Some(Ok(inventory)) => {
            errors.extend(inventory.failures.into_iter().map(|failure| SourceErrorEntry {
                source: source.to_string(),
                error: failure.error,
                unit: Some(failure.unit),
            }));
            inventory.images
        }
    }
}
