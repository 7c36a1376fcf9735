use crate::harvest::pipeline::PipelineError;
use crate::harvest::traits::FetchError;
use crate::model::SourceInventory;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Registry listing failed: {0}")]
    Registry(#[from] FetchError),
    #[error("Local runtime listing failed: {0}")]
    Local(#[from] PipelineError),
    #[error("Executor error: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Returns the source ID this harvester reports under (e.g., "containerd", "harbor").
    fn source_id(&self) -> &str;

    /// Collects the source's images. Contained per-unit failures come back
    /// inside the inventory; only a failure of the whole source is an `Err`.
    async fn collect(&self) -> Result<SourceInventory, SourceError>;
}
