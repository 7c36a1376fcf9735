//! Harvest module - image listing sources and their parsers.
//!
//! This module provides the building blocks behind each inventory source:
//! - **Traits**: [`ListingTransport`], [`CommandSource`], [`TableParser`] seams
//! - **Pagination**: exhaustive page walking via [`PaginatedFetcher`]
//! - **Registry**: project → repository → artifact traversal via [`RegistryHarvester`]
//! - **Table**: positional parsing of runtime listings via [`ColumnarTextParser`]
//! - **Pipeline**: timed local listing via [`LocalInventoryPipeline`]

pub mod http;
pub mod ignore;
pub mod pagination;
pub mod pipeline;
pub mod registry;
pub mod table;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use traits::{
    CommandSource, FetchError, HeaderDiagnostic, ListingResponse, ListingTransport, ParsedTable,
    ProcessError, TableParser, TransportError,
};

pub use http::{HttpSettings, HttpTransport};
pub use ignore::load_ignore_set;
pub use pagination::PaginatedFetcher;
pub use pipeline::{
    ExternalCommand, HarvestStats, LocalHarvest, LocalInventoryPipeline, PipelineError,
};
pub use registry::RegistryHarvester;
pub use table::ColumnarTextParser;
