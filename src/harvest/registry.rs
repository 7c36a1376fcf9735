//! Registry traversal: projects → repositories → artifacts → tags.
//!
//! Only the project listing is fatal. A failing repository listing is
//! recorded against its project, a failing artifact listing against its
//! repository, and the walk moves on to the next sibling.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::harvest::pagination::{PaginatedFetcher, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::harvest::traits::{FetchError, ListingTransport};
use crate::model::{
    Artifact, FailureScope, ImageRecord, Project, Repository, SourceInventory, Tag, UnitFailure,
    UNTAGGED,
};
use crate::traits::{InventorySource, SourceError};

/// Path of the listing API below the registry URL.
pub const API_PREFIX: &str = "/api/v2.0";

/// Walks a registry's listing API and flattens it into image records.
pub struct RegistryHarvester<T: ListingTransport> {
    transport: T,
    api_base: String,
    page_size: u32,
    max_pages: u32,
}

impl<T: ListingTransport> RegistryHarvester<T> {
    /// Creates a harvester for the registry at `registry_url`
    /// (e.g. `https://harbor.example.com`).
    pub fn new(transport: T, registry_url: &str) -> Self {
        Self {
            transport,
            api_base: format!("{}{}", registry_url.trim_end_matches('/'), API_PREFIX),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn fetcher(&self) -> PaginatedFetcher<'_, T> {
        PaginatedFetcher::new(&self.transport)
            .with_page_size(self.page_size)
            .with_max_pages(self.max_pages)
    }

    /// Collects every `(repository, tag)` pair visible in the registry.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] only when the project listing itself fails.
    /// Failures below that level are returned in
    /// [`SourceInventory::failures`] next to the records that were collected.
    #[instrument(skip(self), fields(api = %self.api_base))]
    pub async fn harvest(&self) -> Result<SourceInventory, FetchError> {
        let projects_url = format!("{}/projects", self.api_base);
        let projects = self
            .fetcher()
            .fetch_all(&projects_url, &[("with_detail", "false")])
            .await?;
        info!(count = projects.len(), "Fetched projects");

        let mut inventory = SourceInventory::default();

        for item in projects {
            let project = serde_json::from_value::<Project>(item.clone()).unwrap_or_default();
            let Some(project_name) = project.name.filter(|name| !name.is_empty()) else {
                warn!(project = %item, "Skipping project without a name");
                continue;
            };

            self.harvest_project(&project_name, &mut inventory).await;
        }

        info!(
            images = inventory.images.len(),
            failures = inventory.failures.len(),
            "Registry harvest complete"
        );
        Ok(inventory)
    }

    async fn harvest_project(&self, project: &str, inventory: &mut SourceInventory) {
        let repositories_url = format!(
            "{}/projects/{}/repositories",
            self.api_base,
            encode_path_segment(project)
        );
        let repositories = match self.fetcher().fetch_all(&repositories_url, &[]).await {
            Ok(repositories) => repositories,
            Err(e) => {
                warn!(project, error = %e, "Failed to list repositories");
                inventory.failures.push(UnitFailure {
                    scope: FailureScope::Project,
                    unit: project.to_string(),
                    url: repositories_url,
                    error: e.to_string(),
                });
                return;
            }
        };
        info!(project, count = repositories.len(), "Fetched repositories");

        for item in repositories {
            let repository = serde_json::from_value::<Repository>(item.clone()).unwrap_or_default();
            let Some(full_name) = repository.full_name.filter(|name| !name.is_empty()) else {
                warn!(project, repository = %item, "Skipping repository without a name");
                continue;
            };

            self.harvest_repository(project, &full_name, inventory).await;
        }
    }

    async fn harvest_repository(
        &self,
        project: &str,
        full_name: &str,
        inventory: &mut SourceInventory,
    ) {
        let path = derive_repository_path(project, full_name);
        let artifacts_url = format!(
            "{}/projects/{}/repositories/{}/artifacts",
            self.api_base,
            encode_path_segment(project),
            encode_path_segment(path)
        );

        let artifacts = match self
            .fetcher()
            .fetch_all(&artifacts_url, &[("with_tag", "true")])
            .await
        {
            Ok(artifacts) => artifacts,
            Err(e) if e.is_not_found() => {
                info!(repository = full_name, "No artifacts found (404)");
                return;
            }
            Err(e) => {
                warn!(repository = full_name, error = %e, "Failed to list artifacts");
                inventory.failures.push(UnitFailure {
                    scope: FailureScope::Repository,
                    unit: full_name.to_string(),
                    url: artifacts_url,
                    error: e.to_string(),
                });
                return;
            }
        };
        debug!(repository = full_name, count = artifacts.len(), "Fetched artifacts");

        for item in &artifacts {
            inventory
                .images
                .extend(artifact_records(project, full_name, item));
        }
    }
}

#[async_trait]
impl<T: ListingTransport> InventorySource for RegistryHarvester<T> {
    fn source_id(&self) -> &str {
        "harbor"
    }

    async fn collect(&self) -> Result<SourceInventory, SourceError> {
        Ok(self.harvest().await?)
    }
}

/// Records for one artifact: one per usable tag, or a single untagged
/// record when there is none.
fn artifact_records(project: &str, full_name: &str, item: &Value) -> Vec<ImageRecord> {
    let artifact = match serde_json::from_value::<Artifact>(item.clone()) {
        Ok(artifact) => artifact,
        Err(e) => {
            warn!(repository = full_name, error = %e, "Malformed artifact entry");
            Artifact::default()
        }
    };

    let digest = artifact.digest();
    let size = artifact.size();
    let record = |tag: String| ImageRecord {
        repository: full_name.to_string(),
        tag,
        image_id: None,
        digest: digest.clone(),
        size: size.clone(),
        project: Some(project.to_string()),
    };

    let mut records = Vec::new();
    for entry in artifact.tags.iter().flatten() {
        match serde_json::from_value::<Tag>(entry.clone()) {
            Ok(tag) if !tag.name.is_empty() => records.push(record(tag.name)),
            _ => warn!(
                repository = full_name,
                digest = digest.as_deref().unwrap_or("unknown"),
                tag = %entry,
                "Skipping null or malformed tag"
            ),
        }
    }

    if records.is_empty() {
        records.push(record(UNTAGGED.to_string()));
    }
    records
}

/// Repository path below its project: `"myproj/sub/app"` → `"sub/app"`.
///
/// Names without the `"{project}/"` prefix are used verbatim.
pub fn derive_repository_path<'a>(project: &str, full_name: &'a str) -> &'a str {
    match full_name
        .strip_prefix(project)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        Some(path) if !path.is_empty() => path,
        _ => {
            warn!(
                project,
                repository = full_name,
                "Repository name lacks the project prefix, using it verbatim"
            );
            full_name
        }
    }
}

/// Encodes one URL path segment, including any `/` it contains.
pub fn encode_path_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
