//! Listing and lookup of the documents inside a store.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::ServiceResult;
use crate::gemini::{Document, FileSearchApi};

/// Display names present in a store at one point in time
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    names: HashSet<String>,
    /// False when the listing failed and the snapshot is empty for that reason
    pub complete: bool,
}

impl CatalogSnapshot {
    pub fn from_documents(documents: &[Document]) -> Self {
        Self {
            names: documents.iter().map(|d| d.display_name.clone()).collect(),
            complete: true,
        }
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.names.contains(display_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// Documents of a store, addressed by display name
pub struct DocumentCatalog<'a> {
    api: &'a dyn FileSearchApi,
    store_name: &'a str,
}

impl<'a> DocumentCatalog<'a> {
    pub fn new(api: &'a dyn FileSearchApi, store_name: &'a str) -> Self {
        Self { api, store_name }
    }

    /// All documents in the store. A failed listing is an error, not an empty list.
    pub async fn list(&self) -> ServiceResult<Vec<Document>> {
        Ok(self.api.list_documents(self.store_name).await?)
    }

    /// Duplicate-detection snapshot. A listing failure yields an empty snapshot
    /// flagged incomplete.
    pub async fn snapshot(&self) -> CatalogSnapshot {
        match self.list().await {
            Ok(documents) => CatalogSnapshot::from_documents(&documents),
            Err(e) => {
                warn!(
                    store = %self.store_name,
                    error = %e,
                    "Document listing failed, duplicate detection disabled for this batch"
                );
                CatalogSnapshot::default()
            }
        }
    }

    /// First document whose display name matches exactly (case-sensitive)
    pub async fn exists(&self, display_name: &str) -> ServiceResult<Option<Document>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|d| d.display_name == display_name))
    }

    /// Force-delete the first document matching `display_name`.
    ///
    /// Returns `Ok(false)` when nothing matches or the delete call is refused.
    pub async fn delete(&self, display_name: &str) -> ServiceResult<bool> {
        let Some(document) = self.exists(display_name).await? else {
            return Ok(false);
        };

        match self.api.delete_document(&document.name, true).await {
            Ok(()) => {
                info!(document = %document.name, display_name = %display_name, "Document deleted");
                Ok(true)
            }
            Err(e) => {
                warn!(document = %document.name, error = %e, "Document deletion failed");
                Ok(false)
            }
        }
    }
}
