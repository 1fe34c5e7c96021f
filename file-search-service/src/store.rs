//! Store lookup, creation and teardown.

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ServiceResult;
use crate::gemini::FileSearchApi;

/// Outcome of deleting a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearResult {
    pub deleted: bool,
    pub errors: Vec<String>,
}

/// Name of the first store whose display name matches exactly
pub async fn find_store(
    api: &dyn FileSearchApi,
    display_name: &str,
) -> ServiceResult<Option<String>> {
    let stores = api.list_stores().await?;
    Ok(stores
        .into_iter()
        .find(|s| s.display_name == display_name)
        .map(|s| s.name))
}

/// Return the name of the first store whose display name matches exactly, creating
/// one if none does.
///
/// Not serialized: two callers racing on an unseen display name can both create a store.
pub async fn resolve_or_create(api: &dyn FileSearchApi, display_name: &str) -> ServiceResult<String> {
    if let Some(name) = find_store(api, display_name).await? {
        info!(store = %name, display_name = %display_name, "Using existing store");
        return Ok(name);
    }

    let created = api.create_store(display_name).await?;
    info!(store = %created.name, display_name = %display_name, "Created store");
    Ok(created.name)
}

/// Delete a store and everything indexed in it.
///
/// Faults are reported in the result, never returned.
pub async fn clear(api: &dyn FileSearchApi, store_name: &str) -> ClearResult {
    match api.delete_store(store_name, true).await {
        Ok(()) => {
            info!(store = %store_name, "Store deleted");
            ClearResult {
                deleted: true,
                errors: Vec::new(),
            }
        }
        Err(e) => {
            warn!(store = %store_name, error = %e, "Store deletion failed");
            ClearResult {
                deleted: false,
                errors: vec![e.to_string()],
            }
        }
    }
}

/// The store handle for one service session.
///
/// Resolved lazily on first use and dropped again after a successful clear, so the
/// next caller re-resolves instead of reusing a deleted store.
pub struct StoreSession {
    api: Arc<dyn FileSearchApi>,
    display_name: String,
    store_name: ArcSwapOption<String>,
}

impl StoreSession {
    pub fn new(api: Arc<dyn FileSearchApi>, display_name: impl Into<String>) -> Self {
        Self {
            api,
            display_name: display_name.into(),
            store_name: ArcSwapOption::empty(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Cached store name, if one has been resolved
    pub fn cached(&self) -> Option<Arc<String>> {
        self.store_name.load_full()
    }

    /// Current store name, resolving (and possibly creating) it on first use
    pub async fn current(&self) -> ServiceResult<Arc<String>> {
        if let Some(name) = self.cached() {
            return Ok(name);
        }

        let name = Arc::new(resolve_or_create(self.api.as_ref(), &self.display_name).await?);
        self.store_name.store(Some(name.clone()));
        Ok(name)
    }

    /// Forget the cached store name
    pub fn invalidate(&self) {
        self.store_name.store(None);
    }

    /// Delete the session's store, invalidating the cache when deletion succeeds.
    ///
    /// An unresolved session looks the store up without creating it; with no store
    /// there is nothing to delete.
    pub async fn clear(&self) -> ClearResult {
        let found = match self.cached() {
            Some(name) => Ok(Some(name.to_string())),
            None => find_store(self.api.as_ref(), &self.display_name).await,
        };

        let store_name = match found {
            Ok(Some(name)) => name,
            Ok(None) => {
                info!(display_name = %self.display_name, "No store to delete");
                return ClearResult::default();
            }
            Err(e) => {
                return ClearResult {
                    deleted: false,
                    errors: vec![e.to_string()],
                };
            }
        };

        let result = clear(self.api.as_ref(), &store_name).await;
        if result.deleted {
            self.invalidate();
        }
        result
    }
}
