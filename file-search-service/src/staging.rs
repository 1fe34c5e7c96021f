//! Submission of a local file to a store.
//!
//! Tries the direct store upload first. When the API rejects that call the bytes are
//! staged through the Files API and imported into the store instead; the staged file
//! is left behind and must be deleted by the caller.

use bytes::Bytes;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ServiceError, ServiceResult};
use crate::gemini::{FileSearchApi, Operation};

/// Upload `local_path` into `store_name` and return the indexing operation.
///
/// The id of a Files API resource created by the fallback is written to `staged_file`
/// as soon as it exists, so it is visible to the caller even if the import fails or
/// this future is dropped.
pub async fn upload(
    api: &dyn FileSearchApi,
    store_name: &str,
    local_path: &Path,
    display_name: &str,
    content_type: &str,
    staged_file: &mut Option<String>,
) -> ServiceResult<Operation> {
    let content = Bytes::from(tokio::fs::read(local_path).await?);

    let primary = api
        .upload_to_store(store_name, content.clone(), display_name, content_type)
        .await;

    match primary {
        Ok(operation) => {
            debug!(display_name = %display_name, "Direct store upload accepted");
            Ok(operation)
        }
        Err(e) if e.is_classified() => {
            info!(
                display_name = %display_name,
                error = %e,
                "Direct store upload rejected, staging through Files API"
            );
            stage_and_import(api, store_name, content, display_name, content_type, staged_file)
                .await
        }
        Err(e) => Err(e.into()),
    }
}

async fn stage_and_import(
    api: &dyn FileSearchApi,
    store_name: &str,
    content: Bytes,
    display_name: &str,
    content_type: &str,
    staged_file: &mut Option<String>,
) -> ServiceResult<Operation> {
    let staged = api.upload_file(content, display_name, content_type).await?;

    let Some(name) = staged.name.filter(|name| !name.is_empty()) else {
        return Err(ServiceError::MalformedOperation {
            message: "Files API did not return a resource name.".to_string(),
        });
    };

    debug!(display_name = %display_name, staged_file = %name, "Staged file, importing");
    let name = staged_file.insert(name);

    Ok(api.import_file(store_name, name).await?)
}
