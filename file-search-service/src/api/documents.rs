//! Document API endpoints.
//!
//! Batch upload through multipart forms and deletion by display name.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::batch::BatchResult;
use crate::error::ServiceError;
use crate::pipeline::UploadCandidate;
use crate::service::BatchOptions;

use super::AppState;

/// Upload query parameters
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// Override the configured duplicate-skip behaviour
    pub skip_duplicates: Option<bool>,
    /// Upload one file at a time with a live duplicate check per file
    #[serde(default)]
    pub sequential: bool,
}

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub display_name: String,
    pub deleted: bool,
}

/// Upload every `file` field of the form as one batch
pub async fn upload_documents_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>, ServiceError> {
    let mut candidates = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidRequest {
            message: e.to_string(),
        })?
    {
        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
        else {
            return Err(ServiceError::InvalidRequest {
                message: "File part is missing a filename".to_string(),
            });
        };
        let content_type = field.content_type().map(str::to_string);
        let content = field.bytes().await.map_err(|e| ServiceError::InvalidRequest {
            message: e.to_string(),
        })?;

        candidates.push(UploadCandidate::new(filename, content_type, content));
    }

    if candidates.is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "No files provided".to_string(),
        });
    }

    let options = BatchOptions {
        skip_duplicates: params.skip_duplicates,
        sequential: params.sequential,
    };
    let result = state.service.upload_batch(candidates, options).await?;

    Ok(Json(result))
}

/// Delete the first document with this display name
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    Path(display_name): Path<String>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    if state.service.delete_document(&display_name).await? {
        Ok(Json(DeleteResponse {
            display_name,
            deleted: true,
        }))
    } else {
        Err(ServiceError::DocumentNotFound { display_name })
    }
}
