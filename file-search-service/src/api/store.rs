//! Store API endpoints.

use axum::{Json, extract::State};
use std::sync::Arc;

use crate::error::ServiceError;
use crate::service::StoreInfo;
use crate::store::ClearResult;

use super::AppState;

/// The session's store and its documents
pub async fn get_store_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoreInfo>, ServiceError> {
    Ok(Json(state.service.store_info().await?))
}

/// Delete the session's store. Failures are reported in the body.
pub async fn clear_store_handler(State(state): State<Arc<AppState>>) -> Json<ClearResult> {
    Json(state.service.clear_store().await)
}
