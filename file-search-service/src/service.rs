use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::info;

use crate::batch::{BatchOrchestrator, BatchResult};
use crate::catalog::DocumentCatalog;
use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::gemini::{Document, FileSearchApi};
use crate::pipeline::{UploadCandidate, UploadPipeline};
use crate::poller::PollSchedule;
use crate::progress::{ProgressEvent, ProgressRelay};
use crate::store::{ClearResult, StoreSession};

/// Capacity of the channel pipelines report progress into
const PROGRESS_CAPACITY: usize = 64;

/// Per-request batch options; `None` falls back to configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub skip_duplicates: Option<bool>,
    pub sequential: bool,
}

/// The session's store and what is in it
#[derive(Debug, Clone, Serialize)]
pub struct StoreInfo {
    pub name: String,
    pub display_name: String,
    pub documents: Vec<Document>,
}

/// Main service coordinator
pub struct FileSearchService {
    api: Arc<dyn FileSearchApi>,
    config: AppConfig,
    session: StoreSession,
    progress: ProgressRelay,
    started_at: Instant,
}

impl FileSearchService {
    /// Create a new service instance. Starts the progress relay, so this must run
    /// inside a tokio runtime.
    pub fn new(api: Arc<dyn FileSearchApi>, config: AppConfig) -> Self {
        info!(
            store = %config.gemini.store_display_name,
            model = %config.gemini.model,
            "Initializing file search service"
        );

        let session = StoreSession::new(api.clone(), config.gemini.store_display_name.clone());

        Self {
            api,
            session,
            progress: ProgressRelay::start(PROGRESS_CAPACITY),
            config,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Upload a batch into the session's store, resolving or creating the store first.
    ///
    /// The store name is read once here and stays fixed for the whole batch. The batch
    /// runs as its own task, so a caller that stops waiting does not cut uploads short.
    pub async fn upload_batch(
        &self,
        candidates: Vec<UploadCandidate>,
        options: BatchOptions,
    ) -> ServiceResult<BatchResult> {
        let store_name = self.session.current().await?;

        let pipeline = UploadPipeline::new(self.api.clone(), store_name.as_str())
            .with_schedule(PollSchedule::from(&self.config.polling))
            .with_temp_dir(self.config.storage.temp_dir.clone())
            .with_progress(Some(self.progress.sink()));

        let orchestrator = BatchOrchestrator::new(pipeline, &self.config.batch)
            .with_skip_duplicates(
                options
                    .skip_duplicates
                    .unwrap_or(self.config.batch.skip_duplicates),
            );

        let batch = tokio::spawn(async move {
            if options.sequential {
                orchestrator.run_sequential(candidates).await
            } else {
                orchestrator.run(candidates).await
            }
        });

        batch.await.map_err(|e| ServiceError::Internal {
            message: format!("Batch task failed: {}", e),
        })
    }

    pub async fn store_info(&self) -> ServiceResult<StoreInfo> {
        let store_name = self.session.current().await?;
        let documents = DocumentCatalog::new(self.api.as_ref(), &store_name)
            .list()
            .await?;

        Ok(StoreInfo {
            name: store_name.to_string(),
            display_name: self.session.display_name().to_string(),
            documents,
        })
    }

    /// Delete the first document named `display_name`. `false` when none matched or
    /// the delete was refused.
    pub async fn delete_document(&self, display_name: &str) -> ServiceResult<bool> {
        let store_name = self.session.current().await?;
        DocumentCatalog::new(self.api.as_ref(), &store_name)
            .delete(display_name)
            .await
    }

    /// Delete the session's store; the next call re-resolves a fresh one
    pub async fn clear_store(&self) -> ClearResult {
        self.session.clear().await
    }
}
