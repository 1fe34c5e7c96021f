//! Multi-file uploads: duplicate partitioning, bounded fan-out, aggregation.

use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::{CatalogSnapshot, DocumentCatalog};
use crate::config::BatchConfig;
use crate::pipeline::{UploadCandidate, UploadPipeline, UploadResult};

/// Aggregate outcome of one batch.
///
/// `succeeded + failed + skipped` always equals the number of candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// At least one file was indexed and the store can be queried
    pub ready: bool,
    /// False when the duplicate check could not list the store's documents
    pub catalog_complete: bool,
    pub skipped_files: Vec<String>,
    /// Per-file results of dispatched candidates, in completion order
    pub results: Vec<UploadResult>,
}

impl BatchResult {
    fn aggregate(
        results: Vec<UploadResult>,
        skipped_files: Vec<String>,
        catalog_complete: bool,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;

        Self {
            succeeded,
            failed,
            skipped: skipped_files.len(),
            ready: succeeded > 0,
            catalog_complete,
            skipped_files,
            results,
        }
    }
}

/// Runs upload pipelines for a batch of candidates against one store
pub struct BatchOrchestrator {
    pipeline: UploadPipeline,
    max_concurrent: usize,
    skip_duplicates: bool,
}

impl BatchOrchestrator {
    pub fn new(pipeline: UploadPipeline, config: &BatchConfig) -> Self {
        Self {
            pipeline,
            max_concurrent: config.max_concurrent.max(1),
            skip_duplicates: config.skip_duplicates,
        }
    }

    pub fn with_skip_duplicates(mut self, skip_duplicates: bool) -> Self {
        self.skip_duplicates = skip_duplicates;
        self
    }

    /// Upload `candidates` with a bounded worker pool.
    ///
    /// Duplicates are judged against one catalog snapshot taken before dispatch, so two
    /// candidates sharing a name within the same batch are both uploaded.
    pub async fn run(&self, candidates: Vec<UploadCandidate>) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", id = %batch_id, store = %self.pipeline.store_name());
        self.run_pooled(candidates).instrument(span).await
    }

    /// Upload `candidates` one at a time, checking the live catalog before each file.
    pub async fn run_sequential(&self, candidates: Vec<UploadCandidate>) -> BatchResult {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", id = %batch_id, store = %self.pipeline.store_name());
        self.run_one_by_one(candidates).instrument(span).await
    }

    async fn run_pooled(&self, candidates: Vec<UploadCandidate>) -> BatchResult {
        let total = candidates.len();
        let snapshot = self.snapshot().await;

        let (duplicates, dispatch): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|c| self.skip_duplicates && snapshot.contains(&c.filename));
        let skipped_files: Vec<String> = duplicates.into_iter().map(|c| c.filename).collect();
        for filename in &skipped_files {
            info!(filename = %filename, "Skipping file already present in store");
        }

        let results = self.dispatch(dispatch).await;
        let result = BatchResult::aggregate(results, skipped_files, snapshot.complete);
        log_summary(total, &result);
        result
    }

    async fn snapshot(&self) -> CatalogSnapshot {
        if !self.skip_duplicates {
            return CatalogSnapshot::from_documents(&[]);
        }

        let snapshot = DocumentCatalog::new(self.pipeline.api(), self.pipeline.store_name())
            .snapshot()
            .await;
        debug!(existing = snapshot.len(), "Took catalog snapshot");
        snapshot
    }

    /// Keep at most `max_concurrent` pipelines in flight, refilling as each completes.
    async fn dispatch(&self, candidates: Vec<UploadCandidate>) -> Vec<UploadResult> {
        let mut pending: VecDeque<UploadCandidate> = candidates.into();
        let mut results = Vec::with_capacity(pending.len());
        let mut in_flight = Vec::new();
        let mut join_errors = Vec::new();
        let mut join_set = JoinSet::new();

        while join_set.len() < self.max_concurrent {
            let Some(candidate) = pending.pop_front() else {
                break;
            };
            in_flight.push(candidate.filename.clone());
            join_set.spawn(isolated(self.pipeline.clone(), candidate).in_current_span());
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    let finished = in_flight.iter().position(|name| *name == result.filename);
                    if let Some(index) = finished {
                        in_flight.swap_remove(index);
                    }
                    results.push(result);
                }
                Err(e) => {
                    // Tasks are never aborted, and panics are caught inside the task
                    warn!(error = %e, "Upload task did not complete");
                    join_errors.push(e);
                }
            }

            if let Some(candidate) = pending.pop_front() {
                in_flight.push(candidate.filename.clone());
                join_set.spawn(isolated(self.pipeline.clone(), candidate).in_current_span());
            }
        }

        results.extend(unjoined(in_flight, join_errors));
        results
    }

    async fn run_one_by_one(&self, candidates: Vec<UploadCandidate>) -> BatchResult {
        let total = candidates.len();
        let catalog = DocumentCatalog::new(self.pipeline.api(), self.pipeline.store_name());
        let mut catalog_complete = true;
        let mut skipped_files = Vec::new();
        let mut results = Vec::with_capacity(total);

        for candidate in candidates {
            if self.skip_duplicates {
                match catalog.exists(&candidate.filename).await {
                    Ok(Some(_)) => {
                        info!(filename = %candidate.filename, "Skipping file already present in store");
                        skipped_files.push(candidate.filename);
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            filename = %candidate.filename,
                            error = %e,
                            "Duplicate check failed, uploading anyway"
                        );
                        catalog_complete = false;
                    }
                }
            }

            results.push(isolated(self.pipeline.clone(), candidate).await);
        }

        let result = BatchResult::aggregate(results, skipped_files, catalog_complete);
        log_summary(total, &result);
        result
    }
}

/// Run one pipeline, turning a panic into a failed result
async fn isolated(pipeline: UploadPipeline, candidate: UploadCandidate) -> UploadResult {
    let filename = candidate.filename.clone();
    match AssertUnwindSafe(pipeline.run(candidate)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = exception_message(&*panic);
            warn!(filename = %filename, error = %message, "Upload pipeline panicked");
            UploadResult::failed(filename, message)
        }
    }
}

/// Failed results for tasks that ended without reporting. Every other task has
/// removed its filename from `in_flight`, so the leftovers belong to these errors.
fn unjoined(in_flight: Vec<String>, errors: Vec<JoinError>) -> Vec<UploadResult> {
    in_flight
        .into_iter()
        .zip(errors)
        .map(|(filename, e)| {
            UploadResult::failed(filename, format!("Generated an exception: {}", e))
        })
        .collect()
}

fn exception_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    format!("Generated an exception: {}", detail)
}

fn log_summary(total: usize, result: &BatchResult) {
    info!(
        total,
        succeeded = result.succeeded,
        failed = result.failed,
        skipped = result.skipped,
        ready = result.ready,
        catalog_complete = result.catalog_complete,
        "Batch finished"
    );
}
