//! Single-file upload: stage locally, submit, wait for indexing, verify, clean up.

use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{ServiceResult, format_error_chain};
use crate::gemini::{DocumentState, FileSearchApi, Operation};
use crate::mime_type;
use crate::poller::{OperationPoller, PollOutcome, PollSchedule};
use crate::progress::ProgressSink;
use crate::staging;

/// A file supplied by the caller
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    /// Declared filename, used as the document's display name
    pub filename: String,
    /// Declared content type, if any
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl UploadCandidate {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, content: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            content,
        }
    }
}

/// Outcome for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl UploadResult {
    pub fn succeeded(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            error_message: None,
        }
    }

    pub fn failed(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            error_message: Some(message.into()),
        }
    }
}

/// Uploads files into one store. Cheap to clone; one clone per concurrent upload.
#[derive(Clone)]
pub struct UploadPipeline {
    api: Arc<dyn FileSearchApi>,
    store_name: Arc<str>,
    schedule: PollSchedule,
    temp_dir: Option<PathBuf>,
    progress: Option<ProgressSink>,
}

impl UploadPipeline {
    pub fn new(api: Arc<dyn FileSearchApi>, store_name: impl Into<Arc<str>>) -> Self {
        Self {
            api,
            store_name: store_name.into(),
            schedule: PollSchedule::default(),
            temp_dir: None,
            progress: None,
        }
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Stage local temp files in `dir` instead of the system temp dir
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.temp_dir = dir;
        self
    }

    pub fn with_progress(mut self, sink: Option<ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn api(&self) -> &dyn FileSearchApi {
        self.api.as_ref()
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Upload one file and report the outcome.
    ///
    /// The local temp file and any staged remote file are removed before this
    /// returns, whatever the outcome. If this future is dropped or unwinds first, the
    /// temp file is unlinked on drop and the staged file deletion is spawned instead.
    pub async fn run(&self, candidate: UploadCandidate) -> UploadResult {
        info!(filename = %candidate.filename, store = %self.store_name, "Uploading file");

        let temp = match self.persist(&candidate) {
            Ok(temp) => temp,
            Err(e) => {
                let message = format_error_chain(&e);
                warn!(filename = %candidate.filename, error = %message, "Failed to stage file locally");
                return UploadResult::failed(candidate.filename, message);
            }
        };

        let mut staged = StagedFileGuard::new(self.api.clone());
        let outcome = self
            .submit_and_wait(&candidate, temp.path(), &mut staged.name)
            .await;

        if let Err(e) = temp.close() {
            warn!(filename = %candidate.filename, error = %e, "Failed to remove temporary file");
        }
        staged.cleanup().await;

        match outcome {
            Ok(()) => {
                info!(filename = %candidate.filename, "File indexed");
                UploadResult::succeeded(candidate.filename)
            }
            Err(message) => {
                warn!(filename = %candidate.filename, error = %message, "File upload failed");
                UploadResult::failed(candidate.filename, message)
            }
        }
    }

    /// Write the candidate's bytes to a private temp file that is unlinked on drop
    fn persist(&self, candidate: &UploadCandidate) -> ServiceResult<NamedTempFile> {
        use std::io::Write;

        let suffix = Path::new(&candidate.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext))
            .unwrap_or_else(|| ".tmp".to_string());

        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(&suffix);
        let mut temp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        temp.write_all(&candidate.content)?;
        temp.flush()?;
        debug!(filename = %candidate.filename, path = %temp.path().display(), "Staged file locally");
        Ok(temp)
    }

    async fn submit_and_wait(
        &self,
        candidate: &UploadCandidate,
        local_path: &Path,
        staged_file: &mut Option<String>,
    ) -> Result<(), String> {
        let content_type =
            mime_type::classify(&candidate.filename, candidate.content_type.as_deref());

        let operation = staging::upload(
            self.api.as_ref(),
            &self.store_name,
            local_path,
            &candidate.filename,
            &content_type,
            staged_file,
        )
        .await
        .map_err(|e| format_error_chain(&e))?;

        let outcome = OperationPoller::new(self.api.as_ref(), self.schedule, &candidate.filename)
            .with_progress(self.progress.as_ref())
            .run(operation)
            .await
            .map_err(|e| format_error_chain(&e))?;

        match outcome {
            PollOutcome::Succeeded(operation) => self.verify(&operation).await,
            failed => Err(failed.failure_message().unwrap_or_default()),
        }
    }

    /// Check the indexed document is active. Without a document reference, or when
    /// the document cannot be fetched, an error-free operation counts as success.
    async fn verify(&self, operation: &Operation) -> Result<(), String> {
        let Some(document_name) = operation
            .response
            .as_ref()
            .and_then(|response| response.document_name.as_deref())
            .filter(|name| !name.is_empty())
        else {
            return Ok(());
        };

        match self.api.get_document(document_name).await {
            Ok(document) if document.state == DocumentState::Active => Ok(()),
            Ok(document) => Err(format!("Document state: {}", document.state)),
            Err(e) => {
                warn!(
                    document = %document_name,
                    error = %e,
                    "Could not verify document state, assuming success"
                );
                Ok(())
            }
        }
    }
}

/// Files API resource staged for one upload.
///
/// Deleted by `cleanup`; if the guard is dropped while still holding a name, the
/// deletion is spawned onto the current runtime.
struct StagedFileGuard {
    api: Arc<dyn FileSearchApi>,
    name: Option<String>,
}

impl StagedFileGuard {
    fn new(api: Arc<dyn FileSearchApi>) -> Self {
        Self { api, name: None }
    }

    async fn cleanup(mut self) {
        if let Some(name) = self.name.take() {
            delete_staged_file(self.api.as_ref(), &name).await;
        }
    }
}

impl Drop for StagedFileGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(staged_file = %name, "Upload abandoned, deleting staged file in background");
                let api = self.api.clone();
                handle.spawn(async move { delete_staged_file(api.as_ref(), &name).await });
            }
            Err(_) => warn!(staged_file = %name, "No runtime left to delete staged file"),
        }
    }
}

async fn delete_staged_file(api: &dyn FileSearchApi, staged_file: &str) {
    match api.delete_file(staged_file).await {
        Ok(()) => debug!(staged_file = %staged_file, "Deleted staged file"),
        Err(e) => warn!(staged_file = %staged_file, error = %e, "Failed to delete staged file"),
    }
}
