//! Wire types for the File Search REST API.
//!
//! Optional fields are typed as `Option`/defaulted so an absent field is a value,
//! not a lookup failure.

use serde::{Deserialize, Serialize};
use strum::Display;

/// A file search store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    /// Fully qualified resource name, e.g. `fileSearchStores/abc123`
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

/// Indexing state of a document inside a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentState {
    #[serde(rename = "STATE_PENDING", alias = "PROCESSING")]
    Processing,
    #[serde(rename = "STATE_ACTIVE", alias = "ACTIVE")]
    Active,
    #[serde(rename = "STATE_FAILED", alias = "FAILED")]
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A document inside a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Fully qualified resource name, e.g. `fileSearchStores/abc/documents/def`
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub state: DocumentState,
}

/// Snapshot of a long-running operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
    #[serde(default)]
    pub response: Option<OperationResponse>,
}

impl Operation {
    /// The operation's name, treating an empty string the same as a missing one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Error status carried by a finished operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Response payload of a finished upload/import operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub document_name: Option<String>,
}

/// A generic file created through the Files API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    #[serde(default)]
    pub name: Option<String>,
}

// Internal request/response envelopes

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateStoreRequest<'a> {
    pub display_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UploadToStoreMetadata<'a> {
    pub display_name: &'a str,
    pub mime_type: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadFileMetadata<'a> {
    pub file: UploadToStoreMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImportFileRequest<'a> {
    pub file_name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListStoresResponse {
    #[serde(default)]
    pub file_search_stores: Vec<Store>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadFileResponse {
    #[serde(default)]
    pub file: RemoteFile,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}
