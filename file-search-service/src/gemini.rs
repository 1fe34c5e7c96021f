//! Client for the Gemini File Search REST API.

pub mod types;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::GeminiConfig;
use crate::error::{GeminiError, ServiceError, ServiceResult};

pub use types::{Document, DocumentState, Operation, Store};
use types::{
    ApiErrorEnvelope, CreateStoreRequest, ImportFileRequest, ListDocumentsResponse,
    ListStoresResponse, RemoteFile, UploadFileMetadata, UploadFileResponse,
    UploadToStoreMetadata,
};

/// Page size requested from list endpoints
const PAGE_SIZE: u32 = 20;

/// Remote calls the ingestion pipeline depends on.
///
/// Resource names are the API's fully qualified names (`fileSearchStores/...`,
/// `files/...`, `operations/...`).
#[async_trait]
pub trait FileSearchApi: Send + Sync {
    async fn list_stores(&self) -> Result<Vec<Store>, GeminiError>;

    async fn create_store(&self, display_name: &str) -> Result<Store, GeminiError>;

    async fn delete_store(&self, name: &str, force: bool) -> Result<(), GeminiError>;

    async fn list_documents(&self, store_name: &str) -> Result<Vec<Document>, GeminiError>;

    async fn get_document(&self, name: &str) -> Result<Document, GeminiError>;

    async fn delete_document(&self, name: &str, force: bool) -> Result<(), GeminiError>;

    /// Upload bytes directly into a store
    async fn upload_to_store(
        &self,
        store_name: &str,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<Operation, GeminiError>;

    /// Upload bytes as a generic Files API resource
    async fn upload_file(
        &self,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, GeminiError>;

    /// Import a previously uploaded Files API resource into a store
    async fn import_file(&self, store_name: &str, file_name: &str)
    -> Result<Operation, GeminiError>;

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError>;

    async fn get_operation(&self, name: &str) -> Result<Operation, GeminiError>;
}

/// reqwest-backed File Search API client
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    /// Create a new client
    pub fn new(config: GeminiConfig) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("file-search-service/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ServiceError::Gemini(GeminiError::Request {
                    url: config.base_url.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.upload_base_url.trim_end_matches('/'),
            path
        )
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, GeminiError> {
        let response = request
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| GeminiError::Request {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status,
                message: api_error_message(&body),
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, GeminiError> {
        self.send(url, request)
            .await?
            .json()
            .await
            .map_err(|e| GeminiError::InvalidResponse {
                url: url.to_string(),
                source: e,
            })
    }

    /// Send a `multipart/related` media upload: JSON metadata followed by the raw bytes.
    async fn send_media<M: serde::Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        metadata: &M,
        content: Bytes,
        mime_type: &str,
    ) -> Result<T, GeminiError> {
        let boundary = format!("boundary_{}", uuid::Uuid::new_v4().simple());
        let metadata = serde_json::to_vec(metadata).unwrap_or_default();
        let body = multipart_related_body(&boundary, &metadata, &content, mime_type);

        debug!(url = %url, bytes = content.len(), mime_type = %mime_type, "Uploading media");

        let request = self
            .client
            .post(url)
            .header("X-Goog-Upload-Protocol", "multipart")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);

        self.send_json(url, request).await
    }
}

#[async_trait]
impl FileSearchApi for GeminiClient {
    async fn list_stores(&self) -> Result<Vec<Store>, GeminiError> {
        let mut stores = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = paged(&self.url("fileSearchStores"), page_token.as_deref());
            let page: ListStoresResponse = self.send_json(&url, self.client.get(&url)).await?;
            stores.extend(page.file_search_stores);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(stores)
    }

    async fn create_store(&self, display_name: &str) -> Result<Store, GeminiError> {
        let url = self.url("fileSearchStores");
        let request = self
            .client
            .post(&url)
            .json(&CreateStoreRequest { display_name });
        self.send_json(&url, request).await
    }

    async fn delete_store(&self, name: &str, force: bool) -> Result<(), GeminiError> {
        let url = format!("{}?force={}", self.url(name), force);
        self.send(&url, self.client.delete(&url)).await?;
        Ok(())
    }

    async fn list_documents(&self, store_name: &str) -> Result<Vec<Document>, GeminiError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let url = paged(
                &self.url(&format!("{}/documents", store_name)),
                page_token.as_deref(),
            );
            let page: ListDocumentsResponse = self.send_json(&url, self.client.get(&url)).await?;
            documents.extend(page.documents);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    async fn get_document(&self, name: &str) -> Result<Document, GeminiError> {
        let url = self.url(name);
        self.send_json(&url, self.client.get(&url)).await
    }

    async fn delete_document(&self, name: &str, force: bool) -> Result<(), GeminiError> {
        let url = format!("{}?force={}", self.url(name), force);
        self.send(&url, self.client.delete(&url)).await?;
        Ok(())
    }

    async fn upload_to_store(
        &self,
        store_name: &str,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<Operation, GeminiError> {
        let url = self.upload_url(&format!("{}:uploadToFileSearchStore", store_name));
        let metadata = UploadToStoreMetadata {
            display_name,
            mime_type,
        };
        self.send_media(&url, &metadata, content, mime_type).await
    }

    async fn upload_file(
        &self,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, GeminiError> {
        let url = self.upload_url("files");
        let metadata = UploadFileMetadata {
            file: UploadToStoreMetadata {
                display_name,
                mime_type,
            },
        };
        let response: UploadFileResponse =
            self.send_media(&url, &metadata, content, mime_type).await?;
        Ok(response.file)
    }

    async fn import_file(
        &self,
        store_name: &str,
        file_name: &str,
    ) -> Result<Operation, GeminiError> {
        let url = self.url(&format!("{}:importFile", store_name));
        let request = self.client.post(&url).json(&ImportFileRequest { file_name });
        self.send_json(&url, request).await
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let url = self.url(name);
        self.send(&url, self.client.delete(&url)).await?;
        Ok(())
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, GeminiError> {
        let url = self.url(name);
        self.send_json(&url, self.client.get(&url)).await
    }
}

/// Append paging parameters to a list URL
fn paged(url: &str, page_token: Option<&str>) -> String {
    match page_token {
        Some(token) => format!(
            "{}?pageSize={}&pageToken={}",
            url,
            PAGE_SIZE,
            urlencoding::encode(token)
        ),
        None => format!("{}?pageSize={}", url, PAGE_SIZE),
    }
}

/// Pull the human-readable message out of a Google API error body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.to_string())
}

fn multipart_related_body(
    boundary: &str,
    metadata: &[u8],
    content: &[u8],
    mime_type: &str,
) -> Bytes {
    let mut body = BytesMut::with_capacity(metadata.len() + content.len() + 256);

    body.put_slice(format!("--{}\r\n", boundary).as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(metadata);
    body.put_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.put_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.put_slice(content);
    body.put_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    body.freeze()
}
