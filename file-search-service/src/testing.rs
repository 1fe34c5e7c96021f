//! In-memory File Search API used by unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::GeminiError;
use crate::gemini::types::{OperationError, OperationResponse, RemoteFile};
use crate::gemini::{Document, DocumentState, FileSearchApi, Operation, Store};

/// Knobs for the fake's behaviour
#[derive(Debug, Clone)]
pub struct Script {
    pub fail_list_stores: bool,
    pub fail_list_documents: bool,
    /// Direct uploads answer with an API error (the classified fault)
    pub reject_direct_upload: bool,
    /// Direct uploads fail before reaching the API (unclassified)
    pub direct_upload_unreachable: bool,
    pub fail_import: bool,
    pub staged_file_without_name: bool,
    pub operation_without_name: bool,
    /// Number of `get_operation` calls before an operation reports done; 0 means
    /// already done when submitted
    pub done_after_fetches: u32,
    pub never_done: bool,
    /// Every `get_operation` call answers with an API error
    pub fail_get_operation: bool,
    pub operation_error: Option<(i32, String)>,
    pub omit_document_name: bool,
    pub document_state: DocumentState,
    pub fail_get_document: bool,
    pub fail_delete_file: bool,
    pub fail_delete_store: bool,
    pub fail_delete_document: bool,
    /// Display names whose direct upload fails with an unclassified fault
    pub failing_names: Vec<String>,
    /// Display names whose direct upload panics
    pub panicking_names: Vec<String>,
    pub upload_delay: Duration,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            fail_list_stores: false,
            fail_list_documents: false,
            reject_direct_upload: false,
            direct_upload_unreachable: false,
            fail_import: false,
            staged_file_without_name: false,
            operation_without_name: false,
            done_after_fetches: 0,
            never_done: false,
            fail_get_operation: false,
            operation_error: None,
            omit_document_name: false,
            document_state: DocumentState::Active,
            fail_get_document: false,
            fail_delete_file: false,
            fail_delete_store: false,
            fail_delete_document: false,
            failing_names: Vec::new(),
            panicking_names: Vec::new(),
            upload_delay: Duration::ZERO,
        }
    }
}

struct PendingOperation {
    store_name: String,
    display_name: String,
    fetches: u32,
}

/// Scriptable stand-in for the remote API that records every call
#[derive(Default)]
pub struct FakeApi {
    pub stores: Mutex<Vec<Store>>,
    pub documents: Mutex<Vec<Document>>,
    pub calls: Mutex<Vec<String>>,
    pub script: Mutex<Script>,
    operations: Mutex<HashMap<String, PendingOperation>>,
    staged_files: Mutex<HashMap<String, String>>,
    operation_fetches: AtomicU32,
    active_uploads: AtomicUsize,
    max_active_uploads: AtomicUsize,
    next_id: AtomicU32,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: Script) -> Self {
        let api = Self::new();
        *api.script.lock().unwrap() = script;
        api
    }

    pub fn with_store(self, name: &str, display_name: &str) -> Self {
        self.stores.lock().unwrap().push(Store {
            name: name.to_string(),
            display_name: display_name.to_string(),
        });
        self
    }

    pub fn with_document(self, store_name: &str, display_name: &str, state: DocumentState) -> Self {
        let id = self.next_id();
        self.documents.lock().unwrap().push(Document {
            name: format!("{}/documents/doc{}", store_name, id),
            display_name: display_name.to_string(),
            state,
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn operation_fetches(&self) -> u32 {
        self.operation_fetches.load(Ordering::SeqCst)
    }

    pub fn max_active_uploads(&self) -> usize {
        self.max_active_uploads.load(Ordering::SeqCst)
    }

    fn script(&self) -> Script {
        self.script.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn api_error(status: u16, message: &str) -> GeminiError {
        GeminiError::Api {
            status,
            message: message.to_string(),
        }
    }

    /// A fault that never reached the API
    fn unreachable_error(url: &str) -> GeminiError {
        let source = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("invalid URL must fail to build");
        GeminiError::Request {
            url: url.to_string(),
            source,
        }
    }

    fn start_operation(&self, store_name: &str, display_name: &str) -> Operation {
        let script = self.script();
        let name = format!("operations/op{}", self.next_id());
        self.operations.lock().unwrap().insert(
            name.clone(),
            PendingOperation {
                store_name: store_name.to_string(),
                display_name: display_name.to_string(),
                fetches: 0,
            },
        );

        let snapshot = if !script.never_done && script.done_after_fetches == 0 {
            self.finish_operation(&name)
        } else {
            Operation {
                name: Some(name.clone()),
                ..Default::default()
            }
        };

        Operation {
            name: if script.operation_without_name {
                None
            } else {
                Some(name)
            },
            ..snapshot
        }
    }

    fn finish_operation(&self, name: &str) -> Operation {
        let script = self.script();

        if let Some((code, message)) = script.operation_error {
            return Operation {
                name: Some(name.to_string()),
                done: true,
                error: Some(OperationError { code, message }),
                response: None,
            };
        }

        let operations = self.operations.lock().unwrap();
        let pending = operations.get(name).expect("unknown operation");
        let document_name = format!("{}/documents/doc{}", pending.store_name, self.next_id());

        self.documents.lock().unwrap().push(Document {
            name: document_name.clone(),
            display_name: pending.display_name.clone(),
            state: script.document_state,
        });

        Operation {
            name: Some(name.to_string()),
            done: true,
            error: None,
            response: Some(OperationResponse {
                document_name: if script.omit_document_name {
                    None
                } else {
                    Some(document_name)
                },
            }),
        }
    }
}

#[async_trait]
impl FileSearchApi for FakeApi {
    async fn list_stores(&self) -> Result<Vec<Store>, GeminiError> {
        self.record("list_stores".to_string());
        if self.script().fail_list_stores {
            return Err(Self::api_error(500, "list stores failed"));
        }
        Ok(self.stores.lock().unwrap().clone())
    }

    async fn create_store(&self, display_name: &str) -> Result<Store, GeminiError> {
        self.record(format!("create_store:{}", display_name));
        let store = Store {
            name: format!("fileSearchStores/store{}", self.next_id()),
            display_name: display_name.to_string(),
        };
        self.stores.lock().unwrap().push(store.clone());
        Ok(store)
    }

    async fn delete_store(&self, name: &str, force: bool) -> Result<(), GeminiError> {
        self.record(format!("delete_store:{}:{}", name, force));
        if self.script().fail_delete_store {
            return Err(Self::api_error(403, "permission denied"));
        }
        self.stores.lock().unwrap().retain(|s| s.name != name);
        self.documents
            .lock()
            .unwrap()
            .retain(|d| !d.name.starts_with(&format!("{}/", name)));
        Ok(())
    }

    async fn list_documents(&self, store_name: &str) -> Result<Vec<Document>, GeminiError> {
        self.record(format!("list_documents:{}", store_name));
        if self.script().fail_list_documents {
            return Err(Self::api_error(500, "list documents failed"));
        }
        Ok(self
            .documents
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.name.starts_with(&format!("{}/", store_name)))
            .cloned()
            .collect())
    }

    async fn get_document(&self, name: &str) -> Result<Document, GeminiError> {
        self.record(format!("get_document:{}", name));
        if self.script().fail_get_document {
            return Err(Self::api_error(500, "get document failed"));
        }
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.name == name)
            .cloned()
            .ok_or_else(|| Self::api_error(404, "document not found"))
    }

    async fn delete_document(&self, name: &str, force: bool) -> Result<(), GeminiError> {
        self.record(format!("delete_document:{}:{}", name, force));
        if self.script().fail_delete_document {
            return Err(Self::api_error(400, "document is not empty"));
        }
        self.documents.lock().unwrap().retain(|d| d.name != name);
        Ok(())
    }

    async fn upload_to_store(
        &self,
        store_name: &str,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<Operation, GeminiError> {
        self.record(format!(
            "upload_to_store:{}:{}:{}:{}",
            store_name,
            display_name,
            mime_type,
            content.len()
        ));
        let script = self.script();

        let active = self.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_uploads.fetch_max(active, Ordering::SeqCst);
        if !script.upload_delay.is_zero() {
            tokio::time::sleep(script.upload_delay).await;
        }
        self.active_uploads.fetch_sub(1, Ordering::SeqCst);

        if script.panicking_names.iter().any(|n| n == display_name) {
            panic!("upload of {} blew up", display_name);
        }
        if script.direct_upload_unreachable
            || script.failing_names.iter().any(|n| n == display_name)
        {
            return Err(Self::unreachable_error(store_name));
        }
        if script.reject_direct_upload {
            return Err(Self::api_error(400, "direct upload not supported"));
        }

        Ok(self.start_operation(store_name, display_name))
    }

    async fn upload_file(
        &self,
        content: Bytes,
        display_name: &str,
        mime_type: &str,
    ) -> Result<RemoteFile, GeminiError> {
        self.record(format!(
            "upload_file:{}:{}:{}",
            display_name,
            mime_type,
            content.len()
        ));
        if self.script().staged_file_without_name {
            return Ok(RemoteFile::default());
        }
        let name = format!("files/file{}", self.next_id());
        self.staged_files
            .lock()
            .unwrap()
            .insert(name.clone(), display_name.to_string());
        Ok(RemoteFile { name: Some(name) })
    }

    async fn import_file(
        &self,
        store_name: &str,
        file_name: &str,
    ) -> Result<Operation, GeminiError> {
        self.record(format!("import_file:{}:{}", store_name, file_name));
        if self.script().fail_import {
            return Err(Self::api_error(500, "import failed"));
        }
        let display_name = self
            .staged_files
            .lock()
            .unwrap()
            .get(file_name)
            .cloned()
            .unwrap_or_else(|| file_name.to_string());
        Ok(self.start_operation(store_name, &display_name))
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        self.record(format!("delete_file:{}", name));
        if self.script().fail_delete_file {
            return Err(Self::api_error(500, "delete file failed"));
        }
        Ok(())
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, GeminiError> {
        self.record(format!("get_operation:{}", name));
        self.operation_fetches.fetch_add(1, Ordering::SeqCst);
        let script = self.script();
        if script.fail_get_operation {
            return Err(Self::api_error(503, "operation lookup failed"));
        }

        let fetches = {
            let mut operations = self.operations.lock().unwrap();
            let pending = operations
                .get_mut(name)
                .ok_or_else(|| Self::api_error(404, "operation not found"))?;
            pending.fetches += 1;
            pending.fetches
        };

        if script.never_done || fetches < script.done_after_fetches {
            return Ok(Operation {
                name: Some(name.to_string()),
                ..Default::default()
            });
        }

        Ok(self.finish_operation(name))
    }
}
