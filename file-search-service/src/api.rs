//! HTTP API for the file search service.
//!
//! This module provides the REST API endpoints for:
//! - Health monitoring
//! - Batch document upload and deletion
//! - Store inspection and teardown
//! - Indexing progress as server-sent events

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    response::{Sse, sse::Event},
    routing::{delete, get, post},
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::service::FileSearchService;

pub mod documents;
pub mod store;
use documents::{delete_document_handler, upload_documents_handler};
use store::{clear_store_handler, get_store_handler};

/// Application state
pub struct AppState {
    pub service: Arc<FileSearchService>,
}

/// Build the API router
pub fn router(service: Arc<FileSearchService>) -> Router {
    let max_body_size = service.config().server.max_upload_bytes;
    let state = Arc::new(AppState { service });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/store", get(get_store_handler))
        .route("/store", delete(clear_store_handler))
        // Uploads get the configured body limit instead of axum's default
        .route(
            "/documents",
            post(upload_documents_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/documents/{display_name}", delete(delete_document_handler))
        .route("/progress", get(progress_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = state.service.config();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.service.uptime().as_secs(),
        model: config.gemini.model.clone(),
        store_display_name: config.gemini.store_display_name.clone(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    model: String,
    store_display_name: String,
}

// === Progress ===

/// Stream indexing progress events as they are relayed
async fn progress_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Progress subscriber connected");

    let stream = BroadcastStream::new(state.service.subscribe_progress()).filter_map(|message| {
        match message {
            Ok(event) => Event::default()
                .event("progress")
                .json_data(&event)
                .ok()
                .map(Ok),
            Err(lagged) => {
                debug!(error = %lagged, "Progress subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gemini::DocumentState;
    use crate::testing::{FakeApi, Script};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn test_app(api: FakeApi) -> (Arc<FakeApi>, Router) {
        let api = Arc::new(api);
        let mut config = AppConfig::default();
        config.gemini.api_key = "test-key".to_string();
        let service = Arc::new(FileSearchService::new(api.clone(), config));
        (api, router(service))
    }

    fn seeded() -> FakeApi {
        FakeApi::new()
            .with_store("fileSearchStores/s", "demo_filesearch_store")
            .with_document("fileSearchStores/s", "existing.pdf", DocumentState::Active)
    }

    fn multipart_body(files: &[(&str, &str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (filename, content_type, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn upload_request(uri: &str, files: &[(&str, &str, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(files))
            .unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_api, app) = test_app(FakeApi::new());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "gemini-2.5-flash");
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_batch_skips_existing() {
        let (api, app) = test_app(seeded());

        let response = app
            .oneshot(upload_request(
                "/api/documents",
                &[
                    ("existing.pdf", "application/pdf", "%PDF".as_bytes()),
                    ("new.txt", "text/plain", "hello".as_bytes()),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["succeeded"], 1);
        assert_eq!(body["skipped"], 1);
        assert_eq!(body["ready"], true);
        assert_eq!(body["skipped_files"][0], "existing.pdf");
        assert_eq!(
            api.calls_starting_with("upload_to_store"),
            vec!["upload_to_store:fileSearchStores/s:new.txt:text/plain:5"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_query_disables_skipping() {
        let (api, app) = test_app(seeded());

        let response = app
            .oneshot(upload_request(
                "/api/documents?skip_duplicates=false&sequential=true",
                &[("existing.pdf", "application/pdf", "%PDF".as_bytes())],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["succeeded"], 1);
        assert_eq!(api.calls_starting_with("upload_to_store").len(), 1);
    }

    #[tokio::test]
    async fn test_upload_without_files_is_rejected() {
        let (_api, app) = test_app(seeded());

        let response = app
            .oneshot(upload_request("/api/documents", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_upload_without_filename_is_rejected() {
        let (api, app) = test_app(seeded());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/documents")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["code"], "invalid_request");
        assert_eq!(body["message"], "Invalid request: File part is missing a filename");
        assert!(api.calls_starting_with("upload_to_store").is_empty());
    }

    #[tokio::test]
    async fn test_get_store_lists_documents() {
        let (_api, app) = test_app(seeded());

        let response = app
            .oneshot(Request::get("/api/store").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["name"], "fileSearchStores/s");
        assert_eq!(body["documents"][0]["displayName"], "existing.pdf");
        assert_eq!(body["documents"][0]["state"], "STATE_ACTIVE");
    }

    #[tokio::test]
    async fn test_get_store_listing_failure_is_an_error() {
        let (_api, app) = test_app(FakeApi::with_script(Script {
            fail_list_documents: true,
            ..Default::default()
        }));

        let response = app
            .oneshot(Request::get("/api/store").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_delete_document() {
        let (api, app) = test_app(seeded());

        let response = app
            .clone()
            .oneshot(
                Request::delete("/api/documents/existing.pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["deleted"], true);
        assert_eq!(api.calls_starting_with("delete_document").len(), 1);

        let response = app
            .oneshot(
                Request::delete("/api/documents/existing.pdf")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_store_reports_errors() {
        let (_api, app) = test_app(seeded().with_store("fileSearchStores/t", "unrelated"));
        let failing = FakeApi::with_script(Script {
            fail_delete_store: true,
            ..Default::default()
        })
        .with_store("fileSearchStores/s", "demo_filesearch_store");
        let (_failing_api, failing_app) = test_app(failing);

        let response = app
            .oneshot(Request::delete("/api/store").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["deleted"], true);
        assert_eq!(body["errors"].as_array().unwrap().len(), 0);

        let response = failing_app
            .oneshot(Request::delete("/api/store").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["deleted"], false);
        assert_eq!(
            body["errors"][0],
            "API error (status 403): permission denied"
        );
    }
}
