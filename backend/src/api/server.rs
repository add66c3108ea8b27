//! HTTP server for the SurveyQuant API.
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/upload`     | Upload a survey export for transform |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//!
//! `/api/upload` takes a multipart form with a `file` field and, optionally,
//! `registry_id` (stored registry), `registry` (inline registry JSON),
//! `example=true` (built-in registry) and `skip_rows`. Without a registry
//! field the best compatible stored registry is used.

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LOG_BROADCASTER};
use super::types::{error_response, UploadResponse};
use crate::config::AppConfig;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::transform::pipeline::{transform_bytes, RegistrySource, TransformOptions};

type ApiError = (StatusCode, Json<Value>);

/// Build the router.
pub fn router(config: AppConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(config))
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> ServerResult<()> {
    let port = config.port;
    let app = router(config);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 SurveyQuant server running on http://localhost:{}", port);
    println!("   POST /api/upload - Upload survey export");
    println!("   GET  /api/logs   - SSE log stream");
    println!("   GET  /health     - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "surveyquant",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers just skip what they missed.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Fields collected from the upload form.
#[derive(Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    file_name: Option<String>,
    registry_id: Option<String>,
    registry: Option<String>,
    example: bool,
    skip_rows: usize,
}

impl UploadForm {
    fn registry_source(&self) -> RegistrySource {
        if let Some(json) = &self.registry {
            RegistrySource::Inline(json.clone())
        } else if let Some(id) = &self.registry_id {
            RegistrySource::Stored(id.clone())
        } else if self.example {
            RegistrySource::Example
        } else {
            RegistrySource::Auto
        }
    }
}

async fn read_form(mut multipart: Multipart) -> ServerResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                form.file = Some(bytes.to_vec());
            }
            "registry_id" | "registry" | "example" | "skip_rows" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                match name.as_str() {
                    "registry_id" => form.registry_id = Some(text),
                    "registry" => form.registry = Some(text),
                    "example" => form.example = matches!(text.as_str(), "true" | "1" | "yes"),
                    _ => {
                        form.skip_rows = text.parse().map_err(|_| {
                            ServerError::BadRequest(format!("skip_rows must be a number, got '{}'", text))
                        })?
                    }
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn upload(
    State(config): State<Arc<AppConfig>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = read_form(multipart).await.map_err(to_api_error)?;
    let source = form.registry_source();
    let UploadForm { file, file_name, skip_rows, .. } = form;
    let bytes = file.ok_or_else(|| to_api_error(ServerError::BadRequest("No file provided".into())))?;

    println!("\n{}", "=".repeat(70));
    println!(
        "📄 NEW UPLOAD: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    );
    println!("{}\n", "=".repeat(70));

    let mut options = TransformOptions {
        registry: source,
        store_dir: config.registry_dir.clone(),
        ..TransformOptions::default()
    };
    options.parse.skip_rows = skip_rows;

    // The pipeline is synchronous and CPU bound.
    let output = tokio::task::spawn_blocking(move || transform_bytes(&bytes, &options))
        .await
        .map_err(|e| to_api_error(ServerError::Io(std::io::Error::other(e))))?
        .map_err(|e| to_api_error(ServerError::Pipeline(e)))?;

    Ok(Json(UploadResponse::from(output)))
}

fn to_api_error(err: ServerError) -> ApiError {
    log_error(err.to_string());
    let status = match &err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(PipelineError::Csv(_))
        | ServerError::Pipeline(PipelineError::Config(_))
        | ServerError::Pipeline(PipelineError::EmptyInput) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Pipeline(PipelineError::Store(crate::error::StoreError::NotFound(_)))
        | ServerError::Pipeline(PipelineError::NoRegistry) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error_response(&err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_source_precedence() {
        let form = UploadForm {
            registry: Some("{}".into()),
            registry_id: Some("imaging-1".into()),
            example: true,
            ..UploadForm::default()
        };
        assert!(matches!(form.registry_source(), RegistrySource::Inline(_)));

        let form = UploadForm {
            registry_id: Some("imaging-1".into()),
            example: true,
            ..UploadForm::default()
        };
        assert!(matches!(form.registry_source(), RegistrySource::Stored(ref id) if id == "imaging-1"));

        assert!(matches!(UploadForm::default().registry_source(), RegistrySource::Auto));
    }

    #[test]
    fn test_error_status_codes() {
        let (status, body) = to_api_error(ServerError::BadRequest("No file provided".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0["error"], "Invalid request: No file provided");

        let (status, _) = to_api_error(ServerError::Pipeline(PipelineError::NoRegistry));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = to_api_error(ServerError::Pipeline(PipelineError::EmptyInput));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_router_builds() {
        let _ = router(AppConfig::default());
    }
}
