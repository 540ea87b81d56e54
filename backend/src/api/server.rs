//! HTTP server for the IATI generator.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/convert`    | Convert CSV resources to IATI XML    |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |
//!
//! `POST /api/convert` takes a multipart form:
//!
//! - file parts (one per resource); a part named after a file type
//!   (`activity-main`, `200`, ...) declares that type, any other part name
//!   (`file`, `upload`, ...) declares nothing
//! - `file_type`: type of parts that declare none; otherwise resolved from
//!   the uploaded file name
//! - `namespace`, `resource_name`, `rows_limit`, `max_allowed_failures`
//!
//! Each upload is parsed up to `rows_limit + 1` rows.

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{Json, Sse, sse::Event},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, ConvertResponse};
use crate::config::ConversionConfig;
use crate::error::{InputError, PipelineError, ServerError};
use crate::models::{FileType, Namespace};
use crate::transform::pipeline::{ConversionRequest, CsvResource, Pipeline};

type Rejection = (StatusCode, Json<Value>);

/// Start the HTTP server
pub async fn start_server(port: u16, config: ConversionConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(
        %addr,
        rows_limit = config.rows_limit,
        max_allowed_failures = config.max_allowed_failures,
        default_currency = config.default_currency.as_deref().unwrap_or("none"),
        "IATI generator listening"
    );

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/convert", post(convert))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "iati-generator",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "convert": "POST /api/convert",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx)
        .filter_map(|result| {
            match result {
                Ok(entry) => {
                    let json = serde_json::to_string(&entry).ok()?;
                    Some(Ok(Event::default().data(json)))
                }
                Err(_) => None,
            }
        });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive")
    )
}

// =============================================================================
// Convert
// =============================================================================

struct UploadedFile {
    /// Type named by the part itself, if any.
    declared: Option<String>,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct ConvertForm {
    files: Vec<UploadedFile>,
    file_type: Option<String>,
    namespace: Option<String>,
    resource_name: Option<String>,
    rows_limit: Option<String>,
    max_allowed_failures: Option<String>,
}

impl ConvertForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ServerError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
        {
            let name = field.name().unwrap_or("").to_string();
            let file_name = field.file_name().map(|s| s.to_string());

            if name == "file" || file_name.is_some() {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                form.files.push(UploadedFile {
                    declared: declared_type(&name),
                    file_name,
                    bytes: bytes.to_vec(),
                });
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
            match name.as_str() {
                "file_type" => form.file_type = Some(value),
                "namespace" => form.namespace = Some(value),
                "resource_name" => form.resource_name = Some(value),
                "rows_limit" => form.rows_limit = Some(value),
                "max_allowed_failures" => form.max_allowed_failures = Some(value),
                other => tracing::debug!(field = other, "ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    fn config(&self, base: ConversionConfig) -> Result<ConversionConfig, ServerError> {
        let mut config = base;
        if let Some(value) = &self.rows_limit {
            config = config.with_rows_limit(parse_count("rows_limit", value)?);
        }
        if let Some(value) = &self.max_allowed_failures {
            config = config.with_max_allowed_failures(parse_count("max_allowed_failures", value)?);
        }
        Ok(config)
    }

    /// Build the request, parsing each upload up to `max_rows` rows.
    fn into_request(self, max_rows: usize) -> Result<ConversionRequest, ServerError> {
        if self.files.is_empty() {
            return Err(ServerError::BadRequest("No file provided".into()));
        }

        let namespace = match self.namespace.as_deref() {
            Some(raw) => Namespace::parse(raw).map_err(|e| ServerError::BadRequest(e.to_string()))?,
            None => Namespace::default(),
        };

        let resource_name = self
            .resource_name
            .clone()
            .unwrap_or_else(|| if namespace.is_default() { "upload".to_string() } else { namespace.as_str().to_string() });
        let mut request = ConversionRequest::new(resource_name);

        for (index, file) in self.files.into_iter().enumerate() {
            let file_type = resolve_file_type(
                file.declared.as_deref(),
                self.file_type.as_deref(),
                file.file_name.as_deref(),
            )?;
            let name = file
                .file_name
                .unwrap_or_else(|| format!("{}-{}", file_type.name(), index + 1));
            let resource = CsvResource::from_bytes_limited(name, file_type, &file.bytes, max_rows)
                .map_err(|e| ServerError::Pipeline(PipelineError::Input(e)))?
                .with_namespace(namespace.clone());
            request = request.with_resource(resource);
        }

        Ok(request)
    }
}

/// The part name, when it names a file type.
fn declared_type(part_name: &str) -> Option<String> {
    part_name
        .parse::<FileType>()
        .is_ok()
        .then(|| part_name.to_string())
}

/// Declared part type, then the form-level `file_type`, then the file name.
fn resolve_file_type(
    declared: Option<&str>,
    form_level: Option<&str>,
    file_name: Option<&str>,
) -> Result<FileType, ServerError> {
    if let Some(raw) = declared.or(form_level) {
        return raw.parse().map_err(|e: InputError| ServerError::BadRequest(e.to_string()));
    }
    match file_name {
        Some(file_name) => file_name.parse::<FileType>().map_err(|e| match e {
            InputError::UnsupportedFileType { .. } => ServerError::BadRequest(e.to_string()),
            _ => ServerError::BadRequest(format!("Cannot determine the file type of '{}'", file_name)),
        }),
        None => Err(ServerError::BadRequest("Cannot determine the file type of 'upload'".into())),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ServerError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

fn reject(error: ServerError) -> Rejection {
    let status = match &error {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Pipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log_error(error.to_string());
    (status, Json(error_response(&error.to_string())))
}

/// Convert endpoint
async fn convert(
    State(base): State<ConversionConfig>,
    multipart: Multipart,
) -> Result<Json<ConvertResponse>, Rejection> {
    let form = ConvertForm::read(multipart).await.map_err(reject)?;
    let config = form.config(base).map_err(reject)?;
    let request = form
        .into_request(config.rows_limit.saturating_add(1))
        .map_err(reject)?;

    log_info(format!(
        "Converting '{}' ({} resource(s))",
        request.resource_name,
        request.resources.len()
    ));

    let outcome = tokio::task::spawn_blocking(move || Pipeline::new(config).convert(&request))
        .await
        .map_err(|e| reject(ServerError::Internal(e.to_string())))?;

    LOG_BROADCASTER.publish(&outcome.logs);
    tracing::info!(
        file_name = %outcome.file_name,
        success = outcome.is_success(),
        log_lines = outcome.logs.len(),
        "conversion finished"
    );

    Ok(Json(ConvertResponse::from(outcome)))
}
