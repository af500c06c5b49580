//! HTTP surface: upload a clip, get genre predictions and visualization data.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::error::{Error, Result};
use crate::model::ClassifierHandle;
use crate::pipeline::{ClassificationReport, Pipeline};

const UPLOAD_FIELD: &str = "file";
const AUDIO_EXTENSIONS: [&str; 4] = ["wav", "mp3", "ogg", "flac"];

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub classifier: ClassifierHandle,
    /// Request body cap; larger uploads get 413.
    pub max_upload_bytes: usize,
}

/// Router options that come from configuration.
#[derive(Clone, Debug)]
pub struct RouterOptions {
    pub cors: bool,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
}

#[derive(Serialize)]
struct Banner {
    message: &'static str,
    status: &'static str,
}

struct Upload {
    file_name: Option<String>,
    bytes: Vec<u8>,
}

impl Upload {
    /// Lowercased file extension, used as a container hint for the decoder.
    fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_ascii_lowercase())
    }
}

/// True if the upload looks like audio by content type or file name.
pub fn accepts_upload(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let by_type = content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("audio") || ct.contains("octet-stream")
        })
        .unwrap_or(false);

    let by_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false);

    by_type || by_name
}

async fn root() -> impl IntoResponse {
    Json(Banner {
        message: "Genre Classifier API",
        status: "running",
    })
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            model_loaded: state.classifier.is_loaded(),
        }),
    )
}

fn upload_error(err: MultipartError, limit_bytes: usize) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::upload_too_large(limit_bytes)
    } else {
        Error::InvalidUpload(err.body_text())
    }
}

/// Pull the `file` field out of the form, checking its type before the body
/// is read.
async fn read_upload(multipart: &mut Multipart, limit_bytes: usize) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, limit_bytes))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        if !accepts_upload(field.content_type(), file_name.as_deref()) {
            return Err(Error::InvalidInputType);
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| upload_error(e, limit_bytes))?;
        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(Error::InvalidUpload(format!(
        "missing '{}' field",
        UPLOAD_FIELD
    )))
}

async fn classify(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ClassificationReport>> {
    let started = Instant::now();
    let upload = read_upload(&mut multipart, state.max_upload_bytes).await?;
    log::info!(
        "Received {} ({} bytes)",
        upload.file_name.as_deref().unwrap_or("<unnamed>"),
        upload.bytes.len()
    );

    let classifier = state.classifier.get().await?;
    let pipeline = state.pipeline.clone();
    let report = tokio::task::spawn_blocking(move || {
        let hint = upload.extension();
        pipeline.classify_bytes(upload.bytes, hint.as_deref(), classifier.as_ref(), started)
    })
    .await
    .map_err(|e| Error::processing(format!("classification task failed: {}", e)))??;

    Ok(Json(report))
}

pub fn create_router(state: AppState, options: &RouterOptions) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/classify", post(classify))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    let router = if options.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}

/// Bind and serve until the process is stopped.
///
/// The classifier starts loading in the background right away; a failed load
/// is logged and retried on the next request.
pub async fn serve(
    state: AppState,
    options: RouterOptions,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let warmup = state.classifier.clone();
    tokio::spawn(async move {
        if let Err(e) = warmup.get().await {
            log::warn!("Classifier not ready at startup: {}", e);
        }
    });

    let router = create_router(state, &options);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
