use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parley_shared::Reply;
use parley_store::StoreHandle;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::pipeline;
use crate::registry::ChannelRegistry;
use crate::router::RouterHandle;
use crate::uploads::{discard_uploads, ImageRecord, UploadStore};

/// RFC 5987 `attr-char`: everything else in a `filename*` value is encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub router: RouterHandle,
    pub registry: ChannelRegistry,
    pub uploads: Arc<UploadStore>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/sendMessage", post(send_message))
        .route("/getHistory", get(get_history))
        .route("/images", post(upload_image).get(list_images))
        .route("/images/", get(get_image))
        .route("/images/:id", get(get_image))
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.registry.connection_count().await,
    })
}

/// Accept a chat message for routing. Answers before delivery or storage.
async fn send_message(
    State(state): State<AppState>,
    body: String,
) -> Result<&'static str, ServerError> {
    state.router.admit(&body)?;
    state.router.route(body);
    Ok("ok")
}

async fn get_history(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ServerError> {
    let messages = state
        .store
        .query(&state.config.topics.messages, json!({}))
        .await?;
    Ok(Json(messages))
}

async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Reply<Value>>, ServerError> {
    let mut received = Vec::new();
    if let Err(e) = receive_files(&state.uploads, &mut multipart, &mut received).await {
        discard_uploads(received.iter().map(ImageRecord::path)).await;
        return Err(e);
    }

    let image = match <[ImageRecord; 1]>::try_from(received) {
        Ok([image]) => image,
        Err(received) => {
            discard_uploads(received.iter().map(ImageRecord::path)).await;
            return Err(ServerError::BadRequest(
                "Multiple image upload is not supported".to_string(),
            ));
        }
    };

    if !image.is_image() {
        discard_uploads([image.path()]).await;
        return Err(ServerError::UnsupportedMediaType(format!(
            "Expected Content-Type: image, actual: {}",
            image.content_type
        )));
    }

    let saved = match serde_json::to_value(&image) {
        Ok(record) => state.store.insert(&state.config.topics.images, record).await,
        Err(e) => {
            discard_uploads([image.path()]).await;
            return Err(e.into());
        }
    };

    match saved {
        Ok(saved) => {
            info!(id = %saved["_id"], file = %image.file_name, size = image.size, "Image uploaded");
            Ok(Json(Reply::success(saved)))
        }
        Err(e) => {
            discard_uploads([image.path()]).await;
            Err(e.into())
        }
    }
}

/// Write every file part to disk, recording each one as soon as it is
/// complete so the caller can clean up whatever was received.
async fn receive_files(
    uploads: &UploadStore,
    multipart: &mut Multipart,
    received: &mut Vec<ImageRecord>,
) -> Result<(), ServerError> {
    while let Some(field) = multipart.next_field().await? {
        // Plain form fields are skipped.
        if field.file_name().is_none() {
            continue;
        }
        received.push(uploads.receive(field).await?);
    }
    Ok(())
}

async fn list_images(State(state): State<AppState>) -> Result<Json<Reply<Value>>, ServerError> {
    let images = state
        .store
        .query(&state.config.topics.images, json!({}))
        .await?;
    Ok(Json(Reply::success(json!({ "images": images }))))
}

async fn get_image(
    State(state): State<AppState>,
    id: Option<Path<String>>,
) -> Result<Response, ServerError> {
    let id = match id {
        Some(Path(id)) if !id.trim().is_empty() => id,
        _ => {
            return Err(ServerError::BadRequest(
                "Missing required parameter: id".to_string(),
            ))
        }
    };

    let record = state
        .store
        .find_one(&state.config.topics.images, json!({ "_id": id }))
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("Failed to find image by ID: {id}")))?;
    let image: ImageRecord = serde_json::from_value(record)?;

    let file = pipeline::open_source(image.path()).await?;

    let headers = [
        (CONTENT_TYPE, HeaderValue::from_str(&image.content_type)?),
        (
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&content_disposition(&image.file_name))?,
        ),
    ];
    let body = pipeline::stream_file(file, state.config.stream_chunk_size);

    Ok((headers, body).into_response())
}

fn content_disposition(file_name: &str) -> String {
    format!(
        "inline; filename*=UTF-8''{}",
        utf8_percent_encode(file_name, ATTR_CHAR)
    )
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
