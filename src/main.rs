// ABOUTME: On-demand thumbnail Cloud Run service for wiki media in GCS
// ABOUTME: Parses thumb URLs, renders with vipsthumbnail/ffmpeg, stores and returns the thumbnail

mod config;
mod error;
mod media;
mod request;
mod storage;
mod thumbnail;
mod tools;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use serde::Serialize;
use tower::Service;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{RequestError, ResponseClass};
use crate::media::content_type_for;
use crate::request::ThumbRequest;
use crate::storage::GcsStore;
use crate::thumbnail::Thumbnailer;
use crate::tools::ProcessRunner;

// App state shared across handlers
struct AppState {
    thumbnailer: Thumbnailer,
}

// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("thumb_proxy=info".parse()?),
        )
        .init();

    let config = Config::from_env();
    let port = config.port;

    info!(
        "Tools: {} / {} (jpeg Q={}, file input for {:?})",
        config.tools.vips_bin, config.tools.ffmpeg_bin, config.tools.jpeg_quality, config.file_input_formats
    );

    let store = GcsStore::from_env().await?;
    let thumbnailer = Thumbnailer::new(
        Arc::new(store),
        Arc::new(ProcessRunner),
        config.tools,
        config.file_input_formats,
    );

    let app = router(Arc::new(AppState { thumbnailer }));

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting thumbnail service on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Use hyper's auto builder which supports both HTTP/1 and HTTP/2
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let app = app.clone();

        tokio::spawn(async move {
            let builder = Builder::new(hyper_util::rt::TokioExecutor::new());
            if let Err(e) = builder
                .serve_connection(
                    io,
                    hyper::service::service_fn(move |req| {
                        let mut app = app.clone();
                        async move { app.call(req).await }
                    }),
                )
                .await
            {
                error!("Connection error: {}", e);
            }
        });
    }
}

fn router(state: Arc<AppState>) -> Router {
    // Every path other than /health is a thumbnail request, whatever the method
    Router::new()
        .route("/health", get(handle_health))
        .fallback(handle_thumbnail)
        .with_state(state)
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_thumbnail(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let req = match parse_and_validate(uri.path()) {
        Ok(req) => req,
        Err(e) => {
            warn!("Rejected {}: {}", uri.path(), e);
            return ResponseClass::from(&e).status_code().into_response();
        }
    };

    info!(
        "Thumbnail request gs://{}/{} -> {} at {}px ({})",
        req.container, req.source_path, req.thumb_path, req.width, req.media_type
    );

    match state.thumbnailer.generate(&req).await {
        Ok(thumbnail) => thumbnail_response(&req, thumbnail),
        Err(e) => {
            let class = ResponseClass::from(&e);
            if class == ResponseClass::NotFound {
                warn!("[{}] {}", e.step(), e);
            } else {
                error!("[{}] gs://{}/{}: {}", e.step(), req.container, req.thumb_path, e);
            }

            // Persisting failed but the thumbnail itself is fine to serve
            match e.thumbnail() {
                Some(thumbnail) => thumbnail_response(&req, thumbnail.clone()),
                None => class.status_code().into_response(),
            }
        }
    }
}

fn parse_and_validate(path: &str) -> std::result::Result<ThumbRequest, RequestError> {
    let req = request::parse(path)?;
    media::validate(&req)?;
    Ok(req)
}

fn thumbnail_response(req: &ThumbRequest, thumbnail: Bytes) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type_for(&req.target_ext))],
        thumbnail,
    )
        .into_response()
}
