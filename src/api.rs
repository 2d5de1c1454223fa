use actix_web::http::StatusCode;
use actix_web::{
    delete, get, middleware, post, web, App, HttpResponse, HttpServer, Responder, ResponseError,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::agent::AnalysisResult;
use crate::error::{ErrorCategory, SessionError};
use crate::request::mime_type_for;
use crate::session::{SessionController, SessionView};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FetchBody {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeBody {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub result: AnalysisResult,
    pub session: SessionView,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    category: ErrorCategory,
    message: String,
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            SessionError::Validation(_) => StatusCode::BAD_REQUEST,
            SessionError::NoMedia | SessionError::Busy => StatusCode::CONFLICT,
            SessionError::Acquire(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::Download(_) | SessionError::Analysis(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            category: self.category(),
            message: self.user_message(),
        })
    }
}

/// The single-page UI.
#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

/// Current session state
///
/// # Example
/// ```shell
/// curl http://localhost:8080/session
/// ```
///
/// # Returns
/// ```json
/// {
///     "state": "media_loaded",
///     "file_name": "clip.mov",
///     "extension": "mov",
///     "size_bytes": 1048576,
///     "model": "gemini-2.5-flash-preview-09-2025",
///     "accepted_extensions": ["mp4", "mov", "avi"],
///     "last_outcome": null
/// }
/// ```
#[get("/session")]
pub async fn get_session(session: web::Data<SessionController>) -> impl Responder {
    web::Json(session.view())
}

/// Upload a video as the raw request body
///
/// # Example
/// ```shell
/// curl --data-binary @clip.mov "http://localhost:8080/session/upload?name=clip.mov"
/// ```
#[post("/session/upload")]
pub async fn upload(
    session: web::Data<SessionController>,
    params: web::Query<UploadParams>,
    body: web::Bytes,
) -> Result<HttpResponse, SessionError> {
    let name = params.name.as_deref().unwrap_or("upload");
    let view = session.load_upload(body, name).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Download a video from a URL
///
/// # Example
/// ```shell
/// curl -H 'Content-Type: application/json' \
///      -d '{"url": "https://www.youtube.com/watch?v=..."}' \
///      http://localhost:8080/session/fetch
/// ```
#[post("/session/fetch")]
pub async fn fetch(
    session: web::Data<SessionController>,
    body: web::Json<FetchBody>,
) -> Result<HttpResponse, SessionError> {
    let view = session.load_url(&body.url).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Ask a question about the loaded video
///
/// # Example
/// ```shell
/// curl -H 'Content-Type: application/json' \
///      -d '{"query": "Summarize the main points"}' \
///      http://localhost:8080/session/analyze
/// ```
///
/// # Returns
/// ```json
/// {
///     "result": { "text": "The video shows...", "model": "gemini-2.5-flash-preview-09-2025" },
///     "session": { "state": "idle", ... }
/// }
/// ```
#[post("/session/analyze")]
pub async fn analyze(
    session: web::Data<SessionController>,
    body: web::Json<AnalyzeBody>,
) -> Result<HttpResponse, SessionError> {
    let result = session.analyze(&body.query).await?;
    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        result,
        session: session.view(),
    }))
}

/// Discard the loaded video
///
/// # Example
/// ```shell
/// curl -X DELETE http://localhost:8080/session
/// ```
#[delete("/session")]
pub async fn reset(session: web::Data<SessionController>) -> Result<HttpResponse, SessionError> {
    Ok(HttpResponse::Ok().json(session.reset()?))
}

/// Preview bytes of the loaded video
#[get("/session/video")]
pub async fn video(session: web::Data<SessionController>) -> Result<HttpResponse, SessionError> {
    let path = session.media_path().ok_or(SessionError::NoMedia)?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(mime_type_for(&path))
            .body(bytes)),
        // Released between the lookup and the read.
        Err(_) => Err(SessionError::NoMedia),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(get_session)
        .service(upload)
        .service(fetch)
        .service(analyze)
        .service(reset)
        .service(video);
}

/// Run the API server
pub async fn run_api_server(
    session: web::Data<SessionController>,
    bind_addr: SocketAddr,
    max_upload_bytes: usize,
) -> std::io::Result<()> {
    info!("Listening on http://{}", bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(session.clone())
            .app_data(web::PayloadConfig::new(max_upload_bytes))
            .configure(configure)
    })
    .bind(bind_addr)?
    .run()
    .await
}
