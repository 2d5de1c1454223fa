//! Google Gemini binding for [`AgentClient`].
//!
//! Videos are pushed through the File API, polled until processed, referenced
//! from a single `generateContent` call and then deleted again on a best-effort
//! basis. Frames travel inline, transcripts as plain text parts.

use async_trait::async_trait;
use base64::Engine;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::agent::{AgentClient, AnalysisResult};
use crate::error::AnalysisError;
use crate::request::{AnalysisRequest, MediaRef};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
enum GeminiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Could not read media file {path}: {source}")]
    Media {
        path: String,
        source: std::io::Error,
    },

    #[error("Google AI failed to process the video.")]
    ProcessingFailed,

    #[error("The model returned no text.")]
    EmptyResponse,
}

impl From<GeminiError> for AnalysisError {
    /// Only provider responses are classified; local failures are always `Other`.
    fn from(err: GeminiError) -> Self {
        match err {
            GeminiError::Api { .. } => AnalysisError::from_provider(err.to_string()),
            _ => AnalysisError::other(err.to_string()),
        }
    }
}

/// A file held by the Gemini File API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub state: Option<FileState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    StateUnspecified,
    Processing,
    Active,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    FileData {
        file_data: FileData,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    /// Base URL, without trailing slash.
    endpoint: String,
    web_search: bool,
    poll_interval: Duration,
}

impl GeminiClient {
    /// Creates a new client.
    ///
    /// * `api_key` - Google AI Studio / Cloud API key.
    /// * `model` - Model id, e.g. [`DEFAULT_MODEL`].
    /// * `endpoint` - Optional base URL override (a proxy or a local fake
    ///   server); defaults to [`DEFAULT_ENDPOINT`].
    pub fn new(api_key: &str, model: &str, endpoint: Option<&str>) -> Self {
        let endpoint = endpoint
            .unwrap_or(DEFAULT_ENDPOINT)
            .trim_end_matches('/')
            .to_string();

        GeminiClient {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint,
            web_search: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Attach the `google_search` tool so the model can add web research.
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Uploads a local file to the File API.
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, GeminiError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| GeminiError::Media {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Uploading {} ({} bytes, {})", path.display(), bytes.len(), mime_type);

        let response = self
            .client
            .post(format!("{}/upload/v1beta/files", self.endpoint))
            .query(&[("uploadType", "media")])
            .header("x-goog-api-key", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;

        let uploaded: UploadResponse = parse_response(response).await?;
        info!("Uploaded {} as {}", path.display(), uploaded.file.name);
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GeminiError> {
        let response = self
            .client
            .get(format!("{}/v1beta/{}", self.endpoint, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn delete_file(&self, name: &str) -> Result<(), GeminiError> {
        let response = self
            .client
            .delete(format!("{}/v1beta/{}", self.endpoint, name))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        ensure_success(response).await.map(|_| ())
    }

    /// Polls until the file leaves the `PROCESSING` state.
    async fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile, GeminiError> {
        while file.state == Some(FileState::Processing) {
            debug!("Waiting for {} to finish processing", file.name);
            tokio::time::sleep(self.poll_interval).await;
            file = self.get_file(&file.name).await?;
        }

        if file.state == Some(FileState::Failed) {
            return Err(GeminiError::ProcessingFailed);
        }
        Ok(file)
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String, GeminiError> {
        let tools = if self.web_search {
            vec![serde_json::json!({ "google_search": {} })]
        } else {
            Vec::new()
        };
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            tools,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let generated: GenerateResponse = parse_response(response).await?;
        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Part::Text { text } => Some(text),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(GeminiError::EmptyResponse);
        }
        Ok(text)
    }

    /// Everything up to and including `generateContent`. Names of uploaded
    /// files are pushed to `uploaded` as soon as they exist remotely.
    async fn run(
        &self,
        request: &AnalysisRequest,
        uploaded: &mut Vec<String>,
    ) -> Result<String, GeminiError> {
        let mut parts = Vec::with_capacity(request.media().len() + 1);

        for media in request.media() {
            match media {
                MediaRef::Video { path, mime_type } => {
                    let file = self.upload(path, mime_type).await?;
                    uploaded.push(file.name.clone());
                    let file = self.wait_until_active(file).await?;
                    let file_uri = file.uri.clone().unwrap_or_else(|| file.name.clone());
                    parts.push(Part::FileData {
                        file_data: FileData {
                            mime_type: file.mime_type.clone().unwrap_or_else(|| mime_type.clone()),
                            file_uri,
                        },
                    });
                }
                MediaRef::Frame { path, mime_type } => {
                    let bytes = tokio::fs::read(path).await.map_err(|source| GeminiError::Media {
                        path: path.display().to_string(),
                        source,
                    })?;
                    parts.push(Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(bytes),
                        },
                    });
                }
                MediaRef::Transcript(text) => parts.push(Part::Text {
                    text: format!("Transcript of the video:\n{}", text),
                }),
            }
        }

        parts.push(Part::Text {
            text: request.prompt(),
        });
        self.generate(parts).await
    }
}

#[async_trait]
impl AgentClient for GeminiClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let mut uploaded = Vec::new();
        let outcome = self.run(request, &mut uploaded).await;

        for name in &uploaded {
            match self.delete_file(name).await {
                Ok(()) => debug!("Deleted remote file {}", name),
                Err(e) => warn!("Could not delete remote file {}: {}", name, e),
            }
        }

        match outcome {
            Ok(text) => Ok(AnalysisResult {
                text,
                model: self.model.clone(),
            }),
            Err(e) => {
                let err = AnalysisError::from(e);
                error!("Gemini analysis failed ({:?}): {}", err.kind, err.message);
                Err(err)
            }
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GeminiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(GeminiError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GeminiError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
