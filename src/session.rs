//! The single interactive session.
//!
//! `Idle` -> `MediaLoaded` -> `Analyzing` -> `Idle`. The temporary video file
//! lives in the state while media is loaded and moves into the analysis scope
//! for the duration of the remote call; it is released when that scope ends,
//! whatever the outcome.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{AgentClient, AnalysisResult};
use crate::downloader::VideoFetcher;
use crate::error::{AnalysisError, ErrorCategory, SessionError, ValidationError};
use crate::request::{AnalysisRequest, MediaRef};
use crate::temp_file::{self, ManagedTempFile};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub temp_dir: PathBuf,
    /// Lowercase extensions accepted for uploads.
    pub accepted_extensions: Vec<String>,
}

/// What the UI shows about the last finished analysis.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Answer {
        text: String,
        model: String,
        finished_at: DateTime<Utc>,
    },
    Failure {
        category: ErrorCategory,
        message: String,
        finished_at: DateTime<Utc>,
    },
}

impl Outcome {
    fn failure(err: &SessionError) -> Self {
        Outcome::Failure {
            category: err.category(),
            message: err.user_message(),
            finished_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StateView {
    Idle,
    MediaLoaded {
        file_name: String,
        extension: String,
        size_bytes: u64,
    },
    Analyzing {
        file_name: String,
    },
}

/// Everything the UI needs to render the page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub state: StateView,
    pub model: String,
    pub accepted_extensions: Vec<String>,
    pub last_outcome: Option<Outcome>,
}

struct LoadedMedia {
    file: ManagedTempFile,
    display_name: String,
    size_bytes: u64,
}

enum SessionState {
    Idle,
    MediaLoaded(LoadedMedia),
    Analyzing { file_name: String },
}

struct Inner {
    state: SessionState,
    last_outcome: Option<Outcome>,
}

pub struct SessionController {
    agent: Arc<dyn AgentClient>,
    fetcher: Arc<dyn VideoFetcher>,
    settings: SessionSettings,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(
        agent: Arc<dyn AgentClient>,
        fetcher: Arc<dyn VideoFetcher>,
        settings: SessionSettings,
    ) -> Self {
        SessionController {
            agent,
            fetcher,
            settings,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                last_outcome: None,
            }),
        }
    }

    pub fn view(&self) -> SessionView {
        let inner = self.inner.lock();
        let state = match &inner.state {
            SessionState::Idle => StateView::Idle,
            SessionState::MediaLoaded(media) => StateView::MediaLoaded {
                file_name: media.display_name.clone(),
                extension: media.file.extension().to_string(),
                size_bytes: media.size_bytes,
            },
            SessionState::Analyzing { file_name } => StateView::Analyzing {
                file_name: file_name.clone(),
            },
        };
        SessionView {
            state,
            model: self.agent.model().to_string(),
            accepted_extensions: self.settings.accepted_extensions.clone(),
            last_outcome: inner.last_outcome.clone(),
        }
    }

    /// Path of the loaded video, for previews.
    pub fn media_path(&self) -> Option<PathBuf> {
        match &self.inner.lock().state {
            SessionState::MediaLoaded(media) => Some(media.file.path().to_path_buf()),
            _ => None,
        }
    }

    /// Stores an uploaded video and moves to `MediaLoaded`.
    pub async fn load_upload(
        &self,
        body: Bytes,
        declared_name: &str,
    ) -> Result<SessionView, SessionError> {
        let extension = temp_file::extension_of(declared_name).to_ascii_lowercase();
        if !self.settings.accepted_extensions.contains(&extension) {
            return Err(ValidationError::UnsupportedType(extension).into());
        }
        self.ensure_not_analyzing()?;

        let dir = self.settings.temp_dir.clone();
        let name = declared_name.to_string();
        let file = tokio::task::spawn_blocking(move || {
            ManagedTempFile::acquire(&mut body.as_ref(), &name, &dir)
        })
        .await
        .map_err(|e| SessionError::Acquire(std::io::Error::other(e)))?
        .map_err(SessionError::Acquire)?;

        self.install(file, display_name(declared_name))
    }

    /// Downloads a video by URL and moves to `MediaLoaded`.
    pub async fn load_url(&self, url: &str) -> Result<SessionView, SessionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl.into());
        }
        if url.starts_with('-') {
            return Err(ValidationError::InvalidUrl(url.to_string()).into());
        }
        self.ensure_not_analyzing()?;

        let file = self
            .fetcher
            .fetch(url, &self.settings.temp_dir)
            .await
            .map_err(SessionError::Download)?;

        self.install(file, url.to_string())
    }

    /// Runs one analysis of the loaded video and returns to `Idle`.
    ///
    /// A blank query is rejected without leaving `MediaLoaded`. Once the call
    /// starts the temporary file is released on every path, including the
    /// returned future being dropped half way.
    pub async fn analyze(&self, query: &str) -> Result<AnalysisResult, SessionError> {
        let (scope, request) = self.begin_analysis(query)?;
        info!("Analyzing {} with {}", scope.file_name(), self.agent.model());

        match self.agent.analyze(&request).await {
            Ok(result) => {
                scope.finish(Outcome::Answer {
                    text: result.text.clone(),
                    model: result.model.clone(),
                    finished_at: Utc::now(),
                });
                Ok(result)
            }
            Err(e) => {
                let err = SessionError::from(e);
                scope.finish(Outcome::failure(&err));
                Err(err)
            }
        }
    }

    /// Drops any loaded media and returns to `Idle`.
    pub fn reset(&self) -> Result<SessionView, SessionError> {
        {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut inner.state, SessionState::Idle) {
                SessionState::MediaLoaded(media) => media.file.release(),
                SessionState::Analyzing { file_name } => {
                    inner.state = SessionState::Analyzing { file_name };
                    return Err(SessionError::Busy);
                }
                SessionState::Idle => {}
            }
            inner.last_outcome = None;
        }
        Ok(self.view())
    }

    fn ensure_not_analyzing(&self) -> Result<(), SessionError> {
        match self.inner.lock().state {
            SessionState::Analyzing { .. } => Err(SessionError::Busy),
            _ => Ok(()),
        }
    }

    fn install(
        &self,
        file: ManagedTempFile,
        display_name: String,
    ) -> Result<SessionView, SessionError> {
        let size_bytes = file.size().map_err(SessionError::Acquire)?;
        {
            let mut inner = self.inner.lock();
            if let SessionState::Analyzing { .. } = inner.state {
                // `file` is dropped, and removed, on return.
                return Err(SessionError::Busy);
            }
            let media = LoadedMedia {
                file,
                display_name,
                size_bytes,
            };
            info!(
                "Loaded {} ({} bytes) at {}",
                media.display_name,
                size_bytes,
                media.file.path().display()
            );
            if let SessionState::MediaLoaded(previous) =
                std::mem::replace(&mut inner.state, SessionState::MediaLoaded(media))
            {
                previous.file.release();
            }
            inner.last_outcome = None;
        }
        Ok(self.view())
    }

    fn begin_analysis(
        &self,
        query: &str,
    ) -> Result<(AnalysisScope<'_>, AnalysisRequest), SessionError> {
        let mut inner = self.inner.lock();
        let media = match std::mem::replace(&mut inner.state, SessionState::Idle) {
            SessionState::MediaLoaded(media) => media,
            SessionState::Analyzing { file_name } => {
                inner.state = SessionState::Analyzing { file_name };
                return Err(SessionError::Busy);
            }
            SessionState::Idle => return Err(SessionError::NoMedia),
        };

        let request = match AnalysisRequest::builder()
            .query(query)
            .media(MediaRef::video(media.file.path()))
            .build()
        {
            Ok(request) => request,
            Err(e) => {
                inner.state = SessionState::MediaLoaded(media);
                return Err(e.into());
            }
        };

        inner.state = SessionState::Analyzing {
            file_name: media.display_name.clone(),
        };
        Ok((
            AnalysisScope {
                session: self,
                media: Some(media),
            },
            request,
        ))
    }

    fn settle(&self, outcome: Outcome) {
        let mut inner = self.inner.lock();
        inner.state = SessionState::Idle;
        inner.last_outcome = Some(outcome);
    }
}

/// Owns the media while the remote call is outstanding.
struct AnalysisScope<'a> {
    session: &'a SessionController,
    media: Option<LoadedMedia>,
}

impl AnalysisScope<'_> {
    fn file_name(&self) -> &str {
        self.media.as_ref().map(|m| m.display_name.as_str()).unwrap_or_default()
    }

    fn finish(mut self, outcome: Outcome) {
        if let Some(media) = self.media.take() {
            media.file.release();
        }
        self.session.settle(outcome);
    }
}

impl Drop for AnalysisScope<'_> {
    fn drop(&mut self) {
        if let Some(media) = self.media.take() {
            warn!("Analysis of {} was interrupted", media.display_name);
            media.file.release();
            let err = SessionError::Analysis(AnalysisError::other("the analysis was interrupted"));
            self.session.settle(Outcome::failure(&err));
        }
    }
}

fn display_name(declared_name: &str) -> String {
    declared_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string()
}
