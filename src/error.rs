use serde::Serialize;
use thiserror::Error;

/// How a failed provider call is reported to the user.
///
/// Derived from the raw provider message by [`FailureKind::classify`]. The
/// substrings it looks for are not a documented provider contract, so treat
/// the result as a hint for the message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 403, permission or billing problem on the provider account.
    PermissionDenied,
    /// The provider complained that the request carried no content, which
    /// usually means an earlier upload failed.
    ContentMissing,
    Other,
}

impl FailureKind {
    pub fn classify(message: &str) -> Self {
        if message.contains("403") || message.contains("PERMISSION_DENIED") {
            FailureKind::PermissionDenied
        } else if message.contains("contents are required") {
            FailureKind::ContentMissing
        } else {
            FailureKind::Other
        }
    }
}

/// A failed analysis call, already classified.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AnalysisError {
    pub kind: FailureKind,
    pub message: String,
}

impl AnalysisError {
    /// Classify a raw provider message.
    pub fn from_provider(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Other,
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::PermissionDenied => "Analysis failed due to PERMISSION DENIED (403). \
                 Verify your Google Cloud billing status and API key restrictions."
                .to_string(),
            FailureKind::ContentMissing => {
                "Analysis failed: the video upload failed entirely (likely a previous 403 error)."
                    .to_string()
            }
            FailureKind::Other => format!("Analysis failed: {}", self.message),
        }
    }
}

/// Input rejected before anything is written or sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a question or insight to analyze the video.")]
    EmptyQuery,

    #[error("Please enter a URL.")]
    EmptyUrl,

    #[error("`{0}` is not a video URL")]
    InvalidUrl(String),

    #[error("Unsupported video type `.{0}`")]
    UnsupportedType(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Could not store the uploaded video: {0}")]
    Acquire(#[source] std::io::Error),

    #[error("Could not download the video: {0}")]
    Download(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("No video is loaded. Upload a file or submit a URL first.")]
    NoMedia,

    #[error("An analysis is already running.")]
    Busy,
}

/// Flat category name used in the HTTP API and the session view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    AcquireFailure,
    DownloadFailure,
    ValidationFailure,
    PermissionDenied,
    ContentMissing,
    OtherProviderError,
    NoMedia,
    Busy,
}

impl SessionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SessionError::Acquire(_) => ErrorCategory::AcquireFailure,
            SessionError::Download(_) => ErrorCategory::DownloadFailure,
            SessionError::Validation(_) => ErrorCategory::ValidationFailure,
            SessionError::Analysis(e) => match e.kind {
                FailureKind::PermissionDenied => ErrorCategory::PermissionDenied,
                FailureKind::ContentMissing => ErrorCategory::ContentMissing,
                FailureKind::Other => ErrorCategory::OtherProviderError,
            },
            SessionError::NoMedia => ErrorCategory::NoMedia,
            SessionError::Busy => ErrorCategory::Busy,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            SessionError::Analysis(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
