use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// A piece of media attached to an analysis request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Video { path: PathBuf, mime_type: String },
    /// A still image taken from the video.
    Frame { path: PathBuf, mime_type: String },
    Transcript(String),
}

impl MediaRef {
    pub fn video(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_type_for(&path).to_string();
        MediaRef::Video { path, mime_type }
    }

    pub fn frame(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_type_for(&path).to_string();
        MediaRef::Frame { path, mime_type }
    }

    pub fn transcript(text: impl Into<String>) -> Self {
        MediaRef::Transcript(text.into())
    }
}

/// Guess a MIME type from a file extension. Unknown extensions are treated as mp4 video.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "video/mp4",
    }
}

/// A query plus the media it refers to. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    query: String,
    media: Vec<MediaRef>,
}

impl AnalysisRequest {
    pub fn builder() -> AnalysisRequestBuilder {
        AnalysisRequestBuilder::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn media(&self) -> &[MediaRef] {
        &self.media
    }

    /// The full instruction sent to the model.
    pub fn prompt(&self) -> String {
        format!(
            "Analyze the uploaded video for content and context.\n\
             Respond to the following query using video insights and supplementary web research\n\
             {}\n\n\
             Provide a detailed, user-friendly, and actionable response.",
            self.query
        )
    }
}

#[derive(Debug, Default)]
pub struct AnalysisRequestBuilder {
    query: String,
    media: Vec<MediaRef>,
}

impl AnalysisRequestBuilder {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn media(mut self, media: MediaRef) -> Self {
        self.media.push(media);
        self
    }

    /// Fails only when the query is blank.
    pub fn build(self) -> Result<AnalysisRequest, ValidationError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery);
        }
        Ok(AnalysisRequest {
            query: query.to_string(),
            media: self.media,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_is_rejected() {
        let err = AnalysisRequest::builder()
            .media(MediaRef::video("/tmp/abc.mp4"))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::EmptyQuery);
    }

    #[test]
    fn whitespace_query_is_rejected() {
        let result = AnalysisRequest::builder().query("  \n\t ").build();
        assert_eq!(result, Err(ValidationError::EmptyQuery));
    }

    #[test]
    fn builds_with_media_in_order() {
        let request = AnalysisRequest::builder()
            .query("  What happens at the end?  ")
            .media(MediaRef::video("/tmp/abc.mov"))
            .media(MediaRef::frame("/tmp/frame-001.jpg"))
            .media(MediaRef::transcript("hello there"))
            .build()
            .unwrap();

        assert_eq!(request.query(), "What happens at the end?");
        assert_eq!(
            request.media(),
            &[
                MediaRef::Video {
                    path: "/tmp/abc.mov".into(),
                    mime_type: "video/quicktime".into()
                },
                MediaRef::Frame {
                    path: "/tmp/frame-001.jpg".into(),
                    mime_type: "image/jpeg".into()
                },
                MediaRef::Transcript("hello there".into()),
            ]
        );
    }

    #[test]
    fn prompt_embeds_query() {
        let request = AnalysisRequest::builder()
            .query("Summarize the talk")
            .build()
            .unwrap();
        let prompt = request.prompt();
        assert!(prompt.starts_with("Analyze the uploaded video"));
        assert!(prompt.contains("\nSummarize the talk\n"));
        assert!(prompt.ends_with("actionable response."));
    }

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for(Path::new("a.MP4")), "video/mp4");
        assert_eq!(mime_type_for(Path::new("a.avi")), "video/x-msvideo");
        assert_eq!(mime_type_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("a")), "video/mp4");
    }
}
