//! End-to-end session transitions with a scripted agent.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use video_insight::downloader::VideoFetcher;
use video_insight::error::ErrorCategory;
use video_insight::session::{Outcome, StateView};
use video_insight::temp_file;
use video_insight::{
    AgentClient, AnalysisError, AnalysisRequest, AnalysisResult, ManagedTempFile, MediaRef,
    SessionController, SessionError, SessionSettings,
};

/// Answers with a fixed result and remembers what it was asked.
struct ScriptedAgent {
    reply: Result<String, String>,
    seen: Mutex<Vec<(String, Vec<MediaRef>, bool)>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedAgent {
    fn answering(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            seen: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::answering("late answer")
        }
    }
}

#[async_trait]
impl AgentClient for ScriptedAgent {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let file_present = request.media().iter().all(|m| match m {
            MediaRef::Video { path, .. } => path.exists(),
            _ => true,
        });
        self.seen
            .lock()
            .push((request.query().to_string(), request.media().to_vec(), file_present));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.reply {
            Ok(text) => Ok(AnalysisResult {
                text: text.clone(),
                model: "scripted".to_string(),
            }),
            Err(message) => Err(AnalysisError::from_provider(message.clone())),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Writes a fixed payload, or fails with a fixed reason.
struct FakeFetcher {
    result: Result<&'static [u8], &'static str>,
}

#[async_trait]
impl VideoFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str, dir: &Path) -> Result<ManagedTempFile, String> {
        match self.result {
            Ok(bytes) => {
                let path = temp_file::unique_path(dir, "mp4");
                std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
                Ok(ManagedTempFile::adopt(path))
            }
            Err(reason) => Err(reason.to_string()),
        }
    }
}

fn settings(dir: &Path) -> SessionSettings {
    SessionSettings {
        temp_dir: dir.to_path_buf(),
        accepted_extensions: vec!["mp4".into(), "mov".into(), "avi".into()],
    }
}

fn controller(dir: &Path, agent: ScriptedAgent) -> (SessionController, Arc<ScriptedAgent>) {
    let agent = Arc::new(agent);
    let session = SessionController::new(
        agent.clone(),
        Arc::new(FakeFetcher {
            result: Ok(&b"downloaded video"[..]),
        }),
        settings(dir),
    );
    (session, agent)
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

#[tokio::test]
async fn successful_analysis_returns_to_idle_and_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let (session, agent) = controller(dir.path(), ScriptedAgent::answering("A cat plays piano."));

    let view = session
        .load_upload(Bytes::from_static(b"0123456789"), "clip.mov")
        .await
        .unwrap();
    assert!(matches!(view.state, StateView::MediaLoaded { size_bytes: 10, .. }));
    let path = session.media_path().unwrap();
    assert!(path.to_string_lossy().ends_with(".mov"));
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");

    let result = session.analyze("What happens?").await.unwrap();
    assert_eq!(result.text, "A cat plays piano.");

    let seen = agent.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "What happens?");
    assert_eq!(seen[0].1, vec![MediaRef::video(&path)]);
    assert!(seen[0].2, "file must exist while the agent runs");
    drop(seen);

    assert!(!path.exists());
    assert!(files_in(dir.path()).is_empty());

    let view = session.view();
    assert!(matches!(view.state, StateView::Idle));
    match view.last_outcome {
        Some(Outcome::Answer { text, model, .. }) => {
            assert_eq!(text, "A cat plays piano.");
            assert_eq!(model, "scripted");
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn permission_denied_failure_still_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(
        dir.path(),
        ScriptedAgent::failing("Gemini API error (403): PERMISSION_DENIED"),
    );

    session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap();
    let path = session.media_path().unwrap();

    let err = session.analyze("Summarize").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::PermissionDenied);
    assert!(err.user_message().contains("PERMISSION DENIED"));

    assert!(!path.exists());
    let view = session.view();
    assert!(matches!(view.state, StateView::Idle));
    assert!(matches!(
        view.last_outcome,
        Some(Outcome::Failure {
            category: ErrorCategory::PermissionDenied,
            ..
        })
    ));
}

#[tokio::test]
async fn content_missing_failure_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(
        dir.path(),
        ScriptedAgent::failing("400 Bad Request: contents are required"),
    );
    session
        .load_upload(Bytes::from_static(b"video"), "clip.avi")
        .await
        .unwrap();

    let err = session.analyze("Summarize").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ContentMissing);
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn other_failure_keeps_provider_message() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(dir.path(), ScriptedAgent::failing("quota exhausted"));
    session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap();

    let err = session.analyze("Summarize").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::OtherProviderError);
    assert_eq!(err.user_message(), "Analysis failed: quota exhausted");
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn empty_query_does_not_call_agent() {
    let dir = tempfile::tempdir().unwrap();
    let (session, agent) = controller(dir.path(), ScriptedAgent::answering("unused"));
    session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap();

    let err = session.analyze("").await.unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(agent.seen.lock().is_empty());
    assert!(matches!(session.view().state, StateView::MediaLoaded { .. }));
    assert_eq!(files_in(dir.path()).len(), 1);
}

#[tokio::test]
async fn unsupported_type_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(dir.path(), ScriptedAgent::answering("unused"));

    let err = session
        .load_upload(Bytes::from_static(b"#!/bin/sh"), "script.sh")
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationFailure);
    assert!(matches!(session.view().state, StateView::Idle));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn acquire_failure_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(ScriptedAgent::answering("unused"));
    let session = SessionController::new(
        agent,
        Arc::new(FakeFetcher { result: Err("unused") }),
        settings(&dir.path().join("missing")),
    );

    let err = session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::AcquireFailure);
    assert!(matches!(session.view().state, StateView::Idle));
}

#[tokio::test]
async fn second_upload_replaces_first() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(dir.path(), ScriptedAgent::answering("unused"));

    session
        .load_upload(Bytes::from_static(b"first"), "one.mp4")
        .await
        .unwrap();
    let first = session.media_path().unwrap();
    session
        .load_upload(Bytes::from_static(b"second"), "two.mov")
        .await
        .unwrap();
    let second = session.media_path().unwrap();

    assert!(!first.exists());
    assert!(second.exists());
    assert_eq!(files_in(dir.path()).len(), 1);
}

#[tokio::test]
async fn url_download_loads_media() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(dir.path(), ScriptedAgent::answering("Talk summary"));

    let view = session.load_url("  https://example.com/watch?v=1  ").await.unwrap();
    match view.state {
        StateView::MediaLoaded { file_name, size_bytes, .. } => {
            assert_eq!(file_name, "https://example.com/watch?v=1");
            assert_eq!(size_bytes, "downloaded video".len() as u64);
        }
        other => panic!("unexpected state {:?}", other),
    }

    session.analyze("Summarize").await.unwrap();
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn download_failure_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let session = SessionController::new(
        Arc::new(ScriptedAgent::answering("unused")),
        Arc::new(FakeFetcher {
            result: Err("HTTP Error 404: Not Found"),
        }),
        settings(dir.path()),
    );

    let err = session.load_url("https://example.com/gone").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::DownloadFailure);
    assert!(err.user_message().contains("404"));
    assert!(matches!(session.view().state, StateView::Idle));

    let err = session.load_url("   ").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationFailure);
}

#[tokio::test]
async fn option_like_url_is_rejected_before_download() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _) = controller(dir.path(), ScriptedAgent::answering("unused"));

    let err = session.load_url(" --exec=touch /tmp/owned ").await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ValidationFailure);
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(matches!(session.view().state, StateView::Idle));
    assert!(files_in(dir.path()).is_empty());
}

#[tokio::test]
async fn actions_during_analysis_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let (session, agent) = controller(dir.path(), ScriptedAgent::gated(gate.clone()));
    let session = Arc::new(session);

    session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap();
    let path = session.media_path().unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.analyze("Summarize").await })
    };
    while agent.seen.lock().is_empty() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(session.view().state, StateView::Analyzing { .. }));
    assert!(matches!(
        session.load_upload(Bytes::from_static(b"x"), "b.mp4").await,
        Err(SessionError::Busy)
    ));
    assert!(matches!(session.analyze("again").await, Err(SessionError::Busy)));
    assert!(matches!(session.reset(), Err(SessionError::Busy)));
    assert!(path.exists());

    gate.notify_one();
    let result = running.await.unwrap().unwrap();
    assert_eq!(result.text, "late answer");
    assert!(!path.exists());
    assert!(matches!(session.view().state, StateView::Idle));
}

#[tokio::test]
async fn abandoned_analysis_releases_file() {
    let dir = tempfile::tempdir().unwrap();
    let gate = Arc::new(Notify::new());
    let (session, _) = controller(dir.path(), ScriptedAgent::gated(gate));

    session
        .load_upload(Bytes::from_static(b"video"), "clip.mp4")
        .await
        .unwrap();
    let path = session.media_path().unwrap();

    let timed_out =
        tokio::time::timeout(Duration::from_millis(50), session.analyze("Summarize")).await;
    assert!(timed_out.is_err());

    assert!(!path.exists());
    let view = session.view();
    assert!(matches!(view.state, StateView::Idle));
    assert!(matches!(
        view.last_outcome,
        Some(Outcome::Failure {
            category: ErrorCategory::OtherProviderError,
            ..
        })
    ));
}
