use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::temp_file::{self, ManagedTempFile};

/// Materializes a video from a URL as a managed temporary file.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    /// Returns the downloaded file, or a human-readable reason it failed.
    async fn fetch(&self, url: &str, dir: &Path) -> Result<ManagedTempFile, String>;
}

/// Downloads with the external `yt-dlp` program.
pub struct YtDlpFetcher {
    program: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        YtDlpFetcher {
            program: program.into(),
        }
    }
}

#[async_trait]
impl VideoFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dir: &Path) -> Result<ManagedTempFile, String> {
        let target = temp_file::unique_path(dir, temp_file::DEFAULT_EXTENSION);
        // Owned from the start so a failed or partial download is removed too.
        let file = ManagedTempFile::adopt(target.clone());

        let output = tokio::process::Command::new(&self.program)
            .arg("-f")
            .arg("best[ext=mp4]/best")
            .arg("-o")
            .arg(&target)
            .arg("--quiet")
            .arg("--no-playlist")
            .arg("--no-part")
            .arg("--")
            .arg(url)
            .output()
            .await
            .map_err(|e| format!("could not run {}: {}", self.program.display(), e))?;

        debug!("yt-dlp stdout: {}", String::from_utf8_lossy(&output.stdout));
        debug!("yt-dlp stderr: {}", String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(if reason.is_empty() {
                format!("yt-dlp exited with {}", output.status)
            } else {
                reason.to_string()
            });
        }
        if !file.exists() {
            return Err("yt-dlp finished without producing a file".to_string());
        }

        info!("Downloaded {} to {}", url, target.display());
        Ok(file)
    }
}
