use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::video_id;

/// Language of the caption track requested from the provider.
const SUB_LANG: &str = "en";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("yt-dlp not found. Install it: https://github.com/yt-dlp/yt-dlp")]
    YtDlpNotFound,
    #[error("yt-dlp failed: {0}")]
    YtDlpFailed(String),
    #[error("could not extract video ID from: {0}")]
    InvalidUrl(String),
    #[error("expected caption file not found: {0}")]
    MissingOutput(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where the provider leaves the caption track for `id`: `<dir>/<id>.en.vtt`.
pub fn temp_caption_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.{SUB_LANG}.vtt"))
}

/// Something that can fetch a caption track for a video.
///
/// Implementations write the track to [`temp_caption_path`] inside `dest_dir`
/// and return that path; the caller owns renaming it.
pub trait CaptionFetcher {
    fn fetch_captions(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

/// Fetches captions by running `yt-dlp`.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    socket_timeout: u32,
    retries: u32,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            socket_timeout: 30,
            retries: 3,
        }
    }
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }

    /// Fail early when the binary is not on `PATH`.
    pub fn check_available(&self) -> Result<(), DownloadError> {
        match Command::new(&self.binary).arg("--version").output() {
            Ok(output) if output.status.success() => Ok(()),
            _ => Err(DownloadError::YtDlpNotFound),
        }
    }
}

impl CaptionFetcher for YtDlp {
    fn fetch_captions(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        let id = video_id::extract(url).ok_or_else(|| DownloadError::InvalidUrl(url.to_string()))?;
        let full_url = video_id::watch_url(&id);

        fs::create_dir_all(dest_dir)?;
        let output_template = dest_dir.join("%(id)s.%(ext)s");

        debug!("running {} for {full_url}", self.binary);
        let output = Command::new(&self.binary)
            .args([
                "--skip-download",
                "--write-subs",
                "--write-auto-subs",
                "--sub-format",
                "vtt",
                "--sub-langs",
                SUB_LANG,
                "--no-progress",
            ])
            .arg("--socket-timeout")
            .arg(self.socket_timeout.to_string())
            .arg("--retries")
            .arg(self.retries.to_string())
            .arg("--output")
            .arg(&output_template)
            .arg(&full_url)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::YtDlpFailed(stderr.trim().to_string()));
        }

        let path = temp_caption_path(dest_dir, &id);
        if path.exists() {
            Ok(path)
        } else {
            Err(DownloadError::MissingOutput(path))
        }
    }
}
