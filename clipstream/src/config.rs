//! Runtime settings resolved from the environment.

use crate::error::Error;
use std::path::{Path, PathBuf};

/// Everything the runners need to know about the local setup.
///
/// Each field is read from an environment variable; unset or empty variables fall back to the
/// defaults listed on the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// OAuth client configuration. `CLIENT_SECRETS_FILE`, default `client_secrets.json`.
    pub client_secrets_file: PathBuf,
    /// Cached OAuth token. `TOKEN_CACHE_FILE`, default `token.json`.
    pub token_cache_file: PathBuf,
    /// Intro prepended to every video. `INTRO_VIDEO`, default `intro.mp4`.
    pub intro_video: PathBuf,
    /// Intro used for vertical videos when present. `INTRO_VIDEO_SHORT`, default `intro_short.mp4`.
    pub intro_video_short: PathBuf,
    /// Thumbnail set on uploads when present. `INTRO_THUMBNAIL`, default `intro.jpg`.
    pub intro_thumbnail: PathBuf,
    /// Composed outputs. `OUTPUT_DIR`, default `output`.
    pub output_dir: PathBuf,
    /// Staging area for downloads. `DOWNLOAD_DIR`, default `downloads`.
    pub download_dir: PathBuf,
    /// `YT_DLP_BIN`, default `yt-dlp`.
    pub yt_dlp_bin: PathBuf,
    /// `FFMPEG_BIN`, default `ffmpeg`.
    pub ffmpeg_bin: PathBuf,
    /// `FFPROBE_BIN`, default `ffprobe`.
    pub ffprobe_bin: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str, default: &str| {
            PathBuf::from(
                lookup(key)
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| default.to_string()),
            )
        };

        Self {
            client_secrets_file: path("CLIENT_SECRETS_FILE", "client_secrets.json"),
            token_cache_file: path("TOKEN_CACHE_FILE", "token.json"),
            intro_video: path("INTRO_VIDEO", "intro.mp4"),
            intro_video_short: path("INTRO_VIDEO_SHORT", "intro_short.mp4"),
            intro_thumbnail: path("INTRO_THUMBNAIL", "intro.jpg"),
            output_dir: path("OUTPUT_DIR", "output"),
            download_dir: path("DOWNLOAD_DIR", "downloads"),
            yt_dlp_bin: path("YT_DLP_BIN", "yt-dlp"),
            ffmpeg_bin: path("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: path("FFPROBE_BIN", "ffprobe"),
        }
    }

    /// Fails unless the intro asset exists as a regular file.
    pub fn require_intro(&self) -> Result<(), Error> {
        require_file(&self.intro_video, "intro video", "INTRO_VIDEO")
    }

    /// Fails unless the OAuth client configuration exists.
    pub fn require_client_secrets(&self) -> Result<(), Error> {
        require_file(
            &self.client_secrets_file,
            "OAuth client secrets",
            "CLIENT_SECRETS_FILE",
        )
    }

    /// The vertical intro, if one has been provided.
    pub fn short_intro(&self) -> Option<&Path> {
        self.intro_video_short
            .is_file()
            .then_some(self.intro_video_short.as_path())
    }

    /// The upload thumbnail, if one has been provided.
    pub fn thumbnail(&self) -> Option<&Path> {
        self.intro_thumbnail
            .is_file()
            .then_some(self.intro_thumbnail.as_path())
    }

    /// Creates the output and download directories.
    pub async fn ensure_directories(&self) -> eyre::Result<()> {
        use eyre::Context;
        for dir in [&self.output_dir, &self.download_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn require_file(path: &Path, what: &str, var: &str) -> Result<(), Error> {
    if path.is_file() {
        Ok(())
    } else {
        Err(Error::Config(eyre::eyre!(
            "{what} not found at '{}' (set {var} to point at it)",
            path.display()
        )))
    }
}
