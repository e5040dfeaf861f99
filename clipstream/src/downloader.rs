//! Fetching source videos with `yt-dlp`.

use crate::error::{Error, Result};
use crate::media;
use crate::model::{LocalAsset, VideoSource, video_id_from_url};
use eyre::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::instrument;

/// Resolution cap applied to downloads.
pub const FORMAT_SELECTOR: &str = "best[height<=1080]";

/// Titles yt-dlp reports for playlist entries that cannot be fetched.
const PLACEHOLDER_TITLES: [&str; 3] = ["[Private video]", "[Deleted video]", "[Unavailable]"];

/// What the platform says about a single video, without downloading it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteVideo {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<Duration>,
}

/// Turns remote URLs into local files.
pub trait Downloader {
    /// Lists the videos of a playlist in platform order, without placeholders or duplicates,
    /// truncated to `limit`.
    fn resolve_playlist(
        &self,
        playlist_url: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<VideoSource>>>;

    fn fetch_metadata(&self, video_url: &str) -> impl Future<Output = Result<RemoteVideo>>;

    /// Downloads one video into `destination_dir` as `<id>.mp4`, reusing an earlier download.
    fn download(
        &self,
        video_url: &str,
        destination_dir: &Path,
    ) -> impl Future<Output = Result<LocalAsset>>;
}

/// [`Downloader`] backed by the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
    ffprobe: PathBuf,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Runs yt-dlp and returns its stdout, or an error carrying the tail of its stderr.
    async fn run(&self, args: &[&str], url: &str) -> eyre::Result<Vec<u8>> {
        let output = Command::new(&self.bin)
            .args(args)
            .arg(url)
            .output()
            .await
            .with_context(|| format!("run {}", self.bin.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output")
                .trim();
            eyre::bail!("yt-dlp exited with {} for {url}: {reason}", output.status);
        }
        Ok(output.stdout)
    }

    #[instrument(skip(self))]
    async fn resolve(&self, playlist_url: &str, limit: usize) -> eyre::Result<Vec<VideoSource>> {
        let json = self
            .run(
                &["--flat-playlist", "--dump-single-json", "--no-warnings"],
                playlist_url,
            )
            .await?;
        let sources = parse_playlist(&json, limit).context("interpret yt-dlp playlist JSON")?;
        tracing::info!(count = sources.len(), "resolved playlist");
        Ok(sources)
    }

    async fn metadata(&self, video_url: &str) -> eyre::Result<RemoteVideo> {
        let json = self
            .run(
                &["--dump-single-json", "--no-playlist", "--skip-download", "--no-warnings"],
                video_url,
            )
            .await?;
        parse_video(&json).context("interpret yt-dlp video JSON")
    }

    #[instrument(skip(self))]
    async fn fetch(&self, video_url: &str, destination_dir: &Path) -> eyre::Result<LocalAsset> {
        let id = match video_id_from_url(video_url) {
            Some(id) => id,
            None => self.metadata(video_url).await?.id,
        };
        let target = destination_dir.join(format!("{id}.mp4"));

        if target.is_file() {
            match media::probe(&self.ffprobe, &target).await {
                Ok(info) => {
                    tracing::info!(path = %target.display(), "reusing cached download");
                    return Ok(LocalAsset { path: target, info });
                }
                Err(e) => {
                    tracing::warn!(path = %target.display(), error = %format!("{e:#}"), "cached download is unusable, fetching again");
                    tokio::fs::remove_file(&target)
                        .await
                        .with_context(|| format!("remove {}", target.display()))?;
                }
            }
        }

        tokio::fs::create_dir_all(destination_dir)
            .await
            .with_context(|| format!("create {}", destination_dir.display()))?;
        let target_arg = target.to_string_lossy();
        tracing::info!(%id, "downloading");
        self.run(
            &[
                "-f",
                FORMAT_SELECTOR,
                "--no-playlist",
                "--no-progress",
                "--no-warnings",
                "-o",
                &*target_arg,
            ],
            video_url,
        )
        .await?;

        let info = media::probe(&self.ffprobe, &target)
            .await
            .context("inspect downloaded file")?;
        Ok(LocalAsset { path: target, info })
    }
}

impl Downloader for YtDlp {
    async fn resolve_playlist(&self, playlist_url: &str, limit: usize) -> Result<Vec<VideoSource>> {
        self.resolve(playlist_url, limit)
            .await
            .with_context(|| format!("resolve playlist {playlist_url}"))
            .map_err(Error::Download)
    }

    async fn fetch_metadata(&self, video_url: &str) -> Result<RemoteVideo> {
        self.metadata(video_url)
            .await
            .with_context(|| format!("fetch metadata for {video_url}"))
            .map_err(Error::Download)
    }

    async fn download(&self, video_url: &str, destination_dir: &Path) -> Result<LocalAsset> {
        self.fetch(video_url, destination_dir)
            .await
            .with_context(|| format!("download {video_url}"))
            .map_err(Error::Download)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    duration: Option<f64>,
    /// Present for playlists; entries can be `null` for items yt-dlp gave up on.
    entries: Option<Vec<Option<YtDlpInfo>>>,
}

impl YtDlpInfo {
    fn is_placeholder(&self) -> bool {
        self.title
            .as_deref()
            .is_some_and(|t| PLACEHOLDER_TITLES.iter().any(|p| t.contains(p)))
    }
}

fn parse_playlist(json: &[u8], limit: usize) -> eyre::Result<Vec<VideoSource>> {
    let info: YtDlpInfo = serde_json::from_slice(json).context("parse JSON")?;

    let entries = match info.entries {
        Some(entries) => entries,
        // a plain video URL resolves to itself
        None => vec![Some(YtDlpInfo { entries: None, ..info })],
    };

    let mut seen = HashSet::new();
    let sources = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| Some((index, entry?)))
        .filter(|(_, entry)| !entry.is_placeholder())
        .filter_map(|(index, entry)| {
            let id = entry.id.filter(|id| !id.is_empty())?;
            Some(VideoSource {
                id,
                playlist_index: Some(index),
                title: entry.title.filter(|t| !t.is_empty()),
                description: entry.description.filter(|d| !d.is_empty()),
            })
        })
        .filter(|source| seen.insert(source.id.clone()))
        .take(limit)
        .collect();
    Ok(sources)
}

fn parse_video(json: &[u8]) -> eyre::Result<RemoteVideo> {
    let info: YtDlpInfo = serde_json::from_slice(json).context("parse JSON")?;
    let id = info
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| eyre::eyre!("yt-dlp reported no video id"))?;
    Ok(RemoteVideo {
        id,
        title: info.title,
        description: info.description.filter(|d| !d.is_empty()),
        duration: info
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64),
    })
}
