//! Values passed between the workflow steps.

use crate::media::MediaInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Visibility of an uploaded video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status.privacyStatus>
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Private,
    Unlisted,
    Public,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Privacy::Private => "private",
            Privacy::Unlisted => "unlisted",
            Privacy::Public => "public",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privacy {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Privacy::Private),
            "unlisted" => Ok(Privacy::Unlisted),
            "public" => Ok(Privacy::Public),
            other => eyre::bail!("unknown privacy level '{other}' (private, unlisted or public)"),
        }
    }
}

/// A remote video to be processed, usually one entry of a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSource {
    /// Platform video ID.
    pub id: String,
    /// Position in the playlist it came from (0-based), if any.
    pub playlist_index: Option<usize>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl VideoSource {
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            playlist_index: None,
            title: None,
            description: None,
        }
    }

    pub fn url(&self) -> String {
        watch_url(&self.id)
    }

    /// Title to use for display and re-upload; falls back to the ID.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// A video file on local disk together with what `ffprobe` reported about it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub info: MediaInfo,
}

impl LocalAsset {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without extension, used to derive output names and default titles.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string())
    }
}

/// Everything needed to create one new video on the channel.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub asset: &'a LocalAsset,
    pub privacy: Privacy,
    pub title: String,
    pub description: String,
    /// YouTube category; `22` is "People & Blogs".
    pub category_id: String,
}

impl<'a> UploadRequest<'a> {
    pub fn new(
        asset: &'a LocalAsset,
        privacy: Privacy,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            asset,
            privacy,
            title: title.into(),
            description: description.into(),
            category_id: "22".to_string(),
        }
    }

    /// Tags vertical uploads as Shorts unless the title already says so.
    pub fn tag_as_short(mut self) -> Self {
        if !self.title.to_lowercase().contains("#shorts") {
            self.title.push_str(" #Shorts");
        }
        self
    }
}

/// What the platform reported back after an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub video_id: String,
    pub url: String,
    /// Privacy actually applied by the platform.
    pub privacy: Privacy,
}

impl UploadResult {
    pub fn new(video_id: impl Into<String>, privacy: Privacy) -> Self {
        let video_id = video_id.into();
        Self {
            url: watch_url(&video_id),
            video_id,
            privacy,
        }
    }
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Extracts the video ID from the common YouTube URL shapes, or accepts a bare ID.
pub fn video_id_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }
    let url = Url::parse(input).ok()?;
    youtube_video_id(&url).filter(|id| is_video_id(id))
}

fn is_video_id(s: &str) -> bool {
    s.len() == 11
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn youtube_video_id(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?;
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host);
    let mut segments = url.path_segments()?;

    match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "music.youtube.com" => match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            "shorts" | "embed" | "live" => segments.next().map(str::to_string),
            _ => None,
        },
        _ => None,
    }
}
