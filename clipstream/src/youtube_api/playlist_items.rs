//! YouTube PlaylistItems API types.

use crate::model::watch_url;
use crate::youtube_api::types::PageInfo;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `playlistItems.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlistItems/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistItemListResponse {
    #[serde(default)]
    pub items: VecDeque<PlaylistItem>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// One entry of a playlist.
///
/// See: <https://developers.google.com/youtube/v3/docs/playlistItems#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    pub snippet: PlaylistItemSnippet,
}

impl PlaylistItem {
    pub fn video_id(&self) -> Option<&str> {
        self.snippet.resource_id.video_id.as_deref()
    }

    pub fn watch_url(&self) -> Option<String> {
        self.video_id().map(watch_url)
    }
}

/// See: <https://developers.google.com/youtube/v3/docs/playlistItems#snippet>
#[derive(Debug, Serialize, Deserialize)]
pub struct PlaylistItemSnippet {
    pub title: String,
    /// When the item was added to the playlist; for the uploads playlist, the upload time.
    #[serde(rename = "publishedAt")]
    pub published_at: Option<Timestamp>,
    #[serde(rename = "resourceId")]
    pub resource_id: ResourceId,
    /// Zero-based position in the playlist.
    pub position: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: Option<String>,
    #[serde(rename = "videoId")]
    pub video_id: Option<String>,
}
