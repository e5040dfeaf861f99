//! YouTube Channels API types.

use crate::youtube_api::types::PageInfo;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Response structure for the `channels.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelListResponse {
    /// A list of channels that match the request criteria.
    #[serde(default)]
    pub items: VecDeque<Channel>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
    /// Token that can be used as the value of the pageToken parameter to retrieve the next page in the result set.
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

/// A `channel` resource, with only the parts requested by this crate.
///
/// See: <https://developers.google.com/youtube/v3/docs/channels#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct Channel {
    /// The ID that YouTube uses to uniquely identify the channel.
    pub id: String,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<ChannelContentDetails>,
}

impl Channel {
    /// The playlist YouTube maintains with every video uploaded to this channel.
    pub fn uploads_playlist_id(&self) -> Option<&str> {
        self.content_details
            .as_ref()?
            .related_playlists
            .uploads
            .as_deref()
    }
}

/// See: <https://developers.google.com/youtube/v3/docs/channels#contentDetails>
#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists", default)]
    pub related_playlists: RelatedPlaylists,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RelatedPlaylists {
    /// ID of the playlist that contains the channel's uploaded videos.
    pub uploads: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_playlist_from_content_details() {
        let json = r#"{
            "kind": "youtube#channelListResponse",
            "etag": "x",
            "pageInfo": {"totalResults": 1, "resultsPerPage": 5},
            "items": [{
                "kind": "youtube#channel",
                "id": "UCabc",
                "contentDetails": {"relatedPlaylists": {"likes": "", "uploads": "UUabc"}}
            }]
        }"#;
        let response: ChannelListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 1);
        assert_eq!(response.items[0].uploads_playlist_id(), Some("UUabc"));
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn account_without_channel() {
        let json = r#"{"kind": "youtube#channelListResponse", "pageInfo": {"totalResults": 0, "resultsPerPage": 5}}"#;
        let response: ChannelListResponse = serde_json::from_str(json).unwrap();
        assert!(response.items.is_empty());
    }
}
