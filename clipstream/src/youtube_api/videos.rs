//! YouTube Videos API types used by `videos.insert`.

use crate::model::Privacy;
use serde::{Deserialize, Serialize};

/// Request body of `videos.insert` with `part=snippet,status`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertRequest {
    pub snippet: VideoInsertSnippet,
    pub status: VideoInsertStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertSnippet {
    pub title: String,
    pub description: String,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: Privacy,
    #[serde(rename = "selfDeclaredMadeForKids")]
    pub self_declared_made_for_kids: bool,
}

impl VideoInsertRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        category_id: impl Into<String>,
        privacy: Privacy,
    ) -> Self {
        Self {
            snippet: VideoInsertSnippet {
                title: title.into(),
                description: description.into(),
                category_id: category_id.into(),
                tags: Vec::new(),
            },
            status: VideoInsertStatus {
                privacy_status: privacy,
                self_declared_made_for_kids: false,
            },
        }
    }
}

/// A `video` resource as returned by `videos.insert`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Deserialize)]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    pub status: Option<VideoStatus>,
}

/// See: <https://developers.google.com/youtube/v3/docs/videos#status>
#[derive(Debug, Deserialize)]
pub struct VideoStatus {
    #[serde(rename = "uploadStatus")]
    pub upload_status: Option<String>,
    #[serde(rename = "privacyStatus")]
    pub privacy_status: Option<Privacy>,
}

impl Video {
    /// Privacy YouTube actually applied, if it told us.
    pub fn privacy(&self) -> Option<Privacy> {
        self.status.as_ref()?.privacy_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_body_matches_api_shape() {
        let body = VideoInsertRequest::new("Title", "Desc", "22", Privacy::Unlisted);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "snippet": {"title": "Title", "description": "Desc", "categoryId": "22"},
                "status": {"privacyStatus": "unlisted", "selfDeclaredMadeForKids": false}
            })
        );
    }

    #[test]
    fn inserted_video_reports_privacy() {
        let json = r#"{
            "kind": "youtube#video",
            "id": "abcdefghijk",
            "snippet": {"title": "x"},
            "status": {"uploadStatus": "uploaded", "privacyStatus": "private", "license": "youtube"}
        }"#;
        let video: Video = serde_json::from_str(json).unwrap();
        assert_eq!(video.id, "abcdefghijk");
        assert_eq!(video.privacy(), Some(Privacy::Private));
    }
}
