//! Publishing composed videos to the operator's channel.

use crate::config::Settings;
use crate::credentials::{Authorizer, CredentialStore};
use crate::error::{Error, Result};
use crate::model::{UploadRequest, UploadResult};
use crate::oauth::OAuthManager;
use crate::youtube_api::{VideoInsertRequest, YouTubeClient};
use eyre::Context;
use jiff::Timestamp;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// How many uploads "list recent uploads" shows unless told otherwise.
pub const DEFAULT_RECENT_UPLOADS: u32 = 10;

/// YouTube rejects longer titles outright.
const MAX_TITLE_CHARS: usize = 100;

/// Pushes a local file to the platform as a new video.
pub trait Uploader {
    /// Creates one new video from `request.asset`. Not idempotent: calling again after a
    /// failure part-way through may leave a duplicate on the channel.
    fn upload(&self, request: UploadRequest<'_>) -> impl Future<Output = Result<UploadResult>>;

    /// The newest `max_results` videos on the authenticated channel, newest first.
    fn list_recent_uploads(
        &self,
        max_results: u32,
    ) -> impl Future<Output = Result<Vec<RecentUpload>>>;
}

/// One entry of the channel's uploads playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentUpload {
    pub title: String,
    pub url: Option<String>,
    pub published_at: Option<Timestamp>,
}

/// [`Uploader`] backed by the YouTube Data API.
#[derive(Debug, Clone)]
pub struct YouTubeUploader<A = OAuthManager> {
    client: YouTubeClient<A>,
    thumbnail: Option<PathBuf>,
}

impl YouTubeUploader {
    /// Wires up OAuth, the token cache and the API client from `settings`.
    ///
    /// Nothing talks to the network yet; consent or refresh happens on the first API call.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.require_client_secrets()?;
        let oauth =
            OAuthManager::from_client_secrets(&settings.client_secrets_file).map_err(Error::Config)?;
        let store = CredentialStore::new(&settings.token_cache_file, oauth);
        let client = YouTubeClient::new(Arc::new(store), reqwest::Client::new());
        Ok(Self::new(client, settings.thumbnail().map(Path::to_path_buf)))
    }
}

impl<A: Authorizer> YouTubeUploader<A> {
    /// `thumbnail`, when given, is set on every uploaded video.
    pub fn new(client: YouTubeClient<A>, thumbnail: Option<PathBuf>) -> Self {
        Self { client, thumbnail }
    }

    pub fn client(&self) -> &YouTubeClient<A> {
        &self.client
    }

    /// Makes sure a usable access token is at hand, running consent if necessary.
    pub async fn authenticate(&self) -> Result<()> {
        self.client
            .fresh_access_token()
            .await
            .map(|_| ())
            .map_err(|e| classify(e, Error::Auth))
    }

    #[instrument(skip_all, fields(path = %request.asset.path.display(), privacy = %request.privacy))]
    async fn publish(&self, request: UploadRequest<'_>) -> eyre::Result<UploadResult> {
        let path = request.asset.path();
        if !path.is_file() {
            eyre::bail!("{} does not exist", path.display());
        }

        let metadata = VideoInsertRequest::new(
            sanitize_title(&request.title),
            request.description.clone(),
            request.category_id.clone(),
            request.privacy,
        );
        let video = self.client.insert_video(&metadata, path).await?;
        let privacy = video.privacy().unwrap_or(request.privacy);
        if privacy != request.privacy {
            tracing::warn!(
                requested = %request.privacy,
                applied = %privacy,
                "platform applied a different privacy level"
            );
        }

        if let Some(thumbnail) = self.thumbnail.as_deref() {
            if let Err(e) = self.client.set_thumbnail(&video.id, thumbnail).await {
                tracing::warn!(video_id = %video.id, "could not set thumbnail: {e:#}");
            }
        }

        Ok(UploadResult::new(video.id, privacy))
    }
}

impl<A: Authorizer> Uploader for YouTubeUploader<A> {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadResult> {
        self.publish(request)
            .await
            .map_err(|e| classify(e, Error::Upload))
    }

    async fn list_recent_uploads(&self, max_results: u32) -> Result<Vec<RecentUpload>> {
        let items = self
            .client
            .list_recent_uploads(max_results)
            .await
            .context("list recent uploads")
            .map_err(|e| classify(e, Error::Listing))?;
        Ok(items
            .into_iter()
            .map(|item| RecentUpload {
                url: item.watch_url(),
                title: item.snippet.title,
                published_at: item.snippet.published_at,
            })
            .collect())
    }
}

/// Keeps authentication failures labeled as such; anything else becomes `wrap(report)`.
fn classify(report: eyre::Report, wrap: fn(eyre::Report) -> Error) -> Error {
    if matches!(report.downcast_ref::<Error>(), Some(Error::Auth(_))) {
        match report.downcast::<Error>() {
            Ok(err) => err,
            Err(report) => wrap(report),
        }
    } else {
        wrap(report)
    }
}

/// Strips characters the API refuses and cuts the title to the allowed length.
fn sanitize_title(title: &str) -> String {
    let cleaned: String = title.chars().filter(|c| !matches!(c, '<' | '>')).collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().count() <= MAX_TITLE_CHARS {
        return cleaned.to_string();
    }
    cleaned
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Description for batch re-uploads whose source had none.
pub fn default_description(source_id: &str) -> String {
    format!("Re-uploaded with intro. Original: https://youtu.be/{source_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::tests::FakeAuthorizer;
    use crate::media::MediaInfo;
    use crate::model::{LocalAsset, Privacy};
    use crate::youtube_api::client::tests::{client_with_cached_token, fake_api};

    fn asset(path: PathBuf) -> LocalAsset {
        LocalAsset {
            path,
            info: MediaInfo::default(),
        }
    }

    #[tokio::test]
    async fn unlisted_upload_reports_applied_privacy() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip_with_intro.mp4");
        std::fs::write(&video, b"bytes").unwrap();
        let thumb = dir.path().join("intro.jpg");
        std::fs::write(&thumb, b"\xFF\xD8\xFF").unwrap();

        let (endpoints, seen) = fake_api().await;
        let (client, _store) = client_with_cached_token(dir.path());
        let uploader = YouTubeUploader::new(client.with_endpoints(endpoints), Some(thumb));

        let asset = asset(video);
        let request = UploadRequest::new(&asset, Privacy::Unlisted, "Clip <b>", "desc");
        let result = uploader.upload(request).await.unwrap();
        assert_eq!(result.video_id, "newVideo123");
        assert_eq!(result.privacy, Privacy::Unlisted);
        assert_eq!(result.url, "https://www.youtube.com/watch?v=newVideo123");

        let seen = seen.lock().unwrap();
        let body = seen.init_body.as_ref().unwrap();
        assert_eq!(body["snippet"]["title"], "Clip b");
        assert_eq!(body["snippet"]["categoryId"], "22");
        assert_eq!(
            seen.thumbnail_for.as_deref(),
            Some("videoId=newVideo123")
        );
    }

    #[tokio::test]
    async fn thumbnail_failure_does_not_fail_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip_with_intro.mp4");
        std::fs::write(&video, b"bytes").unwrap();

        let (endpoints, seen) = fake_api().await;
        let (client, _store) = client_with_cached_token(dir.path());
        let uploader = YouTubeUploader::new(
            client.with_endpoints(endpoints),
            Some(dir.path().join("missing.jpg")),
        );

        let asset = asset(video);
        let result = uploader
            .upload(UploadRequest::new(&asset, Privacy::Unlisted, "Clip", ""))
            .await
            .unwrap();
        assert_eq!(result.video_id, "newVideo123");
        assert_eq!(seen.lock().unwrap().thumbnail_for, None);
    }

    #[tokio::test]
    async fn missing_file_is_an_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let (client, _store) = client_with_cached_token(dir.path());
        let uploader = YouTubeUploader::new(client, None);

        let asset = asset(dir.path().join("gone.mp4"));
        let err = uploader
            .upload(UploadRequest::new(&asset, Privacy::Private, "Clip", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upload(_)), "{err}");
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[tokio::test]
    async fn consent_failure_stays_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("clip_with_intro.mp4");
        std::fs::write(&video, b"bytes").unwrap();

        // No cache and a consent flow that fails.
        let authorizer = FakeAuthorizer {
            fail_consent: true,
            ..FakeAuthorizer::default()
        };
        let store = Arc::new(CredentialStore::new(dir.path().join("token.json"), authorizer));
        let client = YouTubeClient::new(store, reqwest::Client::new());
        let uploader = YouTubeUploader::new(client, None);

        let asset = asset(video);
        let err = uploader
            .upload(UploadRequest::new(&asset, Privacy::Private, "Clip", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "{err}");
    }

    #[tokio::test]
    async fn recent_uploads_have_titles_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoints, _seen) = fake_api().await;
        let (client, _store) = client_with_cached_token(dir.path());
        let uploader = YouTubeUploader::new(client.with_endpoints(endpoints), None);

        let recent = uploader.list_recent_uploads(DEFAULT_RECENT_UPLOADS).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].title, "newest");
        assert_eq!(
            recent[0].url.as_deref(),
            Some("https://www.youtube.com/watch?v=aaaaaaaaaaa")
        );
    }

    #[tokio::test]
    async fn listing_failure_is_not_an_upload_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (mut endpoints, _seen) = fake_api().await;
        endpoints.api.push_str("/gone");
        let (client, _store) = client_with_cached_token(dir.path());
        let uploader = YouTubeUploader::new(client.with_endpoints(endpoints), None);

        let err = uploader
            .list_recent_uploads(DEFAULT_RECENT_UPLOADS)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Listing(_)), "{err}");
        assert!(err.to_string().starts_with("listing uploads failed"), "{err}");
    }

    #[test]
    fn long_titles_are_cut() {
        let title = "x".repeat(150);
        assert_eq!(sanitize_title(&title).chars().count(), MAX_TITLE_CHARS);
        assert_eq!(sanitize_title("  fine  "), "fine");
    }

    #[test]
    fn batch_description_links_the_source() {
        assert_eq!(
            default_description("dQw4w9WgXcQ"),
            "Re-uploaded with intro. Original: https://youtu.be/dQw4w9WgXcQ"
        );
    }
}
