//! Core YouTube API client functionality.

use crate::credentials::{Authorizer, CredentialStore};
use crate::oauth::OAuthManager;
use crate::youtube_api::{
    channels::ChannelListResponse,
    playlist_items::{PlaylistItem, PlaylistItemListResponse},
    types::PagedStream,
    videos::{Video, VideoInsertRequest},
};
use bytes::Bytes;
use eyre::Context;
use http::Method;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio_stream::{Stream, StreamExt};
use tracing::instrument;

/// Size of the reads that feed the upload body.
const UPLOAD_CHUNK: usize = 4 * 1024 * 1024;

/// Base URLs of the Data API and its media-upload twin.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api: String,
    pub upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: "https://www.googleapis.com/youtube/v3".to_string(),
            upload: "https://www.googleapis.com/upload/youtube/v3".to_string(),
        }
    }
}

/// Client for the parts of the YouTube Data API v3 that ClipStream uses.
///
/// Access tokens come from the [`CredentialStore`]. The most recent one is kept in memory and
/// the store is consulted again once it expires, so a long batch survives token rotation.
pub struct YouTubeClient<A = OAuthManager> {
    credentials: Arc<CredentialStore<A>>,
    /// Access token handed out by the store most recently.
    current: Arc<Mutex<Option<crate::credentials::Credential>>>,
    endpoints: Arc<Endpoints>,
    client: reqwest::Client,
}

impl<A> Clone for YouTubeClient<A> {
    fn clone(&self) -> Self {
        Self {
            credentials: Arc::clone(&self.credentials),
            current: Arc::clone(&self.current),
            endpoints: Arc::clone(&self.endpoints),
            client: self.client.clone(),
        }
    }
}

impl<A> std::fmt::Debug for YouTubeClient<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl<A: Authorizer> YouTubeClient<A> {
    /// Creates a client against the public Data API endpoints.
    ///
    /// # Arguments
    ///
    /// * `credentials` - The [`CredentialStore`] that hands out (and refreshes) access tokens
    /// * `client` - HTTP client used for every API call, including the upload itself
    pub fn new(credentials: Arc<CredentialStore<A>>, client: reqwest::Client) -> Self {
        Self {
            credentials,
            current: Arc::new(Mutex::new(None)),
            endpoints: Arc::new(Endpoints::default()),
            client,
        }
    }

    /// Points the client at different base URLs.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = Arc::new(endpoints);
        self
    }

    /// Gets a guaranteed-fresh access token, going back to the credential store if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    pub(crate) async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut current = self.current.lock().await;
        if let Some(credential) = current.as_ref().filter(|c| !c.is_expired()) {
            return Ok(credential.access_token().to_string());
        }

        tracing::debug!("no fresh access token in memory, asking credential store");
        let credential = self.credentials.get_valid_credential().await?;
        let access_token = credential.access_token().to_string();
        *current = Some(credential);
        Ok(access_token)
    }

    /// Starts a request with the bearer token attached.
    async fn authorized(&self, method: Method, url: &str) -> eyre::Result<reqwest::RequestBuilder> {
        let access_token = self.fresh_access_token().await?;
        Ok(self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", access_token)))
    }

    /// Sends `request` and turns any non-2xx answer into an error carrying the response body.
    async fn send_checked(
        method: &Method,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> eyre::Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to YouTube API: {}", method, url))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(eyre::eyre!(
                "YouTube API {} request failed with status {}: {}",
                method,
                status_code,
                error_text
            ));
        }

        Ok(response)
    }

    /// Makes an authenticated JSON request to the YouTube API with common error handling.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<reqwest::Response> {
        let mut request = self.authorized(method.clone(), url).await?;

        if let Some(params) = query_params {
            request = request.query(params);
        }

        if let Some(body) = json_body {
            request = request
                .header("Content-Type", "application/json")
                .json(body);
        }

        Self::send_checked(&method, url, request).await
    }

    /// ID of the authenticated channel's uploads playlist.
    ///
    /// Uses `channels.list` with `mine=true&part=contentDetails`.
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self), ret)]
    pub async fn uploads_playlist_id(&self) -> eyre::Result<String> {
        let url = format!("{}/channels", self.endpoints.api);
        let query_params = [("part", "contentDetails"), ("mine", "true")];

        let response = self
            .make_authenticated_request(Method::GET, &url, Some(&query_params), None::<&()>)
            .await?;
        let channels: ChannelListResponse = response
            .json()
            .await
            .context("parse YouTube channels API response as JSON")?;

        tracing::debug!(
            total_results = channels.page_info.total_results,
            returned_items = channels.items.len(),
            "fetched channels"
        );

        channels
            .items
            .iter()
            .find_map(|c| c.uploads_playlist_id())
            .map(str::to_string)
            .ok_or_else(|| eyre::eyre!("the authenticated account has no YouTube channel"))
    }

    /// Returns a paginated stream of the items of a playlist, in playlist order.
    ///
    /// For a channel's uploads playlist that is newest first.
    ///
    /// # Arguments
    ///
    /// * `playlist_id` - The playlist to page through, e.g. from [`Self::uploads_playlist_id`]
    /// * `page_size` - Items requested per page (the API caps this at 50)
    ///
    /// # Returns
    ///
    /// A stream that fetches the next page only once the current one has been consumed.
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self))]
    pub fn list_playlist_items<'a>(
        &'a self,
        playlist_id: &'a str,
        page_size: u32,
    ) -> impl Stream<Item = eyre::Result<PlaylistItem>> + use<'a, A> {
        PagedStream::new(move |page_token| async move {
            let response = self
                .list_playlist_items_internal(playlist_id, page_size, page_token)
                .await?;
            Ok((response.items, response.next_page_token))
        })
    }

    /// Up to `max_results` of the channel's most recent uploads, newest first.
    #[instrument(skip(self))]
    pub async fn list_recent_uploads(&self, max_results: u32) -> eyre::Result<Vec<PlaylistItem>> {
        let playlist_id = self
            .uploads_playlist_id()
            .await
            .context("find the channel's uploads playlist")?;
        let items = self.list_playlist_items(&playlist_id, max_results.clamp(1, 50));
        let mut items = std::pin::pin!(items.take(max_results as usize));
        let mut recent = Vec::new();
        while let Some(item) = items.next().await {
            recent.push(item.context("fetch playlist item")?);
        }
        Ok(recent)
    }

    async fn list_playlist_items_internal(
        &self,
        playlist_id: &str,
        max_results: u32,
        page_token: Option<String>,
    ) -> eyre::Result<PlaylistItemListResponse> {
        let url = format!("{}/playlistItems", self.endpoints.api);
        let max_results_string = max_results.to_string();
        let mut query_params = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", max_results_string.as_str()),
        ];

        if let Some(ref token) = page_token {
            query_params.push(("pageToken", token.as_str()));
        }

        let response = self
            .make_authenticated_request(Method::GET, &url, Some(&query_params), None::<&()>)
            .await?;

        let items: PlaylistItemListResponse = response
            .json()
            .await
            .context("parse YouTube playlistItems API response as JSON")?;

        tracing::debug!(
            total_results = items.page_info.total_results,
            returned_items = items.items.len(),
            "fetched playlist items"
        );

        Ok(items)
    }

    /// Creates a video from a local file using the resumable upload protocol.
    ///
    /// The session is opened with the metadata, then the whole file is sent in a single `PUT`.
    /// Nothing is retried; a failed upload leaves no video behind (or a stuck "processing" one).
    ///
    /// # Arguments
    ///
    /// * `metadata` - Snippet and status of the new video
    /// * `path` - The file to upload; it is streamed from disk, not read into memory
    ///
    /// # Returns
    ///
    /// The created [`Video`] as reported by the API. Its status carries the privacy level the
    /// platform actually applied.
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
    #[instrument(skip(self, metadata), fields(title = %metadata.snippet.title))]
    pub async fn insert_video(
        &self,
        metadata: &VideoInsertRequest,
        path: &Path,
    ) -> eyre::Result<Video> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;
        let length = file
            .metadata()
            .await
            .with_context(|| format!("stat {}", path.display()))?
            .len();

        let url = format!("{}/videos", self.endpoints.upload);
        let length_string = length.to_string();
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Length", length_string.as_str())
            .header("X-Upload-Content-Type", "video/mp4")
            .json(metadata);
        let response = Self::send_checked(&Method::POST, &url, request)
            .await
            .context("initiate resumable upload")?;
        let session = response
            .headers()
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| eyre::eyre!("resumable upload session has no Location header"))?;
        tracing::debug!(bytes = length, "opened resumable upload session");

        let body = reqwest::Body::wrap_stream(file_chunks(file, length));
        let request = self
            .authorized(Method::PUT, &session)
            .await?
            .header(http::header::CONTENT_LENGTH, length_string.as_str())
            .header(http::header::CONTENT_TYPE, "video/mp4")
            .body(body);
        let response = Self::send_checked(&Method::PUT, &session, request)
            .await
            .context("send video bytes")?;

        let video: Video = response
            .json()
            .await
            .context("parse YouTube videos.insert response as JSON")?;
        tracing::info!(video_id = %video.id, "upload complete");
        Ok(video)
    }

    /// Sets a custom thumbnail on a video the channel owns.
    ///
    /// # Arguments
    ///
    /// * `video_id` - The video to change
    /// * `image` - A JPEG or PNG of at most 2 MB
    ///
    /// <https://developers.google.com/youtube/v3/docs/thumbnails/set>
    #[instrument(skip(self))]
    pub async fn set_thumbnail(&self, video_id: &str, image: &Path) -> eyre::Result<()> {
        let bytes = tokio::fs::read(image)
            .await
            .with_context(|| format!("read {}", image.display()))?;
        let content_type = match image
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("png") => "image/png",
            _ => "image/jpeg",
        };

        let url = format!("{}/thumbnails/set", self.endpoints.upload);
        let request = self
            .authorized(Method::POST, &url)
            .await?
            .query(&[("videoId", video_id)])
            .header(http::header::CONTENT_TYPE, content_type)
            .body(bytes);
        Self::send_checked(&Method::POST, &url, request).await?;
        tracing::debug!(video_id, "thumbnail set");
        Ok(())
    }
}

/// Reads `file` in chunks, logging progress every tenth of the way.
fn file_chunks(
    mut file: tokio::fs::File,
    length: u64,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    async_stream::stream! {
        let mut buf = vec![0u8; UPLOAD_CHUNK];
        let mut sent = 0u64;
        let mut reported = 0u64;
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    sent += n as u64;
                    let percent = (sent * 100).checked_div(length).unwrap_or(100);
                    if percent / 10 > reported / 10 {
                        reported = percent;
                        tracing::info!(percent, "uploading");
                    }
                    yield Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}
