//! YouTube Data API v3 client library.
//!
//! Only the handful of endpoints ClipStream needs are covered:
//!
//! - `channels.list` to find the channel's uploads playlist,
//! - `playlistItems.list` to list recent uploads,
//! - `videos.insert` through the resumable upload protocol,
//! - `thumbnails.set`.
//!
//! Every request is authorized with a token from [`crate::credentials::CredentialStore`]; list
//! endpoints are exposed as [`PagedStream`]s that fetch further pages on demand.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use clipstream::credentials::CredentialStore;
//! use clipstream::oauth::OAuthManager;
//! use clipstream::youtube_api::YouTubeClient;
//! use std::sync::Arc;
//!
//! # async fn example() -> eyre::Result<()> {
//! let oauth = OAuthManager::from_client_secrets("client_secrets.json".as_ref())?;
//! let store = Arc::new(CredentialStore::new("token.json", oauth));
//! let client = YouTubeClient::new(store, reqwest::Client::new());
//!
//! for item in client.list_recent_uploads(10).await? {
//!     println!("{} {:?}", item.snippet.title, item.watch_url());
//! }
//! # Ok(())
//! # }
//! ```

pub mod channels;
pub mod client;
pub mod playlist_items;
pub mod types;
pub mod videos;

pub use client::{Endpoints, YouTubeClient};
pub use playlist_items::PlaylistItem;
pub use types::{PageInfo, PagedStream};
pub use videos::{Video, VideoInsertRequest};
