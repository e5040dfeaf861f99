//! Processing a whole playlist: download, add the intro, upload, for each video in turn.
//!
//! A failure of one video is logged and counted, and the run moves on to the next one. Only a
//! playlist that cannot be resolved at all ends the run early.

use crate::compositor::{Compositor, Intros};
use crate::downloader::Downloader;
use crate::error::{Error, Result};
use crate::model::{Privacy, UploadRequest, UploadResult, VideoSource};
use crate::storage;
use crate::uploader::{Uploader, default_description};
use std::fmt;
use std::path::PathBuf;
use tracing::instrument;

/// Number of playlist entries processed when no limit is given.
pub const DEFAULT_LIMIT: usize = 6;

/// What happened to one playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Uploaded(UploadResult),
    Failed {
        /// The step that failed, see [`Error::stage`].
        stage: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub source: VideoSource,
    pub outcome: Outcome,
}

/// Per-item results of a batch run, in playlist order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub items: Vec<ItemOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Uploaded(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn uploads(&self) -> impl Iterator<Item = &UploadResult> {
        self.items.iter().filter_map(|i| match &i.outcome {
            Outcome::Uploaded(result) => Some(result),
            Outcome::Failed { .. } => None,
        })
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Batch complete: {} uploaded, {} failed",
            self.succeeded(),
            self.failed()
        )?;
        for item in &self.items {
            let title = item.source.display_title();
            match &item.outcome {
                Outcome::Uploaded(result) => {
                    writeln!(f, "  ok     {title} -> {} ({})", result.url, result.privacy)?
                }
                Outcome::Failed { stage, message } => {
                    writeln!(f, "  FAILED {title} [{stage}]: {message}")?
                }
            }
        }
        Ok(())
    }
}

/// Runs playlists through a [`Downloader`], a [`Compositor`] and an [`Uploader`].
#[derive(Debug)]
pub struct BatchRunner<D, C, U> {
    downloader: D,
    compositor: C,
    uploader: U,
    intros: Intros,
    download_dir: PathBuf,
    output_dir: PathBuf,
}

impl<D, C, U> BatchRunner<D, C, U>
where
    D: Downloader,
    C: Compositor,
    U: Uploader,
{
    pub fn new(
        downloader: D,
        compositor: C,
        uploader: U,
        intros: Intros,
        download_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            compositor,
            uploader,
            intros,
            download_dir: download_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Processes up to `limit` videos of the playlist, uploading each with `privacy`.
    ///
    /// Fails only if the playlist cannot be resolved or has no usable videos; per-video failures
    /// end up in the summary.
    #[instrument(skip(self))]
    pub async fn run(
        &self,
        playlist_url: &str,
        limit: usize,
        privacy: Privacy,
    ) -> Result<BatchSummary> {
        let mut sources = self.downloader.resolve_playlist(playlist_url, limit).await?;
        sources.truncate(limit);
        if sources.is_empty() {
            return Err(Error::Download(eyre::eyre!(
                "no videos found in playlist {playlist_url}"
            )));
        }
        tracing::info!(videos = sources.len(), "resolved playlist");

        let total = sources.len();
        let mut summary = BatchSummary::default();
        for (i, source) in sources.into_iter().enumerate() {
            tracing::info!(
                id = %source.id,
                "[{}/{total}] processing {}",
                i + 1,
                source.display_title()
            );
            let outcome = match self.process(&source, privacy).await {
                Ok(result) => {
                    tracing::info!(id = %source.id, url = %result.url, "uploaded");
                    Outcome::Uploaded(result)
                }
                Err(e) => {
                    tracing::warn!(id = %source.id, stage = e.stage(), "skipping video: {e}");
                    Outcome::Failed {
                        stage: e.stage(),
                        message: e.to_string(),
                    }
                }
            };
            summary.items.push(ItemOutcome { source, outcome });
        }

        storage::check_directories(&[&self.download_dir, &self.output_dir].map(PathBuf::as_path))
            .await;
        Ok(summary)
    }

    async fn process(&self, source: &VideoSource, privacy: Privacy) -> Result<UploadResult> {
        let download = self
            .downloader
            .download(&source.url(), &self.download_dir)
            .await?;

        let intro = self.intros.for_main(&download);
        let composed = self
            .compositor
            .composite(intro, &download, &self.output_dir)
            .await?;

        let description = source
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_description(&source.id));
        let mut request =
            UploadRequest::new(&composed, privacy, source.display_title(), description);
        if composed.info.is_vertical() {
            request = request.tag_as_short();
        }
        let result = self.uploader.upload(request).await?;

        if let Err(e) = tokio::fs::remove_file(&download.path).await {
            tracing::warn!(path = %download.path.display(), "could not remove download: {e}");
        }
        Ok(result)
    }
}

/// Turns a fatal batch error into the message shown before exiting.
pub fn fatal_message(err: &Error) -> String {
    match err {
        Error::Download(_) => format!("could not resolve playlist: {err}"),
        _ => err.to_string(),
    }
}
