//! Error taxonomy surfaced by the workflow steps.
//!
//! Internally every step works with [`eyre::Result`] and attaches context as it goes. At the
//! boundary of each step the report is wrapped in the variant that names *which* step failed,
//! so runners can decide whether the failure is fatal to the run or only to the current item.

/// A failure of one of the workflow steps.
///
/// The wrapped report keeps the full context chain; [`Display`](std::fmt::Display) renders it on
/// a single line so it fits the one-line-per-failure console summaries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unrecoverable startup problem (missing client secrets, missing intro asset, ...).
    #[error("configuration error: {0:#}")]
    Config(eyre::Report),
    /// Consent or token failure. Recoverable by re-running consent.
    #[error("authentication failed: {0:#}")]
    Auth(eyre::Report),
    /// The source video could not be fetched.
    #[error("download failed: {0:#}")]
    Download(eyre::Report),
    /// The intro and main video could not be joined.
    #[error("composition failed: {0:#}")]
    Composition(eyre::Report),
    /// The platform rejected the upload or the connection failed mid-way.
    #[error("upload failed: {0:#}")]
    Upload(eyre::Report),
    /// The channel's existing uploads could not be read.
    #[error("listing uploads failed: {0:#}")]
    Listing(eyre::Report),
}

impl Error {
    /// Short name of the step that failed, used in batch summaries.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Auth(_) => "auth",
            Error::Download(_) => "download",
            Error::Composition(_) => "composition",
            Error::Upload(_) => "upload",
            Error::Listing(_) => "listing",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
