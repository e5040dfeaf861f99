//! Prepend a fixed intro to videos and re-upload them to YouTube.
//!
//! The workflow is a straight line: a [`downloader::Downloader`] fetches the source video, a
//! [`compositor::Compositor`] puts the intro in front of it, and an [`uploader::Uploader`]
//! publishes the result. [`interactive`] drives those steps from a menu, [`batch`] runs them over a
//! whole playlist.

pub mod batch;
pub mod compositor;
pub mod config;
pub mod credentials;
pub mod downloader;
pub mod error;
pub mod interactive;
pub mod media;
pub mod model;
pub mod oauth;
pub mod stdin;
pub mod storage;
pub mod uploader;
pub mod youtube_api;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Logs to stderr at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();
}
