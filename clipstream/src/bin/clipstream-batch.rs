use clap::Parser;
use clipstream::batch::{BatchRunner, BatchSummary, DEFAULT_LIMIT, fatal_message};
use clipstream::compositor::{Ffmpeg, Intros};
use clipstream::config::Settings;
use clipstream::downloader::YtDlp;
use clipstream::model::Privacy;
use clipstream::uploader::YouTubeUploader;
use clipstream::{Error, Result};
use std::process::ExitCode;

/// Add the intro to the videos of a playlist and upload the results.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Playlist URL (a single video URL works too).
    playlist_url: String,

    /// Process at most this many videos.
    #[arg(short, long, default_value_t = DEFAULT_LIMIT as u16, value_parser = clap::value_parser!(u16).range(1..))]
    limit: u16,

    /// Visibility of the uploaded videos.
    #[arg(short, long, value_enum, default_value_t = Privacy::Private)]
    privacy: Privacy,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    clipstream::init_logging();
    let args = Args::parse();

    match run(&args).await {
        Ok(summary) => {
            println!("\n{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", fatal_message(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<BatchSummary> {
    let settings = Settings::from_env();
    tracing::debug!(?settings, "loaded settings");

    // everything that can be checked locally goes before the first network call
    settings.require_client_secrets()?;
    let ffmpeg = Ffmpeg::new(&settings.ffmpeg_bin, &settings.ffprobe_bin);
    let intros = Intros::load(&ffmpeg, &settings).await?;
    settings.ensure_directories().await.map_err(Error::Config)?;

    let uploader = YouTubeUploader::from_settings(&settings)?;
    uploader.authenticate().await?;

    let runner = BatchRunner::new(
        YtDlp::new(&settings.yt_dlp_bin, &settings.ffprobe_bin),
        ffmpeg,
        uploader,
        intros,
        &settings.download_dir,
        &settings.output_dir,
    );
    runner
        .run(&args.playlist_url, usize::from(args.limit), args.privacy)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["clipstream-batch", "https://youtube.com/playlist?list=PL1"])
            .unwrap();
        assert_eq!(args.limit, 6);
        assert_eq!(args.privacy, Privacy::Private);
    }

    #[test]
    fn short_flags() {
        let args = Args::try_parse_from(["clipstream-batch", "URL", "-l", "2", "-p", "unlisted"])
            .unwrap();
        assert_eq!(args.limit, 2);
        assert_eq!(args.privacy, Privacy::Unlisted);
        assert!(Args::try_parse_from(["clipstream-batch", "URL", "--limit", "0"]).is_err());
        assert!(Args::try_parse_from(["clipstream-batch", "URL", "-p", "secret"]).is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
