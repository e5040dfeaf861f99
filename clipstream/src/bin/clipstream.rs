use clipstream::compositor::{Ffmpeg, Intros};
use clipstream::config::Settings;
use clipstream::downloader::YtDlp;
use clipstream::interactive::{Console, Session};
use clipstream::storage;
use clipstream::uploader::YouTubeUploader;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    clipstream::init_logging();

    println!("{}", "=".repeat(60));
    println!("ClipStream - intro stitcher & uploader");
    println!("{}\n", "=".repeat(60));

    let settings = Settings::from_env();
    tracing::debug!(?settings, "loaded settings");
    if let Err(e) = settings.ensure_directories().await {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }
    let dirs = [&settings.download_dir, &settings.output_dir].map(PathBuf::as_path);
    storage::check_directories(&dirs).await;

    let uploader = match YouTubeUploader::from_settings(&settings) {
        Ok(uploader) => uploader,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Download the OAuth client secrets from the Google Cloud Console.");
            return ExitCode::FAILURE;
        }
    };

    let ffmpeg = Ffmpeg::new(&settings.ffmpeg_bin, &settings.ffprobe_bin);
    let intros = match Intros::load(&ffmpeg, &settings).await {
        Ok(intros) => Some(intros),
        Err(e) => {
            println!("Note: {e}");
            println!("Video processing options are disabled until an intro video is available.\n");
            None
        }
    };

    let session = Session::new(
        YtDlp::new(&settings.yt_dlp_bin, &settings.ffprobe_bin),
        ffmpeg,
        uploader,
        intros,
        &settings.download_dir,
        &settings.output_dir,
    );
    let mut console = Console::stdin(tokio::io::stdout());
    match session.run(&mut console).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
