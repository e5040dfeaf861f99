//! Joining the intro and a main video with `ffmpeg`.
//!
//! Both inputs are re-encoded through one `concat` filter graph. The main video keeps its
//! resolution and frame rate; the intro is scaled to fit inside it and padded with black bars.
//! An input without audio gets generated silence of its own length, so the soundtrack of the main
//! video starts exactly when its picture does.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::media::{self, MediaInfo};
use crate::model::LocalAsset;
use eyre::Context;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::instrument;

const AUDIO_RATE: u32 = 48_000;

/// Produces a new file consisting of the intro followed by the main video.
pub trait Compositor {
    /// Inspects a local file so it can be used as an input.
    fn load(&self, path: &Path) -> impl Future<Output = Result<LocalAsset>>;

    /// Writes `<output_dir>/<main stem>_with_intro.mp4`. Never modifies `intro` or `main`.
    fn composite(
        &self,
        intro: &LocalAsset,
        main: &LocalAsset,
        output_dir: &Path,
    ) -> impl Future<Output = Result<LocalAsset>>;
}

/// [`Compositor`] that shells out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    #[instrument(skip_all, fields(intro = %intro.path.display(), main = %main.path.display()))]
    async fn join(
        &self,
        intro: &LocalAsset,
        main: &LocalAsset,
        output_dir: &Path,
    ) -> eyre::Result<LocalAsset> {
        for input in [intro, main] {
            if !input.path.is_file() {
                eyre::bail!("input not found: {}", input.path.display());
            }
        }

        let output = output_path(main, output_dir);
        let partial = output.with_extension("partial.mp4");
        for input in [intro, main] {
            if same_file(&input.path, &output) || same_file(&input.path, &partial) {
                eyre::bail!(
                    "refusing to overwrite input {} with the composed output",
                    input.path.display()
                );
            }
        }

        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("create {}", output_dir.display()))?;

        let args = ffmpeg_args(intro, main, &partial);
        tracing::debug!(?args, "running ffmpeg");
        tracing::info!(output = %output.display(), "compositing intro");
        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("run {}", self.ffmpeg.display()));

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if !run.status.success() {
            let _ = tokio::fs::remove_file(&partial).await;
            let stderr = String::from_utf8_lossy(&run.stderr);
            let tail: Vec<&str> = stderr
                .lines()
                .filter(|l| !l.trim().is_empty())
                .rev()
                .take(3)
                .collect();
            eyre::bail!(
                "ffmpeg exited with {}: {}",
                run.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }

        tokio::fs::rename(&partial, &output)
            .await
            .with_context(|| format!("move {} into place", partial.display()))?;

        let info = media::probe(&self.ffprobe, &output)
            .await
            .context("inspect composed output")?;
        tracing::debug!(duration = ?info.duration, "composed output written");
        Ok(LocalAsset { path: output, info })
    }
}

impl Compositor for Ffmpeg {
    async fn load(&self, path: &Path) -> Result<LocalAsset> {
        media::probe(&self.ffprobe, path)
            .await
            .map(|info| LocalAsset {
                path: path.to_path_buf(),
                info,
            })
            .map_err(Error::Composition)
    }

    async fn composite(
        &self,
        intro: &LocalAsset,
        main: &LocalAsset,
        output_dir: &Path,
    ) -> Result<LocalAsset> {
        self.join(intro, main, output_dir)
            .await
            .with_context(|| format!("add intro to {}", main.path.display()))
            .map_err(Error::Composition)
    }
}

/// The intro clips, probed once at startup.
#[derive(Debug, Clone)]
pub struct Intros {
    pub regular: LocalAsset,
    /// Used for vertical main videos when present.
    pub vertical: Option<LocalAsset>,
}

impl Intros {
    /// Probes the configured intro and, if one exists, the vertical intro.
    ///
    /// A missing or unreadable regular intro is a configuration error; a broken vertical intro
    /// is only logged.
    pub async fn load(compositor: &impl Compositor, settings: &Settings) -> Result<Self> {
        settings.require_intro()?;
        let regular = compositor.load(&settings.intro_video).await.map_err(|e| {
            Error::Config(eyre::eyre!(
                "intro video at '{}' is not usable: {e}",
                settings.intro_video.display()
            ))
        })?;

        let vertical = match settings.short_intro() {
            Some(path) => match compositor.load(path).await {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring vertical intro: {e}");
                    None
                }
            },
            None => None,
        };
        Ok(Self { regular, vertical })
    }

    /// The intro to put in front of `main`.
    pub fn for_main(&self, main: &LocalAsset) -> &LocalAsset {
        match &self.vertical {
            Some(vertical) if main.info.is_vertical() => vertical,
            _ => &self.regular,
        }
    }
}

/// `<output_dir>/<main stem>_with_intro.mp4`
pub fn output_path(main: &LocalAsset, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}_with_intro.mp4", main.stem()))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        // `b` usually does not exist yet; compare what we have
        (Ok(a), Err(_)) => b
            .parent()
            .and_then(|p| std::fs::canonicalize(p).ok())
            .zip(b.file_name())
            .is_some_and(|(dir, name)| dir.join(name) == a),
        _ => a == b,
    }
}

/// Output frame size: the main video's, rounded down to even numbers for yuv420p.
fn target_size(main: &MediaInfo) -> (u32, u32) {
    ((main.width & !1).max(2), (main.height & !1).max(2))
}

/// The `-filter_complex` graph joining input 0 (intro) and input 1 (main).
///
/// `intro_audio` and `main_audio` are the stream specifiers to take sound from; inputs without
/// sound point at a generated `anullsrc` input instead.
fn filter_graph(main: &MediaInfo, intro_audio: &str, main_audio: &str) -> String {
    let (w, h) = target_size(main);
    let fps = main.frame_rate_arg();
    let audio = format!("aresample={AUDIO_RATE},aformat=channel_layouts=stereo");
    format!(
        "[0:v:0]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v0];\
         [1:v:0]scale={w}:{h},setsar=1,fps={fps},format=yuv420p[v1];\
         [{intro_audio}]{audio}[a0];\
         [{main_audio}]{audio}[a1];\
         [v0][a0][v1][a1]concat=n=2:v=1:a=1[v][a]"
    )
}

fn ffmpeg_args(intro: &LocalAsset, main: &LocalAsset, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.extend(["-i".into(), intro.path.clone().into_os_string()]);
    args.extend(["-i".into(), main.path.clone().into_os_string()]);

    let mut next_input = 2;
    let mut audio_of = |asset: &LocalAsset, args: &mut Vec<OsString>, index: usize| {
        if asset.info.has_audio {
            format!("{index}:a:0")
        } else {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-t".into(),
                format!("{:.3}", asset.info.duration.as_secs_f64()).into(),
                "-i".into(),
                format!("anullsrc=channel_layout=stereo:sample_rate={AUDIO_RATE}").into(),
            ]);
            let spec = format!("{next_input}:a:0");
            next_input += 1;
            spec
        }
    };
    let intro_audio = audio_of(intro, &mut args, 0);
    let main_audio = audio_of(main, &mut args, 1);
    let graph = filter_graph(&main.info, &intro_audio, &main_audio);

    args.extend(
        [
            "-filter_complex",
            graph.as_str(),
            "-map",
            "[v]",
            "-map",
            "[a]",
            "-c:v",
            "libx264",
            "-preset",
            "medium",
            "-crf",
            "20",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-b:a",
            "192k",
            "-movflags",
            "+faststart",
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.as_os_str().to_owned());
    args
}
