//! Media inspection through `ffprobe`.

use eyre::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::instrument;

/// What we need to know about a video file to join it with another one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Container as reported by ffprobe, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub container: String,
    pub duration: Duration,
    /// Display width, with rotation metadata applied.
    pub width: u32,
    /// Display height, with rotation metadata applied.
    pub height: u32,
    /// Frames per second of the first video stream.
    pub frame_rate: f64,
    pub has_audio: bool,
}

impl MediaInfo {
    /// Taller than wide, the shape YouTube treats as a Short.
    pub fn is_vertical(&self) -> bool {
        self.height > self.width
    }

    /// Frame rate as an exact-enough string for ffmpeg's `fps` filter.
    pub fn frame_rate_arg(&self) -> String {
        let rounded = (self.frame_rate * 1000.0).round() / 1000.0;
        if rounded.fract() == 0.0 {
            format!("{}", rounded as u64)
        } else {
            format!("{rounded}")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Runs `ffprobe` on `path`.
///
/// Fails if the file is missing, if ffprobe cannot parse it, or if it has no video stream.
#[instrument(skip(ffprobe))]
pub async fn probe(ffprobe: &Path, path: &Path) -> eyre::Result<MediaInfo> {
    if !tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("check {}", path.display()))?
    {
        eyre::bail!("file not found: {}", path.display());
    }

    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .await
        .with_context(|| format!("run {}", ffprobe.display()))?;

    if !output.status.success() {
        eyre::bail!(
            "ffprobe could not read {} ({}): {}",
            path.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let info = parse_probe_output(&output.stdout)
        .with_context(|| format!("interpret ffprobe output for {}", path.display()))?;
    tracing::debug!(?info, "probed media file");
    Ok(info)
}

fn parse_probe_output(json: &[u8]) -> eyre::Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_slice(json).context("parse ffprobe JSON")?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| eyre::eyre!("no video stream"))?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (mut width, mut height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => eyre::bail!("video stream has no dimensions"),
    };
    if rotation(video).is_some_and(|r| (r.abs() % 180.0 - 90.0).abs() < 1.0) {
        std::mem::swap(&mut width, &mut height);
    }

    let frame_rate = [&video.avg_frame_rate, &video.r_frame_rate]
        .into_iter()
        .flatten()
        .filter_map(|r| parse_rate(r))
        .next()
        .ok_or_else(|| eyre::eyre!("video stream has no usable frame rate"))?;

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| eyre::eyre!("no duration reported"))?;

    Ok(MediaInfo {
        container: probe
            .format
            .and_then(|f| f.format_name)
            .unwrap_or_default(),
        duration,
        width,
        height,
        frame_rate,
        has_audio,
    })
}

fn rotation(stream: &ProbeStream) -> Option<f64> {
    stream
        .side_data_list
        .iter()
        .find_map(|sd| sd.rotation)
        .or_else(|| {
            stream
                .tags
                .as_ref()
                .and_then(|t| t.rotate.as_deref())
                .and_then(|r| r.parse().ok())
        })
}

/// Parses ffprobe rates like `30000/1001` or `25`; `0/0` is treated as unknown.
fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LANDSCAPE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001", "duration": "12.012000"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "duration": "12.000000"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.012000"}
    }"#;

    #[test]
    fn parses_landscape_file() {
        let info = parse_probe_output(LANDSCAPE.as_bytes()).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert!(info.has_audio);
        assert!(!info.is_vertical());
        assert!((info.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(info.frame_rate_arg(), "29.97");
        assert_eq!(info.duration, Duration::from_millis(12_012));
        assert!(info.container.starts_with("mov,mp4"));
    }

    #[test]
    fn rotated_phone_video_is_vertical() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1",
                 "side_data_list": [{"side_data_type": "Display Matrix", "rotation": -90}]}
            ],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "3.5"}
        }"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert_eq!((info.width, info.height), (1080, 1920));
        assert!(info.is_vertical());
        assert!(!info.has_audio);
        assert_eq!(info.frame_rate_arg(), "30");
    }

    #[test]
    fn falls_back_to_r_frame_rate() {
        let json = r#"{
            "streams": [{"codec_type": "video", "width": 640, "height": 360,
                         "avg_frame_rate": "0/0", "r_frame_rate": "25/1", "duration": "2.0"}],
            "format": {"format_name": "matroska,webm"}
        }"#;
        let info = parse_probe_output(json.as_bytes()).unwrap();
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(info.duration, Duration::from_secs(2));
    }

    #[test]
    fn audio_only_file_is_rejected() {
        let json = r#"{
            "streams": [{"codec_type": "audio"}],
            "format": {"format_name": "mp3", "duration": "100.0"}
        }"#;
        let err = parse_probe_output(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("no video stream"));
    }

    #[test]
    fn rates() {
        assert_eq!(parse_rate("24/1"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("garbage"), None);
        assert_eq!(parse_rate("60"), Some(60.0));
    }

    #[tokio::test]
    async fn probing_a_missing_file_fails_before_running_ffprobe() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe(Path::new("ffprobe"), &dir.path().join("absent.mp4"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
