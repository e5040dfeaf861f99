//! Helpers shared by unit tests that drive external tools.

use std::path::{Path, PathBuf};

/// ffprobe output for a 12s 1080p30 clip with audio.
pub(crate) const LANDSCAPE_PROBE: &str = r#"{
    "streams": [
        {"codec_type": "video", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"},
        {"codec_type": "audio"}
    ],
    "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.000000"}
}"#;

/// Writes an executable `/bin/sh` script standing in for an external tool.
#[cfg(unix)]
pub(crate) fn stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A stub ffprobe that always reports [`LANDSCAPE_PROBE`].
#[cfg(unix)]
pub(crate) fn stub_ffprobe(dir: &Path) -> PathBuf {
    stub_tool(dir, "ffprobe", &format!("cat <<'EOF'\n{LANDSCAPE_PROBE}\nEOF"))
}

/// Whether a real `ffmpeg` and `ffprobe` are on `PATH`.
pub(crate) fn have_ffmpeg() -> bool {
    ["ffmpeg", "ffprobe"].iter().all(|tool| {
        std::process::Command::new(tool)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    })
}

/// Fakes of the workflow steps for runner tests.
pub(crate) mod fakes {
    use crate::compositor::{Compositor, Intros};
    use crate::downloader::{Downloader, RemoteVideo};
    use crate::error::{Error, Result};
    use crate::media::MediaInfo;
    use crate::model::{LocalAsset, Privacy, UploadRequest, UploadResult, VideoSource};
    use crate::uploader::{RecentUpload, Uploader};
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    pub(crate) fn info(width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            width,
            height,
            frame_rate: 30.0,
            has_audio: true,
            ..MediaInfo::default()
        }
    }

    pub(crate) fn source(id: &str, title: &str) -> VideoSource {
        VideoSource {
            title: Some(title.to_string()),
            ..VideoSource::from_id(id)
        }
    }

    pub(crate) fn intros() -> Intros {
        Intros {
            regular: LocalAsset {
                path: PathBuf::from("intro.mp4"),
                info: info(1920, 1080),
            },
            vertical: Some(LocalAsset {
                path: PathBuf::from("intro_short.mp4"),
                info: info(1080, 1920),
            }),
        }
    }

    /// Serves a fixed playlist and writes a small file per download.
    #[derive(Default)]
    pub(crate) struct FakeDownloader {
        pub playlist: Vec<VideoSource>,
        /// IDs whose download fails.
        pub broken: Vec<String>,
        /// IDs that download as portrait video.
        pub vertical: Vec<String>,
        pub downloaded: RefCell<Vec<String>>,
    }

    impl Downloader for FakeDownloader {
        async fn resolve_playlist(&self, url: &str, _limit: usize) -> Result<Vec<VideoSource>> {
            if url.contains("missing") {
                return Err(Error::Download(eyre::eyre!("playlist does not exist")));
            }
            Ok(self.playlist.clone())
        }

        async fn fetch_metadata(&self, url: &str) -> Result<RemoteVideo> {
            let id = id_of(url);
            Ok(RemoteVideo {
                title: Some(format!("Remote {id}")),
                description: None,
                duration: None,
                id,
            })
        }

        async fn download(&self, url: &str, dest: &Path) -> Result<LocalAsset> {
            let id = id_of(url);
            self.downloaded.borrow_mut().push(id.clone());
            if self.broken.contains(&id) {
                return Err(Error::Download(eyre::eyre!("{id}: Video unavailable")));
            }
            let path = dest.join(format!("{id}.mp4"));
            std::fs::write(&path, b"source").unwrap();
            let (width, height) = if self.vertical.contains(&id) {
                (1080, 1920)
            } else {
                (1920, 1080)
            };
            Ok(LocalAsset {
                path,
                info: info(width, height),
            })
        }
    }

    fn id_of(url: &str) -> String {
        url.rsplit(['=', '/']).next().unwrap_or(url).to_string()
    }

    /// Records which intro was used and writes a placeholder output.
    #[derive(Default)]
    pub(crate) struct FakeCompositor {
        pub intros_used: RefCell<Vec<PathBuf>>,
        /// File stems of main videos that fail to compose.
        pub broken: Vec<String>,
    }

    impl Compositor for FakeCompositor {
        async fn load(&self, path: &Path) -> Result<LocalAsset> {
            if !path.is_file() {
                return Err(Error::Composition(eyre::eyre!(
                    "{} does not exist",
                    path.display()
                )));
            }
            Ok(LocalAsset {
                path: path.to_path_buf(),
                info: info(1280, 720),
            })
        }

        async fn composite(
            &self,
            intro: &LocalAsset,
            main: &LocalAsset,
            output_dir: &Path,
        ) -> Result<LocalAsset> {
            self.intros_used.borrow_mut().push(intro.path.clone());
            if self.broken.contains(&main.stem()) {
                return Err(Error::Composition(eyre::eyre!(
                    "ffmpeg exited with exit status: 1: Invalid data found when processing input"
                )));
            }
            let path = crate::compositor::output_path(main, output_dir);
            std::fs::write(&path, b"composed").unwrap();
            Ok(LocalAsset {
                path,
                info: main.info.clone(),
            })
        }
    }

    /// Remembers each request and echoes its privacy back.
    #[derive(Default)]
    pub(crate) struct FakeUploader {
        /// `(title, description, privacy)` per upload.
        pub requests: RefCell<Vec<(String, String, Privacy)>>,
        pub recent: Vec<RecentUpload>,
        /// Titles whose upload is rejected.
        pub broken: Vec<String>,
    }

    impl Uploader for FakeUploader {
        async fn upload(&self, request: UploadRequest<'_>) -> Result<UploadResult> {
            let mut requests = self.requests.borrow_mut();
            if self.broken.contains(&request.title) {
                return Err(Error::Upload(eyre::eyre!(
                    "HTTP status client error (403 Forbidden): quotaExceeded"
                )));
            }
            requests.push((request.title, request.description, request.privacy));
            Ok(UploadResult::new(
                format!("up{:09}", requests.len()),
                request.privacy,
            ))
        }

        async fn list_recent_uploads(&self, max_results: u32) -> Result<Vec<RecentUpload>> {
            Ok(self
                .recent
                .iter()
                .take(max_results as usize)
                .cloned()
                .collect())
        }
    }
}
