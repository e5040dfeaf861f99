//! The numbered menu behind the `clipstream` binary.
//!
//! The session reads one line per prompt and writes plain text, so it runs the same against a
//! terminal and against scripted input. Every action returns to the menu when it is done; an
//! action that fails prints its error first.

use crate::compositor::{Compositor, Intros};
use crate::downloader::{Downloader, RemoteVideo};
use crate::error::Result;
use crate::model::{LocalAsset, Privacy, UploadRequest, UploadResult};
use crate::stdin::{LineSource, SharedStdin};
use crate::storage::{self, Cleanup, format_size};
use crate::uploader::{DEFAULT_RECENT_UPLOADS, Uploader};
use eyre::Context;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};

/// Where the menu loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Idle,
    ProcessLocal,
    ProcessAndUpload,
    ListVideos,
    Storage,
    Exit,
}

impl MenuState {
    /// The state a menu answer leads to, if the answer is valid.
    pub fn from_choice(choice: &str) -> Option<Self> {
        match choice.trim() {
            "1" => Some(MenuState::ProcessLocal),
            "2" => Some(MenuState::ProcessAndUpload),
            "3" => Some(MenuState::ListVideos),
            "4" | "q" | "quit" | "exit" => Some(MenuState::Exit),
            "5" => Some(MenuState::Storage),
            _ => None,
        }
    }
}

/// Line-oriented prompts over any line source and writer.
pub struct Console<L, W> {
    input: L,
    out: W,
}

impl<R, W> Console<Lines<R>, W>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(input: R, out: W) -> Self {
        Self {
            input: input.lines(),
            out,
        }
    }
}

impl<W> Console<SharedStdin, W> {
    /// Prompts on the process's standard input, shared with the OAuth paste fallback.
    pub fn stdin(out: W) -> Self {
        Self {
            input: SharedStdin,
            out,
        }
    }
}

impl<L, W> Console<L, W>
where
    L: LineSource,
    W: AsyncWrite + Unpin,
{
    pub async fn say(&mut self, text: impl AsRef<str>) -> eyre::Result<()> {
        self.out.write_all(text.as_ref().as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    /// Shows `question` and reads the trimmed answer. `None` at end of input.
    pub async fn ask(&mut self, question: &str) -> eyre::Result<Option<String>> {
        self.out.write_all(question.as_bytes()).await?;
        self.out.flush().await?;
        let line = self.input.next_line().await.context("read answer")?;
        Ok(line.map(|l| l.trim().to_string()))
    }

    pub fn into_output(self) -> W {
        self.out
    }
}

/// What the operator pointed at, before anything expensive happens to it.
enum Source {
    Local(LocalAsset),
    Remote { url: String, video: RemoteVideo },
}

impl Source {
    fn default_title(&self) -> String {
        match self {
            Source::Local(asset) => asset.stem(),
            Source::Remote { video, .. } => video.title.clone().unwrap_or_else(|| video.id.clone()),
        }
    }

    fn default_description(&self) -> String {
        match self {
            Source::Local(_) => String::new(),
            Source::Remote { video, .. } => video.description.clone().unwrap_or_default(),
        }
    }
}

/// Upload settings, collected before processing starts.
struct Details {
    title: String,
    description: String,
    privacy: Privacy,
}

/// Ran out of input in the middle of an action.
struct EndOfInput;

/// The interactive workflow over a [`Downloader`], a [`Compositor`] and an [`Uploader`].
#[derive(Debug)]
pub struct Session<D, C, U> {
    downloader: D,
    compositor: C,
    uploader: U,
    /// `None` when the intro asset is missing; processing is unavailable then.
    intros: Option<Intros>,
    download_dir: PathBuf,
    output_dir: PathBuf,
}

impl<D, C, U> Session<D, C, U>
where
    D: Downloader,
    C: Compositor,
    U: Uploader,
{
    pub fn new(
        downloader: D,
        compositor: C,
        uploader: U,
        intros: Option<Intros>,
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

    /// Runs the menu until the operator exits or input ends.
    pub async fn run<L, W>(&self, console: &mut Console<L, W>) -> eyre::Result<()>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        self.storage_reminder(console).await?;
        let mut state = MenuState::Idle;
        loop {
            state = match state {
                MenuState::Idle => self.menu(console).await?,
                MenuState::Exit => break,
                action => match self.perform(action, console).await {
                    Ok(Ok(())) => MenuState::Idle,
                    Ok(Err(EndOfInput)) => MenuState::Exit,
                    Err(e) => {
                        tracing::debug!(?action, "action failed: {e:?}");
                        console.say(format!("Error: {e:#}\n")).await?;
                        MenuState::Idle
                    }
                },
            };
        }
        console.say("Goodbye.").await
    }

    async fn menu<L, W>(&self, console: &mut Console<L, W>) -> eyre::Result<MenuState>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        let disabled = if self.intros.is_some() {
            ""
        } else {
            " - unavailable: no intro video"
        };
        console.say("Select an option:").await?;
        console
            .say(format!("1. Process a video (add intro){disabled}"))
            .await?;
        console
            .say(format!("2. Process and upload a video{disabled}"))
            .await?;
        console.say("3. List your recent uploads").await?;
        console.say("4. Exit").await?;
        console.say("5. Storage status and cleanup").await?;

        loop {
            let Some(choice) = console.ask("\nEnter your choice (1-5): ").await? else {
                return Ok(MenuState::Exit);
            };
            match MenuState::from_choice(&choice) {
                Some(state) => return Ok(state),
                None => console.say("Invalid choice, enter a number from 1 to 5.").await?,
            }
        }
    }

    /// Runs one action. The outer error is the action's failure, shown to the operator.
    async fn perform<L, W>(
        &self,
        action: MenuState,
        console: &mut Console<L, W>,
    ) -> Result<std::result::Result<(), EndOfInput>, eyre::Report>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        match action {
            MenuState::ProcessLocal => self.process(console, false).await,
            MenuState::ProcessAndUpload => self.process(console, true).await,
            MenuState::ListVideos => self.list(console).await.map(Ok),
            MenuState::Storage => self.storage(console).await,
            MenuState::Idle | MenuState::Exit => Ok(Ok(())),
        }
    }

    async fn process<L, W>(
        &self,
        console: &mut Console<L, W>,
        upload: bool,
    ) -> eyre::Result<std::result::Result<(), EndOfInput>>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        let Some(intros) = &self.intros else {
            console
                .say("This option requires an intro video. Set INTRO_VIDEO and try again.\n")
                .await?;
            return Ok(Ok(()));
        };

        let Some(input) = console
            .ask("Enter the path to your video file or a video URL: ")
            .await?
        else {
            return Ok(Err(EndOfInput));
        };
        if input.is_empty() {
            eyre::bail!("no video given");
        }

        let source = self.identify(&input).await?;
        let details = if upload {
            match ask_details(console, &source).await? {
                Ok(details) => Some(details),
                Err(EndOfInput) => return Ok(Err(EndOfInput)),
            }
        } else {
            None
        };

        let (main, downloaded) = match source {
            Source::Local(asset) => (asset, false),
            Source::Remote { url, .. } => {
                console.say(format!("Downloading {url}...")).await?;
                (self.downloader.download(&url, &self.download_dir).await?, true)
            }
        };
        let intro = intros.for_main(&main);
        console
            .say(format!(
                "Adding intro {} to {}...",
                intro.path.display(),
                main.path.display()
            ))
            .await?;
        let composed = self
            .compositor
            .composite(intro, &main, &self.output_dir)
            .await?;
        console
            .say(format!(
                "Video processed successfully: {}",
                composed.path.display()
            ))
            .await?;
        let Some(details) = details else {
            console.say("").await?;
            return Ok(Ok(()));
        };

        console.say("Authenticating with YouTube...").await?;
        let mut request =
            UploadRequest::new(&composed, details.privacy, details.title, details.description);
        if composed.info.is_vertical() {
            request = request.tag_as_short();
        }
        console.say("Uploading to YouTube...").await?;
        let result = self.uploader.upload(request).await?;
        report_upload(console, &result).await?;

        if downloaded {
            remove_download(&main.path).await;
        }
        Ok(Ok(()))
    }

    /// Checks what the operator typed without downloading or encoding anything yet.
    async fn identify(&self, input: &str) -> Result<Source> {
        if input.starts_with("http://") || input.starts_with("https://") {
            let video = self.downloader.fetch_metadata(input).await?;
            return Ok(Source::Remote {
                url: input.to_string(),
                video,
            });
        }
        Ok(Source::Local(self.compositor.load(Path::new(input)).await?))
    }

    async fn list<L, W>(&self, console: &mut Console<L, W>) -> eyre::Result<()>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        console.say("Authenticating with YouTube...").await?;
        let uploads = self
            .uploader
            .list_recent_uploads(DEFAULT_RECENT_UPLOADS)
            .await?;
        if uploads.is_empty() {
            console.say("No uploads found.\n").await?;
            return Ok(());
        }
        console.say(format!("\nYour {} most recent uploads:", uploads.len())).await?;
        for (i, upload) in uploads.iter().enumerate() {
            let when = upload
                .published_at
                .map(|t| format!(" ({})", t.strftime("%Y-%m-%d")))
                .unwrap_or_default();
            console
                .say(format!("{}. {}{when}", i + 1, upload.title))
                .await?;
            if let Some(url) = &upload.url {
                console.say(format!("   {url}")).await?;
            }
        }
        console.say("").await
    }

    fn directories(&self) -> [&Path; 2] {
        [self.output_dir.as_path(), self.download_dir.as_path()]
    }

    /// Points at the cleanup option when a directory is filling up.
    async fn storage_reminder<L, W>(&self, console: &mut Console<L, W>) -> eyre::Result<()>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        match storage::status(&self.directories()).await {
            Ok(status) if status.needs_attention() => {
                console.say(format!("{status}")).await?;
                console
                    .say("Storage is running low. Choose option 5 to clean up.\n")
                    .await
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("could not measure storage: {e:#}");
                Ok(())
            }
        }
    }

    /// Shows how much space the directories use and offers to empty each of them.
    async fn storage<L, W>(
        &self,
        console: &mut Console<L, W>,
    ) -> eyre::Result<std::result::Result<(), EndOfInput>>
    where
        L: LineSource,
        W: AsyncWrite + Unpin,
    {
        let status = storage::status(&self.directories()).await?;
        console.say(format!("\n{status}\n")).await?;

        let mut total = Cleanup::default();
        for folder in &status.folders {
            let Some(bytes) = folder.bytes.filter(|&b| b > 0) else {
                continue;
            };
            let Some(answer) = console
                .ask(&format!(
                    "Delete all files in {} ({})? (y/N): ",
                    folder.path.display(),
                    format_size(bytes)
                ))
                .await?
            else {
                return Ok(Err(EndOfInput));
            };
            if !matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes") {
                console.say("Cleanup cancelled.").await?;
                continue;
            }
            let cleanup = storage::cleanup_folder(&folder.path).await?;
            console
                .say(format!(
                    "Deleted {} items, freed {}",
                    cleanup.removed,
                    format_size(cleanup.freed)
                ))
                .await?;
            total += cleanup;
        }

        if total.removed > 0 {
            console
                .say(format!(
                    "Total cleanup: {} items, {} freed",
                    total.removed,
                    format_size(total.freed)
                ))
                .await?;
        }
        console.say("").await?;
        Ok(Ok(()))
    }
}

/// Asks for title, description and privacy. Empty answers take the defaults; an unknown privacy
/// level is asked again.
async fn ask_details<L, W>(
    console: &mut Console<L, W>,
    source: &Source,
) -> eyre::Result<std::result::Result<Details, EndOfInput>>
where
    L: LineSource,
    W: AsyncWrite + Unpin,
{
    let default_title = source.default_title();
    let Some(title) = console
        .ask(&format!("Enter video title [{default_title}]: "))
        .await?
    else {
        return Ok(Err(EndOfInput));
    };
    let title = if title.is_empty() { default_title } else { title };

    let Some(description) = console.ask("Enter video description: ").await? else {
        return Ok(Err(EndOfInput));
    };
    let description = if description.is_empty() {
        source.default_description()
    } else {
        description
    };

    let privacy = loop {
        let Some(answer) = console
            .ask("Privacy (private/unlisted/public) [private]: ")
            .await?
        else {
            return Ok(Err(EndOfInput));
        };
        if answer.is_empty() {
            break Privacy::default();
        }
        match answer.parse() {
            Ok(privacy) => break privacy,
            Err(e) => console.say(format!("{e}")).await?,
        }
    };

    Ok(Ok(Details {
        title,
        description,
        privacy,
    }))
}

async fn report_upload<L, W>(console: &mut Console<L, W>, result: &UploadResult) -> eyre::Result<()>
where
    L: LineSource,
    W: AsyncWrite + Unpin,
{
    console.say("\nVideo uploaded successfully!").await?;
    console.say(format!("Video ID: {}", result.video_id)).await?;
    console.say(format!("URL: {}", result.url)).await?;
    console.say(format!("Privacy: {}\n", result.privacy)).await
}

async fn remove_download(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), "could not remove download: {e}");
    }
}
