//! Disk usage of the staging and output directories.

use eyre::Context;
use std::fmt;
use std::path::{Path, PathBuf};

/// Usage at which a directory is reported as full.
pub const DEFAULT_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Share of the threshold at which an early warning is logged.
const APPROACHING_PERCENT: u64 = 80;

/// How full a directory is relative to its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Ok,
    Approaching,
    Exceeded,
}

/// Size of one directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderUsage {
    pub path: PathBuf,
    /// Total size of regular files below `path`; `None` if it does not exist.
    pub bytes: Option<u64>,
    pub threshold: u64,
}

impl FolderUsage {
    pub fn usage(&self) -> Usage {
        let bytes = self.bytes.unwrap_or(0);
        if bytes >= self.threshold {
            Usage::Exceeded
        } else if bytes.saturating_mul(100) >= self.threshold.saturating_mul(APPROACHING_PERCENT) {
            Usage::Approaching
        } else {
            Usage::Ok
        }
    }

    /// Logs a warning if the directory is getting full. Returns whether it did.
    pub fn warn_if_full(&self) -> bool {
        let bytes = self.bytes.unwrap_or(0);
        match self.usage() {
            Usage::Ok => false,
            Usage::Approaching => {
                tracing::warn!(
                    path = %self.path.display(),
                    size = %format_size(bytes),
                    limit = %format_size(self.threshold),
                    "directory is approaching its storage limit, consider cleaning up"
                );
                true
            }
            Usage::Exceeded => {
                tracing::warn!(
                    path = %self.path.display(),
                    size = %format_size(bytes),
                    limit = %format_size(self.threshold),
                    "directory has exceeded its storage limit"
                );
                true
            }
        }
    }
}

impl fmt::Display for FolderUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bytes {
            Some(bytes) => write!(f, "{}: {}", self.path.display(), format_size(bytes)),
            None => write!(f, "{}: (not found)", self.path.display()),
        }
    }
}

/// Measures `path` against `threshold`.
pub async fn measure(path: &Path, threshold: u64) -> eyre::Result<FolderUsage> {
    let bytes = if tokio::fs::try_exists(path)
        .await
        .with_context(|| format!("check {}", path.display()))?
    {
        Some(folder_size(path).await?)
    } else {
        None
    };
    Ok(FolderUsage {
        path: path.to_path_buf(),
        bytes,
        threshold,
    })
}

/// Warns about every directory in `dirs` that is close to [`DEFAULT_THRESHOLD`].
///
/// Measurement failures are logged and otherwise ignored.
pub async fn check_directories(dirs: &[&Path]) {
    for dir in dirs {
        match measure(dir, DEFAULT_THRESHOLD).await {
            Ok(usage) => {
                tracing::debug!(%usage, "storage");
                usage.warn_if_full();
            }
            Err(e) => tracing::warn!(path = %dir.display(), "could not measure: {e:#}"),
        }
    }
}

/// Sizes of a set of directories, in the order they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStatus {
    pub folders: Vec<FolderUsage>,
}

impl StorageStatus {
    /// Combined size of every directory that exists.
    pub fn total(&self) -> u64 {
        self.folders.iter().filter_map(|f| f.bytes).sum()
    }

    /// Whether any directory is approaching or over its threshold.
    pub fn needs_attention(&self) -> bool {
        self.folders.iter().any(|f| f.usage() != Usage::Ok)
    }
}

impl fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(40);
        writeln!(f, "Storage status:")?;
        writeln!(f, "{rule}")?;
        for folder in &self.folders {
            let marker = match folder.usage() {
                Usage::Ok => "",
                Usage::Approaching => "  (approaching limit)",
                Usage::Exceeded => "  (over limit)",
            };
            writeln!(f, "   {folder}{marker}")?;
        }
        writeln!(f, "{rule}")?;
        write!(f, "   Total: {}", format_size(self.total()))
    }
}

/// Measures each of `dirs` against [`DEFAULT_THRESHOLD`].
pub async fn status(dirs: &[&Path]) -> eyre::Result<StorageStatus> {
    let mut folders = Vec::with_capacity(dirs.len());
    for dir in dirs {
        folders.push(measure(dir, DEFAULT_THRESHOLD).await?);
    }
    Ok(StorageStatus { folders })
}

/// What [`cleanup_folder`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleanup {
    /// Top-level entries deleted.
    pub removed: usize,
    /// Bytes in those entries.
    pub freed: u64,
}

impl std::ops::AddAssign for Cleanup {
    fn add_assign(&mut self, other: Self) {
        self.removed += other.removed;
        self.freed += other.freed;
    }
}

/// Deletes everything inside `dir`, keeping `dir` itself.
///
/// Entries that cannot be removed are logged and skipped. A missing directory has nothing to
/// clean up.
pub async fn cleanup_folder(dir: &Path) -> eyre::Result<Cleanup> {
    let mut cleanup = Cleanup::default();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(cleanup),
        Err(e) => {
            return Err(e).with_context(|| format!("read directory {}", dir.display()));
        }
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("read directory {}", dir.display()))?
    {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        let (bytes, removed) = if file_type.is_dir() {
            let bytes = folder_size(&path).await?;
            (bytes, tokio::fs::remove_dir_all(&path).await)
        } else {
            let bytes = if file_type.is_file() {
                entry.metadata().await?.len()
            } else {
                0
            };
            (bytes, tokio::fs::remove_file(&path).await)
        };
        match removed {
            Ok(()) => {
                cleanup.removed += 1;
                cleanup.freed += bytes;
            }
            Err(e) => tracing::warn!(path = %path.display(), "could not delete: {e}"),
        }
    }
    tracing::info!(
        path = %dir.display(),
        removed = cleanup.removed,
        freed = %format_size(cleanup.freed),
        "cleaned up"
    );
    Ok(cleanup)
}

/// Total size in bytes of all regular files below `root`. Symlinks are not followed.
pub async fn folder_size(root: &Path) -> eyre::Result<u64> {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read directory {}", dir.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("read directory {}", dir.display()))?
        {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}

/// Renders a byte count with two decimals in the largest fitting binary unit.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(DEFAULT_THRESHOLD), "1.00 GB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 * 1024 * 1024), "5.00 PB");
    }

    #[tokio::test]
    async fn nested_files_are_counted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.part"), vec![0u8; 23]).unwrap();
        assert_eq!(folder_size(dir.path()).await.unwrap(), 123);
    }

    #[tokio::test]
    async fn usage_levels() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), vec![0u8; 85]).unwrap();

        assert_eq!(measure(dir.path(), 1000).await.unwrap().usage(), Usage::Ok);
        let near = measure(dir.path(), 100).await.unwrap();
        assert_eq!(near.usage(), Usage::Approaching);
        assert!(near.warn_if_full());
        assert_eq!(measure(dir.path(), 85).await.unwrap().usage(), Usage::Exceeded);
    }

    #[tokio::test]
    async fn status_lists_each_folder_and_the_total() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        std::fs::create_dir(&downloads).unwrap();
        std::fs::write(downloads.join("a.mp4"), vec![0u8; 2048]).unwrap();
        let output = dir.path().join("output");

        let status = status(&[&downloads, &output]).await.unwrap();
        assert_eq!(status.total(), 2048);
        assert!(!status.needs_attention());

        let rendered = status.to_string();
        assert!(rendered.starts_with("Storage status:"), "{rendered}");
        assert!(rendered.contains("downloads: 2.00 KB"), "{rendered}");
        assert!(rendered.contains("output: (not found)"), "{rendered}");
        assert!(rendered.ends_with("Total: 2.00 KB"), "{rendered}");
    }

    #[tokio::test]
    async fn cleanup_empties_the_folder_but_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_with_intro.mp4"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(dir.path().join("leftovers")).unwrap();
        std::fs::write(dir.path().join("leftovers").join("b.part"), vec![0u8; 50]).unwrap();

        let cleanup = cleanup_folder(dir.path()).await.unwrap();
        assert_eq!(
            cleanup,
            Cleanup {
                removed: 2,
                freed: 150
            }
        );
        assert!(dir.path().is_dir());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // nothing left, and nothing there at all, are both fine
        assert_eq!(cleanup_folder(dir.path()).await.unwrap(), Cleanup::default());
        assert_eq!(
            cleanup_folder(&dir.path().join("nope")).await.unwrap(),
            Cleanup::default()
        );
    }

    #[tokio::test]
    async fn missing_directory_is_reported_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let usage = measure(&dir.path().join("nope"), 10).await.unwrap();
        assert_eq!(usage.bytes, None);
        assert_eq!(usage.usage(), Usage::Ok);
        assert!(usage.to_string().ends_with("(not found)"));
    }
}
