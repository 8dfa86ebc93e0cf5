//! One-time installation of the FFmpeg executables.
//!
//! [`Bootstrapper::ensure`] is a no-op when `ffmpeg` and `ffprobe` already sit in the target
//! directory (or, if enabled, in a directory on the search path). Otherwise it asks an
//! [`InstallPrompt`], streams the archive through an [`ArchiveFetcher`] with byte-level
//! progress, extracts it, lifts the two executables to the top of the target directory and
//! deletes what the extraction left behind. Entries that were in the target directory before
//! the install are never touched.

use crate::metrics::Metrics;
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::env::consts::EXE_SUFFIX;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Essentials build of FFmpeg 7.1. Windows executables only.
pub const DEFAULT_ARCHIVE_URL: &str =
    "https://github.com/GyanD/codexffmpeg/releases/download/7.1/ffmpeg-7.1-essentials_build.zip";

/// Where users are sent when the automatic install fails.
pub const MANUAL_INSTALL_URL: &str = "https://www.gyan.dev/ffmpeg/builds/";

/// Where users on platforms without a default archive get FFmpeg.
pub const SYSTEM_INSTALL_URL: &str = "https://ffmpeg.org/download.html";

/// Name of the temporary archive inside the target directory.
pub const ARCHIVE_FILE_NAME: &str = "ffmpeg.zip";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// File names (with the platform suffix) that make up a usable install.
pub fn required_executables() -> [String; 2] {
    [
        format!("ffmpeg{}", EXE_SUFFIX),
        format!("ffprobe{}", EXE_SUFFIX),
    ]
}

/// False when `archive_url` is the Windows-only default and this is not Windows.
pub fn archive_usable_here(archive_url: &str) -> bool {
    cfg!(windows) || archive_url != DEFAULT_ARCHIVE_URL
}

/// True when every required executable is a file directly inside `dir`.
pub fn tool_present(dir: &Utf8Path) -> bool {
    required_executables()
        .iter()
        .all(|name| dir.join(name).is_file())
}

/// `<directory of the running executable>/ffmpeg`, or `./ffmpeg` if that cannot be determined.
pub fn default_target_dir() -> Utf8PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("ffmpeg")))
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("ffmpeg"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Connecting,
    Downloading,
    Extracting,
    Relocating,
    CleaningUp,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent {
    Phase(BootstrapPhase),
    /// `total` is 0 when the server sent no content length
    Progress { downloaded: u64, total: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Directory holding both executables
    Resolved(Utf8PathBuf),
    /// The user said no; nothing was touched
    Declined,
}

/// Errors from the archive fetch alone.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install failures. Every message points at the manual download and the target directory.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to download FFmpeg: {source}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    Network {
        #[source]
        source: FetchError,
        target_dir: Utf8PathBuf,
    },

    #[error("File operation failed during FFmpeg install: {source}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    Io {
        #[source]
        source: std::io::Error,
        target_dir: Utf8PathBuf,
    },

    #[error("FFmpeg archive is unreadable: {message}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    Archive {
        message: String,
        target_dir: Utf8PathBuf,
    },

    #[error("FFmpeg archive entry escapes the install directory: {entry}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    UnsafeEntry {
        entry: String,
        target_dir: Utf8PathBuf,
    },

    #[error("FFmpeg archive did not contain {missing}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    MissingExecutables {
        missing: String,
        target_dir: Utf8PathBuf,
    },

    #[error("FFmpeg install task failed: {message}. Download it manually from {hint} and place ffmpeg and ffprobe in {target_dir}", hint = MANUAL_INSTALL_URL)]
    Task {
        message: String,
        target_dir: Utf8PathBuf,
    },

    #[error("No FFmpeg download is configured for this platform. Install ffmpeg and ffprobe from your package manager or {hint}, then put them on PATH or in {target_dir}", hint = SYSTEM_INSTALL_URL)]
    Unsupported { target_dir: Utf8PathBuf },
}

/// Asks the user whether the tool may be downloaded.
#[cfg_attr(test, mockall::automock)]
pub trait InstallPrompt: Send + Sync {
    fn confirm_install(&self, target_dir: &Utf8Path) -> bool;
}

/// Streams the archive at `url` into `dest`, emitting `Progress` after every chunk.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        dest: &Utf8Path,
        events: &mpsc::UnboundedSender<BootstrapEvent>,
    ) -> Result<u64, FetchError>;
}

/// [`ArchiveFetcher`] over HTTPS.
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    /// `timeout` bounds connecting and each read, not the whole transfer.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("ytbulk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Utf8Path,
        events: &mpsc::UnboundedSender<BootstrapEvent>,
    ) -> Result<u64, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length().unwrap_or(0);
        tracing::info!("Downloading {} ({} bytes)", url, total);

        let file = tokio::fs::File::create(dest).await?;
        let mut file = tokio::io::BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            let _ = events.send(BootstrapEvent::Progress { downloaded, total });
        }

        file.flush().await?;
        Ok(downloaded)
    }
}

/// Installs the tool into one target directory.
#[derive(Clone)]
pub struct Bootstrapper {
    target_dir: Utf8PathBuf,
    archive_url: String,
    fetcher: Arc<dyn ArchiveFetcher>,
    /// Also accepted as a location when both executables are found there
    search_dirs: Vec<PathBuf>,
    metrics: Option<Arc<Metrics>>,
}

impl Bootstrapper {
    pub fn new(
        target_dir: impl Into<Utf8PathBuf>,
        archive_url: impl Into<String>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            target_dir: target_dir.into(),
            archive_url: archive_url.into(),
            fetcher,
            search_dirs: Vec::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Accept an existing install in any of `dirs`, typically the entries of `PATH`.
    pub fn with_search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search_dirs = dirs.into_iter().collect();
        self
    }

    pub fn target_dir(&self) -> &Utf8Path {
        &self.target_dir
    }

    /// The target directory, or else the first search directory, that holds both executables.
    pub fn locate(&self) -> Option<Utf8PathBuf> {
        if tool_present(&self.target_dir) {
            return Some(self.target_dir.clone());
        }
        self.search_dirs
            .iter()
            .filter_map(|dir| Utf8PathBuf::from_path_buf(dir.clone()).ok())
            .find(|dir| tool_present(dir))
    }

    /// Make sure the tool is installed, asking `prompt` before touching the network.
    ///
    /// The prompt runs on the blocking pool since console prompts read stdin.
    pub async fn ensure(
        &self,
        prompt: Arc<dyn InstallPrompt>,
        events: &mpsc::UnboundedSender<BootstrapEvent>,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        if let Some(found) = self.locate() {
            tracing::info!("FFmpeg found at: {}", found);
            let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Done));
            return Ok(BootstrapOutcome::Resolved(found));
        }

        if !archive_usable_here(&self.archive_url) {
            return Err(BootstrapError::Unsupported {
                target_dir: self.target_dir.clone(),
            });
        }

        let target_dir = self.target_dir.clone();
        let accepted = tokio::task::spawn_blocking(move || prompt.confirm_install(&target_dir))
            .await
            .map_err(|e| BootstrapError::Task {
                message: e.to_string(),
                target_dir: self.target_dir.clone(),
            })?;
        if !accepted {
            tracing::info!("FFmpeg install declined");
            return Ok(BootstrapOutcome::Declined);
        }

        match self.install(events).await {
            Ok(path) => {
                let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Done));
                Ok(BootstrapOutcome::Resolved(path))
            }
            Err(e) => {
                tracing::error!("{}", e);
                // Best effort; the archive may not exist yet
                let _ = std::fs::remove_file(self.target_dir.join(ARCHIVE_FILE_NAME));
                let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Failed));
                Err(e)
            }
        }
    }

    /// Run [`ensure`](Self::ensure) on its own task.
    pub fn spawn(
        &self,
        prompt: Arc<dyn InstallPrompt>,
    ) -> (
        mpsc::UnboundedReceiver<BootstrapEvent>,
        JoinHandle<Result<BootstrapOutcome, BootstrapError>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bootstrapper = self.clone();
        let handle = tokio::spawn(async move { bootstrapper.ensure(prompt, &tx).await });
        (rx, handle)
    }

    async fn install(
        &self,
        events: &mpsc::UnboundedSender<BootstrapEvent>,
    ) -> Result<Utf8PathBuf, BootstrapError> {
        let target_dir = self.target_dir.clone();
        let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Connecting));

        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|source| BootstrapError::Io {
                source,
                target_dir: target_dir.clone(),
            })?;

        let archive = target_dir.join(ARCHIVE_FILE_NAME);
        let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Downloading));
        let fetched = self
            .fetcher
            .fetch(&self.archive_url, &archive, events)
            .await
            .map_err(|source| BootstrapError::Network {
                source,
                target_dir: target_dir.clone(),
            })?;
        tracing::info!("Fetched FFmpeg archive: {} bytes", fetched);
        if let Some(ref metrics) = self.metrics {
            metrics.record_bootstrap_bytes(fetched);
        }

        let blocking_events = events.clone();
        let blocking_dir = target_dir.clone();
        tokio::task::spawn_blocking(move || {
            unpack_into(&archive, &blocking_dir, &blocking_events)
        })
        .await
        .map_err(|e| BootstrapError::Task {
            message: e.to_string(),
            target_dir: target_dir.clone(),
        })??;

        tracing::info!("FFmpeg installed to {}", target_dir);
        Ok(target_dir)
    }
}

/// What an extraction wrote into the target directory.
#[derive(Debug, Default)]
pub struct Extracted {
    /// Number of files written
    pub files: usize,
    /// Top-level entries of the target directory that did not exist before
    pub created: Vec<Utf8PathBuf>,
}

impl Extracted {
    /// Record `name` as new if nothing by that name existed before this install.
    fn note_top_level(&mut self, seen: &mut HashSet<String>, target_dir: &Utf8Path, name: &str) {
        if seen.insert(name.to_string()) {
            let path = target_dir.join(name);
            if !path.exists() {
                self.created.push(path);
            }
        }
    }
}

/// Extract, relocate and clean up. Blocking.
///
/// On failure every entry the install created is removed again.
fn unpack_into(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
    events: &mpsc::UnboundedSender<BootstrapEvent>,
) -> Result<(), BootstrapError> {
    let mut extracted = Extracted::default();
    let mut seen = HashSet::new();
    let result = unpack_steps(archive, target_dir, events, &mut extracted, &mut seen);

    if let Err(ref e) = result {
        tracing::debug!("Rolling back partial FFmpeg install: {}", e);
        for path in &extracted.created {
            let _ = remove_path(path);
        }
    }
    let _ = std::fs::remove_file(archive);
    result
}

fn unpack_steps(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
    events: &mpsc::UnboundedSender<BootstrapEvent>,
    extracted: &mut Extracted,
    seen: &mut HashSet<String>,
) -> Result<(), BootstrapError> {
    let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Extracting));
    // The archive itself is removed separately and must not count as created
    seen.insert(ARCHIVE_FILE_NAME.to_string());
    extract_entries(archive, target_dir, extracted, seen)?;
    tracing::debug!("Extracted {} files", extracted.files);

    let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::Relocating));
    relocate_executables(target_dir, extracted, seen)?;

    let _ = events.send(BootstrapEvent::Phase(BootstrapPhase::CleaningUp));
    remove_leftovers(target_dir, extracted)?;

    let missing: Vec<String> = required_executables()
        .into_iter()
        .filter(|name| !target_dir.join(name).is_file())
        .collect();
    if !missing.is_empty() {
        return Err(BootstrapError::MissingExecutables {
            missing: missing.join(", "),
            target_dir: target_dir.to_path_buf(),
        });
    }

    Ok(())
}

/// Extract every entry of `archive` below `target_dir`.
///
/// Entries with absolute paths or `..` components are rejected before anything is written
/// for them. Unix permissions stored in the archive are applied.
pub fn extract_archive(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
) -> Result<Extracted, BootstrapError> {
    let mut extracted = Extracted::default();
    extract_entries(archive, target_dir, &mut extracted, &mut HashSet::new())?;
    Ok(extracted)
}

fn extract_entries(
    archive: &Utf8Path,
    target_dir: &Utf8Path,
    extracted: &mut Extracted,
    seen: &mut HashSet<String>,
) -> Result<(), BootstrapError> {
    let io_err = |source: std::io::Error| BootstrapError::Io {
        source,
        target_dir: target_dir.to_path_buf(),
    };

    let file = std::fs::File::open(archive).map_err(io_err)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| BootstrapError::Archive {
        message: e.to_string(),
        target_dir: target_dir.to_path_buf(),
    })?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| BootstrapError::Archive {
            message: e.to_string(),
            target_dir: target_dir.to_path_buf(),
        })?;

        let name = entry.name().replace('\\', "/");
        let rel = std::path::Path::new(&name);
        if rel.is_absolute()
            || rel.components().any(|c| {
                matches!(
                    c,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            })
        {
            return Err(BootstrapError::UnsafeEntry {
                entry: name,
                target_dir: target_dir.to_path_buf(),
            });
        }

        let top = rel.components().find_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        });
        let Some(top) = top else {
            continue;
        };
        extracted.note_top_level(seen, target_dir, top);

        let out_path = target_dir.as_std_path().join(rel);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_err)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out_file = std::fs::File::create(&out_path).map_err(io_err)?;
        std::io::copy(&mut entry, &mut out_file).map_err(io_err)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode().filter(|mode| mode & 0o777 != 0) {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                .map_err(io_err)?;
        }

        extracted.files += 1;
    }

    Ok(())
}

/// Copy nested executables (exact file name match) from the extracted entries to the top
/// of `target_dir`.
fn relocate_executables(
    target_dir: &Utf8Path,
    extracted: &mut Extracted,
    seen: &mut HashSet<String>,
) -> Result<(), BootstrapError> {
    let wanted = required_executables();
    let io_err = |source: std::io::Error| BootstrapError::Io {
        source,
        target_dir: target_dir.to_path_buf(),
    };

    let nested: Vec<PathBuf> = extracted
        .created
        .iter()
        .filter(|path| path.is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(Result::ok))
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| wanted.iter().any(|w| w == name))
        })
        .map(|entry| entry.into_path())
        .collect();

    for source in nested {
        let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        extracted.note_top_level(seen, target_dir, name);
        let dest = target_dir.join(name);
        tracing::debug!("Relocating {} -> {}", source.display(), dest);
        std::fs::copy(&source, &dest).map_err(io_err)?;
    }

    for name in &wanted {
        let path = target_dir.join(name);
        if path.is_file() {
            make_executable(&path).map_err(io_err)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Utf8Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Utf8Path) -> std::io::Result<()> {
    Ok(())
}

/// Delete what the install created, except the required executables at the top level.
fn remove_leftovers(target_dir: &Utf8Path, extracted: &Extracted) -> Result<(), BootstrapError> {
    let wanted = required_executables();

    for path in &extracted.created {
        let keep = path.is_file()
            && path
                .file_name()
                .is_some_and(|name| wanted.iter().any(|w| w == name));
        if keep {
            continue;
        }
        remove_path(path).map_err(|source| BootstrapError::Io {
            source,
            target_dir: target_dir.to_path_buf(),
        })?;
    }

    Ok(())
}

fn remove_path(path: &Utf8Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else if path.exists() {
        std::fs::remove_file(path)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_tool_present_requires_both() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let [ffmpeg, ffprobe] = required_executables();

        assert!(!tool_present(&dir));
        std::fs::write(dir.join(&ffmpeg), b"x").unwrap();
        assert!(!tool_present(&dir));
        std::fs::write(dir.join(&ffprobe), b"x").unwrap();
        assert!(tool_present(&dir));
    }

    #[test]
    fn test_unpack_leaves_only_executables() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let [ffmpeg, ffprobe] = required_executables();
        let archive = dir.join(ARCHIVE_FILE_NAME);

        let ffmpeg_entry = format!("ffmpeg-7.1-essentials_build/bin/{}", ffmpeg);
        let ffprobe_entry = format!("ffmpeg-7.1-essentials_build/bin/{}", ffprobe);
        write_zip(
            &archive,
            &[
                (ffmpeg_entry.as_str(), b"ffmpeg"),
                (ffprobe_entry.as_str(), b"ffprobe"),
                ("ffmpeg-7.1-essentials_build/README.txt", b"readme"),
                ("ffmpeg-7.1-essentials_build/doc/ffmpeg.html", b"<html>"),
            ],
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        unpack_into(&archive, &dir, &tx).unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        let mut expected = vec![ffmpeg.clone(), ffprobe.clone()];
        expected.sort();
        assert_eq!(names, expected);
        assert_eq!(std::fs::read(dir.join(&ffmpeg)).unwrap(), b"ffmpeg");

        let mut phases = Vec::new();
        while let Ok(BootstrapEvent::Phase(phase)) = rx.try_recv() {
            phases.push(phase);
        }
        assert_eq!(
            phases,
            vec![
                BootstrapPhase::Extracting,
                BootstrapPhase::Relocating,
                BootstrapPhase::CleaningUp
            ]
        );
    }

    #[test]
    fn test_extract_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let archive = dir.join(ARCHIVE_FILE_NAME);
        let target = dir.join("target");
        std::fs::create_dir_all(&target).unwrap();

        write_zip(&archive, &[("../escape.txt", b"nope")]);

        let err = extract_archive(&archive, &target).unwrap_err();
        assert!(matches!(err, BootstrapError::UnsafeEntry { .. }));
        assert!(!dir.join("escape.txt").exists());
    }

    #[test]
    fn test_missing_executables_reported() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let archive = dir.join(ARCHIVE_FILE_NAME);
        write_zip(&archive, &[("bin/readme.txt", b"nothing here")]);

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = unpack_into(&archive, &dir, &tx).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingExecutables { .. }));
    }

    #[test]
    fn test_error_message_carries_manual_hint() {
        let err = BootstrapError::Archive {
            message: "invalid Zip archive".to_string(),
            target_dir: Utf8PathBuf::from("/opt/ytbulk/ffmpeg"),
        };
        let message = err.to_string();
        assert!(message.contains(MANUAL_INSTALL_URL));
        assert!(message.contains("/opt/ytbulk/ffmpeg"));
    }

    #[test]
    fn test_unpack_keeps_existing_entries() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let [ffmpeg, ffprobe] = required_executables();
        std::fs::write(dir.join("notes.txt"), b"mine").unwrap();
        std::fs::create_dir_all(dir.join("my_project")).unwrap();
        std::fs::write(dir.join("my_project").join("main.rs"), b"fn main() {}").unwrap();

        let archive = dir.join(ARCHIVE_FILE_NAME);
        let ffmpeg_entry = format!("build/bin/{}", ffmpeg);
        let ffprobe_entry = format!("build/bin/{}", ffprobe);
        write_zip(
            &archive,
            &[
                (ffmpeg_entry.as_str(), b"ffmpeg"),
                (ffprobe_entry.as_str(), b"ffprobe"),
                ("build/README.txt", b"readme"),
            ],
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        unpack_into(&archive, &dir, &tx).unwrap();

        assert!(tool_present(&dir));
        assert_eq!(std::fs::read(dir.join("notes.txt")).unwrap(), b"mine");
        assert!(dir.join("my_project").join("main.rs").is_file());
        assert!(!dir.join("build").exists());
        assert!(!archive.exists());
    }

    #[test]
    fn test_failed_unpack_removes_only_created_entries() {
        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(dir.join("docs").join("keep.txt"), b"mine").unwrap();

        let archive = dir.join(ARCHIVE_FILE_NAME);
        write_zip(
            &archive,
            &[("docs/extra.txt", b"theirs"), ("stray/readme.txt", b"nothing")],
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = unpack_into(&archive, &dir, &tx).unwrap_err();
        assert!(matches!(err, BootstrapError::MissingExecutables { .. }));

        assert!(dir.join("docs").join("keep.txt").is_file());
        assert!(!dir.join("stray").exists());
        assert!(!archive.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_executables_are_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let [ffmpeg, ffprobe] = required_executables();
        let archive = dir.join(ARCHIVE_FILE_NAME);

        // Default entries carry 0o644
        let ffmpeg_entry = format!("bin/{}", ffmpeg);
        let ffprobe_entry = format!("bin/{}", ffprobe);
        write_zip(
            &archive,
            &[(ffmpeg_entry.as_str(), b"ffmpeg"), (ffprobe_entry.as_str(), b"ffprobe")],
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        unpack_into(&archive, &dir, &tx).unwrap();

        for name in [&ffmpeg, &ffprobe] {
            let mode = std::fs::metadata(dir.join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111, "{} should be executable", name);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_applies_archive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = utf8(&temp);
        let archive = dir.join(ARCHIVE_FILE_NAME);
        let target = dir.join("target");

        let file = std::fs::File::create(&archive).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default().unix_permissions(0o750);
        zip.start_file("tool/run", options).unwrap();
        zip.write_all(b"#!/bin/sh").unwrap();
        zip.finish().unwrap();

        let extracted = extract_archive(&archive, &target).unwrap();
        assert_eq!(extracted.files, 1);
        assert_eq!(extracted.created, vec![target.join("tool")]);

        let mode = std::fs::metadata(target.join("tool").join("run"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    struct NeverFetch;

    #[async_trait]
    impl ArchiveFetcher for NeverFetch {
        async fn fetch(
            &self,
            _url: &str,
            _dest: &Utf8Path,
            _events: &mpsc::UnboundedSender<BootstrapEvent>,
        ) -> Result<u64, FetchError> {
            panic!("fetch must not be called here");
        }
    }

    #[tokio::test]
    async fn test_declined_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let target = utf8(&temp).join("ffmpeg");

        let mut prompt = MockInstallPrompt::new();
        prompt.expect_confirm_install().times(1).return_const(false);

        let bootstrapper = Bootstrapper::new(
            target.clone(),
            "https://example.invalid/ffmpeg.zip",
            Arc::new(NeverFetch),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = bootstrapper.ensure(Arc::new(prompt), &tx).await.unwrap();

        assert_eq!(outcome, BootstrapOutcome::Declined);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_prompt_runs_off_the_calling_thread() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let temp = TempDir::new().unwrap();
        let caller = std::thread::current().id();
        let elsewhere = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&elsewhere);

        let mut prompt = MockInstallPrompt::new();
        prompt.expect_confirm_install().times(1).returning(move |_| {
            seen.store(std::thread::current().id() != caller, Ordering::SeqCst);
            false
        });

        let bootstrapper = Bootstrapper::new(
            utf8(&temp).join("ffmpeg"),
            "https://example.invalid/ffmpeg.zip",
            Arc::new(NeverFetch),
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = bootstrapper.ensure(Arc::new(prompt), &tx).await.unwrap();

        assert_eq!(outcome, BootstrapOutcome::Declined);
        assert!(elsewhere.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_search_dirs_are_accepted() {
        let temp = TempDir::new().unwrap();
        let system = utf8(&temp).join("system-bin");
        std::fs::create_dir_all(&system).unwrap();
        for name in required_executables() {
            std::fs::write(system.join(name), b"x").unwrap();
        }

        let mut prompt = MockInstallPrompt::new();
        prompt.expect_confirm_install().times(0);

        let bootstrapper = Bootstrapper::new(
            utf8(&temp).join("ffmpeg"),
            DEFAULT_ARCHIVE_URL,
            Arc::new(NeverFetch),
        )
        .with_search_dirs([
            utf8(&temp).join("empty").into_std_path_buf(),
            system.clone().into_std_path_buf(),
        ]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = bootstrapper.ensure(Arc::new(prompt), &tx).await.unwrap();

        assert_eq!(outcome, BootstrapOutcome::Resolved(system));
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn test_default_archive_unsupported_off_windows() {
        let temp = TempDir::new().unwrap();
        let target = utf8(&temp).join("ffmpeg");

        let mut prompt = MockInstallPrompt::new();
        prompt.expect_confirm_install().times(0);

        let bootstrapper =
            Bootstrapper::new(target.clone(), DEFAULT_ARCHIVE_URL, Arc::new(NeverFetch));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = bootstrapper
            .ensure(Arc::new(prompt), &tx)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::Unsupported { .. }));
        assert!(err.to_string().contains(target.as_str()));
        assert!(!target.exists());
        assert!(archive_usable_here("https://example.invalid/ffmpeg-linux.zip"));
    }
}
