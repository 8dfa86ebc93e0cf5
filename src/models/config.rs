use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output media kind requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    /// MP4 video (video + audio)
    #[default]
    Video,
    /// MP3 audio
    Audio,
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Video => write!(f, "mp4"),
            MediaFormat::Audio => write!(f, "mp3"),
        }
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" | "mp4" => Ok(MediaFormat::Video),
            "audio" | "mp3" => Ok(MediaFormat::Audio),
            other => Err(format!("unknown format '{}' (expected video/mp4 or audio/mp3)", other)),
        }
    }
}

/// Quality tier for video downloads. Ignored for audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityTier {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "smallest")]
    Smallest,
}

impl QualityTier {
    /// All tiers, best first.
    pub const ALL: [QualityTier; 6] = [
        QualityTier::Best,
        QualityTier::P1080,
        QualityTier::P720,
        QualityTier::P480,
        QualityTier::P360,
        QualityTier::Smallest,
    ];

    /// Height cap in pixels for the fixed-resolution tiers.
    pub fn max_height(self) -> Option<u32> {
        match self {
            QualityTier::P1080 => Some(1080),
            QualityTier::P720 => Some(720),
            QualityTier::P480 => Some(480),
            QualityTier::P360 => Some(360),
            QualityTier::Best | QualityTier::Smallest => None,
        }
    }

    /// Human readable description shown next to the tier selector.
    pub fn description(self) -> &'static str {
        match self {
            QualityTier::Best => "4K/1080p - Best Available",
            QualityTier::P1080 => "Full HD",
            QualityTier::P720 => "HD",
            QualityTier::P480 => "SD",
            QualityTier::P360 => "Low Quality",
            QualityTier::Smallest => "Smallest File Size",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::Best => "best",
            QualityTier::P1080 => "1080p",
            QualityTier::P720 => "720p",
            QualityTier::P480 => "480p",
            QualityTier::P360 => "360p",
            QualityTier::Smallest => "smallest",
        };
        f.write_str(label)
    }
}

impl FromStr for QualityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        QualityTier::ALL
            .into_iter()
            .find(|tier| tier.to_string() == normalized)
            .ok_or_else(|| format!("unknown quality '{}'", s))
    }
}

/// Playlist handling is delegated to the extractor; the batch treats a playlist URL as one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistOptions {
    /// Maximum number of playlist entries to fetch (0 = no limit)
    pub limit: u32,
}

/// Immutable per-batch configuration supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    pub format: MediaFormat,
    pub quality: QualityTier,
    pub destination_directory: Utf8PathBuf,
    /// Directory holding the resolved ffmpeg/ffprobe executables, if any
    pub tool_location: Option<Utf8PathBuf>,
    pub playlist: Option<PlaylistOptions>,
}

impl DownloadConfig {
    pub fn new(
        format: MediaFormat,
        quality: QualityTier,
        destination: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            format,
            quality,
            destination_directory: destination.into(),
            tool_location: None,
            playlist: None,
        }
    }

    pub fn with_tool_location(mut self, location: Option<Utf8PathBuf>) -> Self {
        self.tool_location = location;
        self
    }

    pub fn with_playlist(mut self, playlist: Option<PlaylistOptions>) -> Self {
        self.playlist = playlist;
        self
    }
}

/// Persisted user settings (`settings.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub downloader: DownloaderSettings,
    pub bootstrap: BootstrapSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderSettings {
    /// Where media files are saved; empty means `~/Downloads`
    pub download_dir: String,
    pub format: MediaFormat,
    pub quality: QualityTier,
    pub playlist_mode: bool,
    pub playlist_limit: u32,
    /// yt-dlp executable name or path
    pub ytdlp_path: String,
    pub debug_mode: bool,
}

impl Default for DownloaderSettings {
    fn default() -> Self {
        Self {
            download_dir: String::new(),
            format: MediaFormat::Video,
            quality: QualityTier::Best,
            playlist_mode: false,
            playlist_limit: 0,
            ytdlp_path: "yt-dlp".to_string(),
            debug_mode: false,
        }
    }
}

impl DownloaderSettings {
    /// Playlist options derived from the toggle and limit.
    pub fn playlist_options(&self) -> Option<PlaylistOptions> {
        self.playlist_mode.then_some(PlaylistOptions {
            limit: self.playlist_limit,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Target directory for ffmpeg/ffprobe; empty means `<install dir>/ffmpeg`
    pub tool_dir: String,
    pub archive_url: String,
    pub timeout_secs: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            tool_dir: String::new(),
            archive_url: crate::services::bootstrap::DEFAULT_ARCHIVE_URL.to_string(),
            timeout_secs: 60,
        }
    }
}
