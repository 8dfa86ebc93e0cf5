//! Boundary to the media extraction engine.
//!
//! The orchestrator only talks to [`MediaExtractor`]; the production implementation is
//! [`YtDlpExtractor`](crate::services::ytdlp::YtDlpExtractor), tests use scripted fakes.

use crate::models::PlaylistOptions;
use crate::services::directive::FormatOptions;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;

/// Metadata reported by the extractor for one URL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Final size on disk (or the best estimate the extractor has)
    pub filesize: Option<u64>,
}

impl MediaMetadata {
    /// `"{w}x{h}"`, or `"N/A"` when either side is unknown.
    pub fn resolution(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{}x{}", w, h),
            _ => crate::services::progress::NOT_AVAILABLE.to_string(),
        }
    }
}

/// Phase carried by a raw progress sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePhase {
    Downloading,
    Finished,
    Error,
}

/// One raw progress report from the extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<i64>,
    pub phase: SamplePhase,
}

impl ProgressSample {
    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            phase: SamplePhase::Downloading,
        }
    }

    pub fn finished(downloaded_bytes: u64) -> Self {
        Self {
            downloaded_bytes,
            total_bytes: Some(downloaded_bytes),
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            phase: SamplePhase::Finished,
        }
    }

    pub fn with_speed(mut self, speed: f64, eta: i64) -> Self {
        self.speed = Some(speed);
        self.eta = Some(eta);
        self
    }

    /// Exact total if known, otherwise the estimate, otherwise 0.
    pub fn total_or_estimate(&self) -> u64 {
        self.total_bytes
            .filter(|total| *total > 0)
            .or(self.total_bytes_estimate)
            .unwrap_or(0)
    }
}

/// Options handed to the extractor for every job of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorOptions {
    /// Output path template, e.g. `<dest>/%(title)s.%(ext)s`
    pub output_template: String,
    pub format: FormatOptions,
    pub tool_location: Option<Utf8PathBuf>,
    pub playlist: Option<PlaylistOptions>,
}

/// Errors raised by the extractor for a single job.
#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("Failed to launch extractor: {0}")]
    Launch(#[from] std::io::Error),

    #[error("Extractor exited with code {code}: {message}")]
    Exited { code: i32, message: String },

    #[error("Unexpected extractor output: {0}")]
    Output(String),

    #[error("{0}")]
    Other(String),
}

/// Media extraction engine: resolves metadata and downloads one URL at a time.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Resolve title, duration and resolution without downloading.
    async fn resolve(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<MediaMetadata, ExtractorError>;

    /// Download `url`, pushing raw samples into `progress` as they arrive.
    ///
    /// Implementations send exactly one terminal sample (`Finished` or `Error`).
    async fn download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        progress: mpsc::UnboundedSender<ProgressSample>,
    ) -> Result<MediaMetadata, ExtractorError>;
}
