//! Services module - Batch downloading and tool installation.
//!
//! Everything here is free of presentation code; the terminal front end in [`crate::ui`]
//! only consumes the event channels these services expose.
//!
//! # Components
//!
//! - [`BatchOrchestrator`]: Runs a batch of URLs strictly one at a time. Handles:
//!   - Input filtering through [`UrlFilter`]
//!   - Resolving the format directive once per run ([`resolve_directive`])
//!   - Forwarding extractor progress through the aggregator in [`progress`]
//!   - Cooperative cancellation and per-job failure isolation
//!
//! - [`MediaExtractor`]: The boundary to the extraction engine. [`YtDlpExtractor`] drives the
//!   `yt-dlp` executable; tests substitute scripted fakes.
//!
//! - [`Bootstrapper`]: Installs `ffmpeg`/`ffprobe` on demand with byte-level progress.
//!
//! # Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ytbulk::services::{BatchOrchestrator, RunEvent, YtDlpExtractor};
//!
//! let orchestrator = BatchOrchestrator::new(Arc::new(YtDlpExtractor::new("yt-dlp")));
//! let mut run = orchestrator.start("https://youtu.be/dQw4w9WgXcQ", config)?;
//!
//! while let Some(event) = run.next_event().await {
//!     if let RunEvent::Finished(summary) = event {
//!         println!("{} of {} succeeded", summary.successful, summary.total);
//!     }
//! }
//! ```

pub mod bootstrap;
pub mod directive;
pub mod extractor;
pub mod orchestrator;
pub mod progress;
pub mod url_filter;
pub mod ytdlp;

pub use bootstrap::{
    ArchiveFetcher, BootstrapError, BootstrapEvent, BootstrapOutcome, BootstrapPhase,
    Bootstrapper, FetchError, HttpArchiveFetcher, InstallPrompt,
};
pub use directive::{resolve_directive, FormatOptions, ResolvedDirective};
pub use extractor::{
    ExtractorError, ExtractorOptions, MediaExtractor, MediaMetadata, ProgressSample, SamplePhase,
};
pub use orchestrator::{
    BatchOrchestrator, BatchRunHandle, CancelHandle, LogLevel, LogLine, ProgressUpdate, RunEvent,
    StartError,
};
pub use progress::NormalizedProgress;
pub use url_filter::{FilterOutcome, UrlFilter};
pub use ytdlp::YtDlpExtractor;
