use crate::models::config::{DownloadConfig, MediaFormat, PlaylistOptions, QualityTier};
use crate::models::job::{BatchSummary, JobState};
use crate::services::orchestrator::{LogLine, RunEvent};
use crate::services::progress::{CALCULATING, NOT_AVAILABLE};
use camino::Utf8PathBuf;
use std::collections::VecDeque;

/// How many log lines the presentation view keeps.
pub const MAX_LOG_LINES: usize = 500;

/// Presentation-side view of the application.
///
/// The orchestrator owns the authoritative run state; this struct is what a front end shows
/// and is rebuilt from the [`RunEvent`] stream.
///
/// # Thread Safety
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly - use [`update()`](crate::state::StateManager::update) so
/// change events are emitted.
#[derive(Clone, Debug)]
pub struct AppState {
    // Runtime state
    pub is_downloading: bool,
    pub current_title: Option<String>,
    pub phase: Option<JobState>,

    // Progress state
    pub current_file: usize,
    pub total_files: usize,
    pub overall_percent: f64,
    pub file_percent: f64,
    pub downloaded: String,
    pub total_size: String,
    pub speed: String,
    pub eta: String,

    // Results of the current run
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub last_summary: Option<BatchSummary>,

    // Log buffer, oldest first
    pub log: VecDeque<LogLine>,
    /// Bumped on every appended line, including ones that evict an old line
    pub log_sequence: u64,

    // Tool
    pub tool_location: Option<Utf8PathBuf>,

    // Settings
    pub format: MediaFormat,
    pub quality: QualityTier,
    pub destination_directory: Utf8PathBuf,
    pub playlist: Option<PlaylistOptions>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            is_downloading: false,
            current_title: None,
            phase: None,

            current_file: 0,
            total_files: 0,
            overall_percent: 0.0,
            file_percent: 0.0,
            downloaded: NOT_AVAILABLE.to_string(),
            total_size: NOT_AVAILABLE.to_string(),
            speed: NOT_AVAILABLE.to_string(),
            eta: NOT_AVAILABLE.to_string(),

            successful: 0,
            failed: 0,
            skipped: 0,
            last_summary: None,

            log: VecDeque::new(),
            log_sequence: 0,

            tool_location: None,

            format: MediaFormat::Video,
            quality: QualityTier::Best,
            destination_directory: Utf8PathBuf::from("downloads"),
            playlist: None,
        }
    }
}

impl AppState {
    /// Snapshot of the settings as the orchestrator's input.
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::new(self.format, self.quality, self.destination_directory.clone())
            .with_tool_location(self.tool_location.clone())
            .with_playlist(self.playlist)
    }

    /// Append a line, evicting the oldest past [`MAX_LOG_LINES`].
    pub fn push_log(&mut self, line: LogLine) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
        self.log_sequence += 1;
    }

    /// Clear everything tied to a single run. Settings, tool location and the log survive.
    pub fn reset_run_state(&mut self) {
        self.is_downloading = false;
        self.current_title = None;
        self.phase = None;
        self.current_file = 0;
        self.total_files = 0;
        self.overall_percent = 0.0;
        self.file_percent = 0.0;
        self.downloaded = NOT_AVAILABLE.to_string();
        self.total_size = NOT_AVAILABLE.to_string();
        self.speed = NOT_AVAILABLE.to_string();
        self.eta = NOT_AVAILABLE.to_string();
        self.successful = 0;
        self.failed = 0;
        self.skipped = 0;
        self.last_summary = None;
    }

    /// Fold one run event into the view.
    pub fn apply_run_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Progress(update) => {
                self.current_file = update.file_num;
                self.total_files = update.total_files;
                self.overall_percent = update.overall_percent;
                self.file_percent = update.file_percent;
                self.downloaded = update.downloaded.clone();
                self.total_size = update.total_size.clone();
                self.speed = update.speed.clone();
                self.eta = update.eta.clone();
                self.current_title = Some(update.title.clone());
                self.phase = Some(update.phase);
            }
            RunEvent::Log(line) => self.push_log(line.clone()),
            RunEvent::JobCompleted { state, .. } => match state {
                JobState::Done => self.successful += 1,
                JobState::Failed => self.failed += 1,
                JobState::Skipped => self.skipped += 1,
                _ => {}
            },
            RunEvent::Finished(summary) => {
                self.is_downloading = false;
                self.current_title = None;
                self.phase = None;
                self.speed = NOT_AVAILABLE.to_string();
                self.eta = NOT_AVAILABLE.to_string();
                self.successful = summary.successful;
                self.failed = summary.failed;
                self.skipped = summary.skipped;
                if summary.total > 0 && !summary.cancelled {
                    self.overall_percent = 100.0;
                }
                self.last_summary = Some(summary.clone());
            }
        }
    }

    /// Placeholder values shown right after a start, before the first progress event.
    pub fn mark_starting(&mut self) {
        self.reset_run_state();
        self.is_downloading = true;
        self.speed = CALCULATING.to_string();
        self.eta = CALCULATING.to_string();
    }
}
