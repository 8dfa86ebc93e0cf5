// State management module
//
// StateManager wraps the presentation view in Arc<RwLock<T>> and broadcasts change events.

use crate::models::{AppState, UserConfig};
use crate::services::orchestrator::{LogLine, RunEvent};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run has been accepted and is starting
    DownloadStarted,

    /// Progress of the current job moved
    ProgressUpdated {
        file_num: usize,
        total_files: usize,
        overall_percent: f64,
        title: Option<String>,
    },

    /// A line was appended to the log buffer
    LogAppended(LogLine),

    /// Per-run result counters changed
    ResultsUpdated {
        successful: usize,
        failed: usize,
        skipped: usize,
    },

    /// The run is over
    DownloadFinished {
        successful: usize,
        failed: usize,
        skipped: usize,
        cancelled: bool,
    },

    /// The ffmpeg directory was resolved or cleared
    ToolLocationChanged(Option<Utf8PathBuf>),

    /// Settings have been updated
    SettingsChanged,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Refuses a second download while one is active
///   ([`try_begin_download`](Self::try_begin_download))
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`crate::services::RunEvent`]: Folded into the state by
///   [`apply_run_event`](Self::apply_run_event)
/// - [`crate::ui::controller::ConsoleController`]: Primary consumer of state events
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event broadcast buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the whole state; holds no lock afterwards
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_downloading);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs, and broadcasts every detected
    /// change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.write();
        self.apply(&mut state, update_fn)
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply<F>(&self, state: &mut AppState, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let old_state = state.clone();
        update_fn(state);

        let changes = self.detect_changes(&old_state, state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }
        changes
    }

    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_downloading != new.is_downloading {
            if new.is_downloading {
                changes.push(StateChange::DownloadStarted);
            } else {
                changes.push(StateChange::DownloadFinished {
                    successful: new.successful,
                    failed: new.failed,
                    skipped: new.skipped,
                    cancelled: new
                        .last_summary
                        .as_ref()
                        .is_some_and(|summary| summary.cancelled),
                });
            }
        }

        if old.current_file != new.current_file
            || old.total_files != new.total_files
            || old.overall_percent != new.overall_percent
            || old.file_percent != new.file_percent
            || old.current_title != new.current_title
        {
            changes.push(StateChange::ProgressUpdated {
                file_num: new.current_file,
                total_files: new.total_files,
                overall_percent: new.overall_percent,
                title: new.current_title.clone(),
            });
        }

        if old.log_sequence != new.log_sequence {
            // Only the newest line is reported; callers read the buffer for more
            if let Some(line) = new.log.back() {
                changes.push(StateChange::LogAppended(line.clone()));
            }
        }

        if old.successful != new.successful
            || old.failed != new.failed
            || old.skipped != new.skipped
        {
            changes.push(StateChange::ResultsUpdated {
                successful: new.successful,
                failed: new.failed,
                skipped: new.skipped,
            });
        }

        if old.tool_location != new.tool_location {
            changes.push(StateChange::ToolLocationChanged(new.tool_location.clone()));
        }

        if old.format != new.format
            || old.quality != new.quality
            || old.destination_directory != new.destination_directory
            || old.playlist != new.playlist
        {
            changes.push(StateChange::SettingsChanged);
        }

        changes
    }

    /// Mark a download as active unless one already is.
    ///
    /// Returns `None` when a run is in progress; the check and the transition happen under
    /// one write lock.
    pub fn try_begin_download(&self) -> Option<Vec<StateChange>> {
        let mut state = self.write();
        if state.is_downloading {
            tracing::warn!("Download already in progress; start request ignored");
            return None;
        }
        Some(self.apply(&mut state, |state| state.mark_starting()))
    }

    /// Release the download gate without a summary (the start itself failed).
    pub fn abort_download(&self) -> Vec<StateChange> {
        self.update(|state| state.is_downloading = false)
    }

    /// Fold a run event into the state
    pub fn apply_run_event(&self, event: &RunEvent) -> Vec<StateChange> {
        self.update(|state| state.apply_run_event(event))
    }

    pub fn set_tool_location(&self, location: Option<Utf8PathBuf>) -> Vec<StateChange> {
        self.update(|state| state.tool_location = location)
    }

    pub fn update_settings<F>(&self, settings_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        self.update(settings_fn)
    }

    /// Populate settings from the loaded user configuration
    pub fn load_from_user_config(
        &self,
        user_config: &UserConfig,
        destination: Utf8PathBuf,
    ) -> Vec<StateChange> {
        self.update(|state| {
            let settings = &user_config.downloader;
            state.format = settings.format;
            state.quality = settings.quality;
            state.destination_directory = destination;
            state.playlist = settings.playlist_options();

            tracing::info!(
                "Loaded user config: format={}, quality={}, destination={}, playlist={}",
                state.format,
                state.quality,
                state.destination_directory,
                settings.playlist_mode
            );
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchSummary, MediaFormat, QualityTier};
    use crate::services::orchestrator::LogLevel;
    use std::time::Duration;

    fn summary(cancelled: bool) -> BatchSummary {
        BatchSummary {
            total: 3,
            successful: 1,
            failed: 1,
            skipped: 1,
            total_bytes: 100,
            elapsed: Duration::from_secs(1),
            cancelled,
        }
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();
        assert!(!state.is_downloading);
        assert_eq!(state.current_file, 0);
    }

    #[test]
    fn test_try_begin_download_gates_reentry() {
        let manager = StateManager::new();

        let changes = manager.try_begin_download().unwrap();
        assert!(changes.contains(&StateChange::DownloadStarted));

        assert!(manager.try_begin_download().is_none());

        manager.apply_run_event(&RunEvent::Finished(summary(false)));
        assert!(manager.try_begin_download().is_some());
    }

    #[test]
    fn test_abort_download_releases_gate() {
        let manager = StateManager::new();
        manager.try_begin_download();
        manager.abort_download();
        assert!(!manager.read(|s| s.is_downloading));
    }

    #[test]
    fn test_finished_event() {
        let manager = StateManager::new();
        manager.try_begin_download();

        let changes = manager.apply_run_event(&RunEvent::Finished(summary(true)));
        assert!(changes.contains(&StateChange::DownloadFinished {
            successful: 1,
            failed: 1,
            skipped: 1,
            cancelled: true,
        }));
    }

    #[test]
    fn test_log_event() {
        let manager = StateManager::new();
        let line = LogLine {
            level: LogLevel::Warning,
            message: "careful".to_string(),
        };

        let changes = manager.apply_run_event(&RunEvent::Log(line.clone()));
        assert_eq!(changes, vec![StateChange::LogAppended(line)]);
    }

    #[test]
    fn test_tool_location_change() {
        let manager = StateManager::new();
        let path = Utf8PathBuf::from("/opt/ffmpeg");

        let changes = manager.set_tool_location(Some(path.clone()));
        assert_eq!(changes, vec![StateChange::ToolLocationChanged(Some(path))]);

        // Same value again is not a change
        assert!(manager.set_tool_location(Some(Utf8PathBuf::from("/opt/ffmpeg"))).is_empty());
    }

    #[test]
    fn test_settings_change_detection() {
        let manager = StateManager::new();
        let changes = manager.update_settings(|state| {
            state.format = MediaFormat::Audio;
            state.quality = QualityTier::P480;
        });
        assert_eq!(changes, vec![StateChange::SettingsChanged]);
    }

    #[test]
    fn test_subscribe_and_clone() {
        let manager = StateManager::new();
        let clone = manager.clone();
        let mut rx = manager.subscribe();

        clone.try_begin_download();

        assert_eq!(rx.try_recv().unwrap(), StateChange::DownloadStarted);
        assert!(manager.read(|s| s.is_downloading));
    }
}
