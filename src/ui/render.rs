// Terminal rendering of run and bootstrap events with indicatif bars.

use crate::models::JobState;
use crate::services::bootstrap::{BootstrapEvent, BootstrapPhase};
use crate::services::orchestrator::{LogLevel, LogLine, ProgressUpdate, RunEvent};
use crate::state::StateChange;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::OnceLock;
use std::time::Duration;

/// Bars are 0..=1000 so percentages keep one decimal.
const BAR_SCALE: f64 = 10.0;
const BAR_LEN: u64 = 1000;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn percent_position(percent: f64) -> u64 {
    ((percent.clamp(0.0, 100.0) * BAR_SCALE).round() as u64).min(BAR_LEN)
}

/// Prefix shown before a log line in the terminal.
pub fn level_marker(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "   ",
        LogLevel::Success => "[+]",
        LogLevel::Warning => "[!]",
        LogLevel::Error => "[x]",
    }
}

/// One line of the per-file bar message.
pub fn file_message(update: &ProgressUpdate) -> String {
    match update.phase {
        JobState::Fetching => update.title.clone(),
        JobState::Processing => format!("{} | processing...", update.title),
        _ => format!(
            "{} | {} / {} | {} | ETA {}",
            update.title, update.downloaded, update.total_size, update.speed, update.eta
        ),
    }
}

/// Suffix of the overall bar, e.g. `2 ok, 1 failed`.
pub fn results_tally(successful: usize, failed: usize, skipped: usize) -> String {
    if skipped > 0 {
        format!("{} ok, {} failed, {} skipped", successful, failed, skipped)
    } else {
        format!("{} ok, {} failed", successful, failed)
    }
}

/// Overall and per-file bars of a batch run.
struct RunBars {
    overall: ProgressBar,
    file: ProgressBar,
}

/// Progress bars plus log output above them.
///
/// Bars are added to the terminal on their first event so nothing is drawn while the
/// install prompt is waiting for an answer.
pub struct ProgressRenderer {
    multi: MultiProgress,
    run: OnceLock<RunBars>,
    bootstrap: Option<ProgressBar>,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Renderer that draws nothing.
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            run: OnceLock::new(),
            bootstrap: None,
        }
    }

    fn run_bars(&self) -> &RunBars {
        self.run.get_or_init(|| {
            let overall = self.multi.add(ProgressBar::new(BAR_LEN));
            overall.set_style(style(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg} {prefix}",
            ));
            overall.enable_steady_tick(Duration::from_millis(100));

            let file = self.multi.add(ProgressBar::new(BAR_LEN));
            file.set_style(style("  {spinner:.blue} [{bar:30.white/dim}] {wide_msg}"));

            RunBars { overall, file }
        })
    }

    pub fn println(&self, line: impl AsRef<str>) {
        // Falls back to plain stderr when the bars are hidden
        if self.multi.println(line.as_ref()).is_err() || self.multi.is_hidden() {
            eprintln!("{}", line.as_ref());
        }
    }

    fn log(&self, line: &LogLine) {
        self.println(format!("{} {}", level_marker(line.level), line.message));
    }

    /// Drive the bars from the run's own progress events.
    ///
    /// Log lines and results arrive through [`apply_state`](Self::apply_state) instead.
    pub fn apply(&self, event: &RunEvent) {
        match event {
            RunEvent::Progress(update) => {
                let bars = self.run_bars();
                bars.overall
                    .set_position(percent_position(update.overall_percent));
                bars.overall.set_message(format!(
                    "{:.1}% | file {}/{}",
                    update.overall_percent, update.file_num, update.total_files
                ));
                bars.file.set_position(percent_position(update.file_percent));
                bars.file.set_message(file_message(update));
            }
            RunEvent::JobCompleted { .. } => {
                if let Some(bars) = self.run.get() {
                    bars.file.set_position(0);
                }
            }
            RunEvent::Log(_) | RunEvent::Finished(_) => {}
        }
    }

    /// React to a change published by the state manager.
    pub fn apply_state(&self, change: &StateChange) {
        match change {
            StateChange::LogAppended(line) => self.log(line),
            StateChange::ResultsUpdated {
                successful,
                failed,
                skipped,
            } => {
                if let Some(bars) = self.run.get() {
                    bars.overall
                        .set_prefix(results_tally(*successful, *failed, *skipped));
                }
            }
            StateChange::DownloadFinished {
                successful,
                failed,
                skipped,
                ..
            } => {
                if let Some(bars) = self.run.get() {
                    bars.file.finish_and_clear();
                    bars.overall.finish_with_message(format!(
                        "{} of {} downloaded",
                        successful,
                        successful + failed + skipped
                    ));
                }
            }
            _ => {}
        }
    }

    pub fn apply_bootstrap(&mut self, event: &BootstrapEvent) {
        match event {
            BootstrapEvent::Phase(phase) => {
                let bar = self.bootstrap_bar();
                match phase {
                    BootstrapPhase::Done => bar.finish_with_message("FFmpeg ready"),
                    BootstrapPhase::Failed => bar.abandon_with_message("FFmpeg install failed"),
                    other => bar.set_message(format!("FFmpeg: {:?}", other)),
                }
            }
            BootstrapEvent::Progress { downloaded, total } => {
                let bar = self.bootstrap_bar();
                if *total > 0 {
                    bar.set_length(*total);
                }
                bar.set_position(*downloaded);
            }
        }
    }

    fn bootstrap_bar(&mut self) -> &ProgressBar {
        let multi = &self.multi;
        self.bootstrap.get_or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(0));
            bar.set_style(style(
                "  {spinner:.yellow} {msg} [{bar:30.white/dim}] {bytes}/{total_bytes} {bytes_per_sec}",
            ));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}
