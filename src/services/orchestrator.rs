//! Batch download orchestrator.
//!
//! [`BatchOrchestrator::start`] validates input, resolves the format directive once and
//! spawns a single worker task that processes jobs strictly in order. The worker reports
//! through an unbounded [`RunEvent`] channel; the terminal [`RunEvent::Finished`] is always
//! the last event of a run. Cancellation is a `watch` flag polled between jobs.

use crate::metrics::Metrics;
use crate::models::job::{BatchRun, BatchSummary, JobState, UNKNOWN_TITLE};
use crate::models::DownloadConfig;
use crate::services::bootstrap;
use crate::services::directive::resolve_directive;
use crate::services::extractor::{
    ExtractorError, ExtractorOptions, MediaExtractor, MediaMetadata, ProgressSample, SamplePhase,
};
use crate::services::progress::{self, format_bytes, format_duration, NOT_AVAILABLE};
use crate::services::url_filter::UrlFilter;
use camino::Utf8PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Failure messages are cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 100;

/// Title shown while metadata is being resolved.
pub const FETCHING_TITLE: &str = "Fetching video info...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One human-readable line for the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Progress of the current job, normalized for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub overall_percent: f64,
    pub file_percent: f64,
    /// 1-based
    pub file_num: usize,
    pub total_files: usize,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub downloaded: String,
    pub total_size: String,
    pub speed: String,
    pub eta: String,
    pub title: String,
    pub phase: JobState,
}

/// Everything a run reports to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress(ProgressUpdate),
    Log(LogLine),
    JobCompleted {
        index: usize,
        url: String,
        title: String,
        state: JobState,
        error: Option<String>,
    },
    /// Always the last event of a run
    Finished(BatchSummary),
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error("No valid URLs to download ({rejected} line(s) rejected)")]
    NoValidInput { rejected: usize },

    #[error("Cannot create destination directory {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Shared sending side of the run event channel.
///
/// The worker closes it when emitting the summary, after which every send is dropped.
#[derive(Clone)]
struct EventSink {
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<RunEvent>>>>,
    metrics: Option<Arc<Metrics>>,
}

type SenderSlot = Option<mpsc::UnboundedSender<RunEvent>>;

impl EventSink {
    fn new(tx: mpsc::UnboundedSender<RunEvent>, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SenderSlot> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send_on(&self, slot: &SenderSlot, event: RunEvent) -> bool {
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        let delivered = tx.send(event).is_ok();
        if let Some(ref metrics) = self.metrics {
            metrics.record_event(delivered);
        }
        delivered
    }

    fn emit(&self, event: RunEvent) -> bool {
        let slot = self.lock();
        self.send_on(&slot, event)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        self.emit(RunEvent::Log(trace_line(level, message)))
    }

    /// Send the final event and close the channel.
    fn finish(&self, summary: BatchSummary) {
        let mut slot = self.lock();
        let tx = slot.take();
        self.send_on(&tx, RunEvent::Finished(summary));
    }

    /// Drop the sender without a summary; receivers see the end of the stream.
    fn close(&self) {
        self.lock().take();
    }
}

/// Mirror a run log line into tracing.
fn trace_line(level: LogLevel, message: impl Into<String>) -> LogLine {
    let message = message.into();
    match level {
        LogLevel::Info | LogLevel::Success => tracing::info!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
    LogLine { level, message }
}

/// Cloneable handle that requests cancellation of a run.
#[derive(Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
    sink: EventSink,
}

impl CancelHandle {
    /// Request cancellation. The job in flight finishes; later jobs are skipped.
    ///
    /// Returns `true` only for the call that actually set the flag.
    pub fn cancel(&self) -> bool {
        // The sink stays locked until the acknowledgement is queued, so the worker
        // cannot report the skip or close the stream ahead of it
        let slot = self.sink.lock();
        let newly_set = self.flag.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        });

        if newly_set {
            self.sink.send_on(
                &slot,
                RunEvent::Log(trace_line(
                    LogLevel::Warning,
                    "Cancellation requested. Finishing current download...",
                )),
            );
        }
        newly_set
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }
}

/// Handle to a running batch.
pub struct BatchRunHandle {
    events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancelHandle,
    worker: JoinHandle<BatchSummary>,
}

impl BatchRunHandle {
    /// Next event, or `None` once the summary has been received.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    pub fn canceller(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the worker and return its summary, discarding unread events.
    pub async fn wait(self) -> anyhow::Result<BatchSummary> {
        let summary = self.worker.await?;
        Ok(summary)
    }
}

/// Sequences download jobs through a [`MediaExtractor`].
pub struct BatchOrchestrator {
    extractor: Arc<dyn MediaExtractor>,
    filter: UrlFilter,
    metrics: Option<Arc<Metrics>>,
}

impl BatchOrchestrator {
    pub fn new(extractor: Arc<dyn MediaExtractor>) -> Self {
        Self {
            extractor,
            filter: UrlFilter::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate input and spawn the worker. Must be called inside a tokio runtime.
    ///
    /// Returns immediately; progress and the final summary arrive through the handle.
    pub fn start(
        &self,
        raw_input: &str,
        config: DownloadConfig,
    ) -> Result<BatchRunHandle, StartError> {
        if raw_input.trim().is_empty() {
            return Err(StartError::NoValidInput { rejected: 0 });
        }

        let outcome = self.filter.filter_text(raw_input);
        if outcome.accepted.is_empty() {
            return Err(StartError::NoValidInput {
                rejected: outcome.rejected.len(),
            });
        }

        std::fs::create_dir_all(&config.destination_directory).map_err(|source| {
            StartError::Filesystem {
                path: config.destination_directory.clone(),
                source,
            }
        })?;

        let tool_location = config
            .tool_location
            .clone()
            .filter(|dir| bootstrap::tool_present(dir));
        let resolved = resolve_directive(config.format, config.quality, tool_location.is_some());

        let options = ExtractorOptions {
            output_template: config
                .destination_directory
                .join("%(title)s.%(ext)s")
                .to_string(),
            format: resolved.format,
            tool_location: tool_location.clone(),
            playlist: config.playlist,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx, self.metrics.clone());
        let (flag, cancel_rx) = watch::channel(false);

        for rejected in &outcome.rejected {
            sink.log(LogLevel::Warning, format!("Invalid URL skipped: {}", rejected));
        }
        sink.log(
            LogLevel::Info,
            format!(
                "Starting download of {} item(s) as {} ({}) to {}",
                outcome.accepted.len(),
                config.format,
                config.quality,
                config.destination_directory
            ),
        );
        match tool_location {
            Some(ref dir) => sink.log(LogLevel::Info, format!("FFmpeg found at: {}", dir)),
            None => sink.log(LogLevel::Info, "FFmpeg not found"),
        };
        if let Some(degradation) = resolved.degradation {
            sink.log(LogLevel::Warning, degradation);
        }
        sink.log(LogLevel::Info, resolved.description);

        let worker = Worker {
            extractor: Arc::clone(&self.extractor),
            options,
            sink: sink.clone(),
            cancel_rx,
            metrics: self.metrics.clone(),
        };
        let worker = tokio::spawn(worker.run(outcome.accepted));

        Ok(BatchRunHandle {
            events: rx,
            cancel: CancelHandle {
                flag: Arc::new(flag),
                sink,
            },
            worker,
        })
    }
}

/// Cut `message` to [`MAX_ERROR_CHARS`] characters, marking the cut with `...`.
pub fn truncate_error(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_ERROR_CHARS {
        return trimmed.to_string();
    }
    let mut truncated: String = trimmed.chars().take(MAX_ERROR_CHARS).collect();
    truncated.push_str("...");
    truncated
}

/// Per-job progress bookkeeping.
struct JobProgress {
    index: usize,
    total_files: usize,
    title: String,
    /// Highest file percentage reported so far
    ratchet: f64,
    last_total: u64,
    last_downloaded: u64,
}

impl JobProgress {
    fn new(index: usize, total_files: usize, title: String) -> Self {
        Self {
            index,
            total_files,
            title,
            ratchet: 0.0,
            last_total: 0,
            last_downloaded: 0,
        }
    }

    fn update(&mut self, sample: &ProgressSample, phase: JobState) -> ProgressUpdate {
        let normalized = progress::aggregate(self.index, self.total_files, sample);

        self.ratchet = self.ratchet.max(normalized.file_percent);
        let total = sample.total_or_estimate();
        if total > 0 {
            self.last_total = total;
        }
        self.last_downloaded = sample.downloaded_bytes;

        ProgressUpdate {
            overall_percent: progress::overall_percent(self.index, self.total_files, self.ratchet),
            file_percent: self.ratchet,
            file_num: self.index + 1,
            total_files: self.total_files,
            downloaded_bytes: sample.downloaded_bytes,
            total_bytes: total,
            downloaded: normalized.downloaded,
            total_size: normalized.total_size,
            speed: normalized.speed,
            eta: normalized.eta,
            title: self.title.clone(),
            phase,
        }
    }

    /// Best guess of the job's size when the extractor reports none.
    fn observed_bytes(&self) -> u64 {
        self.last_total.max(self.last_downloaded)
    }
}

struct Worker {
    extractor: Arc<dyn MediaExtractor>,
    options: ExtractorOptions,
    sink: EventSink,
    cancel_rx: watch::Receiver<bool>,
    metrics: Option<Arc<Metrics>>,
}

// Ends the event stream even when the task unwinds before `finish`
impl Drop for Worker {
    fn drop(&mut self) {
        self.sink.close();
    }
}

impl Worker {
    async fn run(self, urls: Vec<String>) -> BatchSummary {
        let mut run = BatchRun::new(urls);
        let total = run.len();

        for index in 0..total {
            if *self.cancel_rx.borrow() {
                let skipped = run.skip_remaining(index);
                if let Some(ref metrics) = self.metrics {
                    metrics.record_jobs_skipped(skipped);
                }
                for job in &run.jobs()[index..] {
                    self.sink.emit(RunEvent::JobCompleted {
                        index: job.index,
                        url: job.url.clone(),
                        title: job.title.clone(),
                        state: job.state,
                        error: None,
                    });
                }
                self.sink.log(
                    LogLevel::Warning,
                    format!("Download cancelled by user. {} item(s) skipped.", skipped),
                );
                break;
            }

            self.process_job(&mut run, index).await;
        }

        let summary = run.summary(*self.cancel_rx.borrow());
        self.log_summary(&summary);
        self.sink.finish(summary.clone());
        summary
    }

    async fn process_job(&self, run: &mut BatchRun, index: usize) {
        let total = run.len();
        let url = run.begin_job(index).url.clone();

        self.sink.log(
            LogLevel::Info,
            format!("[{}/{}] Processing: {}", index + 1, total, url),
        );
        self.sink.emit(RunEvent::Progress(ProgressUpdate {
            overall_percent: progress::overall_percent(index, total, 0.0),
            file_percent: 0.0,
            file_num: index + 1,
            total_files: total,
            downloaded_bytes: 0,
            total_bytes: 0,
            downloaded: format_bytes(0),
            total_size: NOT_AVAILABLE.to_string(),
            speed: progress::CALCULATING.to_string(),
            eta: progress::CALCULATING.to_string(),
            title: FETCHING_TITLE.to_string(),
            phase: JobState::Fetching,
        }));

        let resolved = match self.extractor.resolve(&url, &self.options).await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.fail(run, index, &e);
                return;
            }
        };
        run.set_title(index, resolved.title.clone());
        run.set_state(index, JobState::Downloading);
        self.sink
            .log(LogLevel::Info, format!("Downloading: {}", resolved.title));

        let mut tracker = JobProgress::new(index, total, resolved.title.clone());
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let result = {
            let download = self.extractor.download(&url, &self.options, progress_tx);
            tokio::pin!(download);

            loop {
                tokio::select! {
                    biased;
                    Some(sample) = progress_rx.recv() => self.forward(run, &mut tracker, &sample),
                    result = &mut download => break result,
                }
            }
        };
        while let Ok(sample) = progress_rx.try_recv() {
            self.forward(run, &mut tracker, &sample);
        }

        match result {
            Ok(metadata) => self.complete(run, index, &tracker, resolved, metadata),
            Err(e) => self.fail(run, index, &e),
        }
    }

    fn forward(&self, run: &mut BatchRun, tracker: &mut JobProgress, sample: &ProgressSample) {
        if sample.phase == SamplePhase::Finished {
            run.set_state(tracker.index, JobState::Processing);
        }
        let phase = run.job(tracker.index).state;
        let update = tracker.update(sample, phase);
        self.sink.emit(RunEvent::Progress(update));
    }

    fn complete(
        &self,
        run: &mut BatchRun,
        index: usize,
        tracker: &JobProgress,
        resolved: MediaMetadata,
        downloaded: MediaMetadata,
    ) {
        // Prefer what the download reported; fall back to the resolve round-trip
        let title = if downloaded.title.is_empty() || downloaded.title == UNKNOWN_TITLE {
            resolved.title.clone()
        } else {
            downloaded.title.clone()
        };
        let duration = downloaded.duration.or(resolved.duration);
        let resolution = match downloaded.resolution() {
            r if r == NOT_AVAILABLE => resolved.resolution(),
            r => r,
        };
        let bytes = downloaded
            .filesize
            .unwrap_or_else(|| tracker.observed_bytes());
        let elapsed = run.current_job_elapsed();

        run.set_title(index, title.clone());
        run.complete_job(index, bytes);

        if let Some(ref metrics) = self.metrics {
            metrics.record_job_succeeded(bytes, elapsed);
        }

        self.sink.log(
            LogLevel::Success,
            format!(
                "✓ Successfully downloaded: {} in {}",
                title,
                format_duration(elapsed.as_secs())
            ),
        );
        self.sink.log(
            LogLevel::Info,
            format!(
                "  Title: {} | Duration: {} | Resolution: {} | Size: {}",
                title,
                duration
                    .filter(|d| d.is_finite() && *d >= 0.0)
                    .map(|d| format_duration(d as u64))
                    .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                resolution,
                format_bytes(bytes)
            ),
        );

        let job = run.job(index);
        self.sink.emit(RunEvent::JobCompleted {
            index,
            url: job.url.clone(),
            title,
            state: JobState::Done,
            error: None,
        });
    }

    fn fail(&self, run: &mut BatchRun, index: usize, error: &ExtractorError) {
        let message = truncate_error(&error.to_string());
        let job = run.job(index);
        let url = job.url.clone();
        let title = job.title.clone();

        run.fail_job(index, message.clone());
        if let Some(ref metrics) = self.metrics {
            metrics.record_job_failed();
        }

        self.sink.log(
            LogLevel::Error,
            format!("✗ Failed to download {}: {}", url, message),
        );
        self.sink.emit(RunEvent::JobCompleted {
            index,
            url,
            title,
            state: JobState::Failed,
            error: Some(message),
        });
    }

    fn log_summary(&self, summary: &BatchSummary) {
        self.sink.log(LogLevel::Info, "=== Download Summary ===");
        self.sink
            .log(LogLevel::Info, format!("Total: {}", summary.total));
        self.sink
            .log(LogLevel::Success, format!("Successful: {}", summary.successful));
        let failed_level = if summary.failed > 0 {
            LogLevel::Error
        } else {
            LogLevel::Info
        };
        self.sink
            .log(failed_level, format!("Failed: {}", summary.failed));
        if summary.skipped > 0 {
            self.sink
                .log(LogLevel::Warning, format!("Skipped: {}", summary.skipped));
        }
        self.sink.log(
            LogLevel::Info,
            format!(
                "Downloaded {} in {}",
                format_bytes(summary.total_bytes),
                format_duration(summary.elapsed.as_secs())
            ),
        );
    }
}
