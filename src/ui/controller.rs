// Console controller - wires the terminal front end to state management and services
//
// It handles:
// - Resolving the FFmpeg directory (locate or bootstrap)
// - Gating and starting batch runs
// - Folding run events into the StateManager and the progress renderer
// - Ctrl-C -> cooperative cancellation

use crate::metrics::Metrics;
use crate::models::BatchSummary;
use crate::services::bootstrap::{
    BootstrapError, BootstrapOutcome, Bootstrapper, InstallPrompt,
};
use crate::services::extractor::MediaExtractor;
use crate::services::orchestrator::{BatchOrchestrator, RunEvent};
use crate::state::{StateChange, StateManager};
use crate::ui::render::ProgressRenderer;
use anyhow::{anyhow, Context, Result};
use camino::Utf8PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Coordinates one terminal session.
///
/// # Example
/// ```ignore
/// let extractor = Arc::new(YtDlpExtractor::new("yt-dlp"));
/// let controller = ConsoleController::new(state_manager, extractor, metrics);
/// controller.resolve_tool(&bootstrapper, Arc::new(ConsolePrompt::new(PromptMode::Ask))).await;
/// let summary = controller.run_batch(&urls).await?;
/// ```
pub struct ConsoleController {
    state_manager: Arc<StateManager>,
    orchestrator: BatchOrchestrator,
    metrics: Arc<Metrics>,
    renderer: ProgressRenderer,
}

impl ConsoleController {
    pub fn new(
        state_manager: Arc<StateManager>,
        extractor: Arc<dyn MediaExtractor>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::with_renderer(state_manager, extractor, metrics, ProgressRenderer::new())
    }

    pub fn with_renderer(
        state_manager: Arc<StateManager>,
        extractor: Arc<dyn MediaExtractor>,
        metrics: Arc<Metrics>,
        renderer: ProgressRenderer,
    ) -> Self {
        let orchestrator = BatchOrchestrator::new(extractor).with_metrics(Arc::clone(&metrics));
        tracing::debug!("Console controller initialized");
        Self {
            state_manager,
            orchestrator,
            metrics,
            renderer,
        }
    }

    /// Find or install FFmpeg and record the result in state.
    ///
    /// A declined or failed install is not fatal: downloads continue in degraded mode.
    pub async fn resolve_tool(
        &mut self,
        bootstrapper: &Bootstrapper,
        prompt: Arc<dyn InstallPrompt>,
    ) -> Option<Utf8PathBuf> {
        let (mut events, task) = bootstrapper.spawn(prompt);
        while let Some(event) = events.recv().await {
            self.renderer.apply_bootstrap(&event);
        }

        let location = match task.await {
            Ok(Ok(BootstrapOutcome::Resolved(path))) => Some(path),
            Ok(Ok(BootstrapOutcome::Declined)) => {
                self.renderer.println(
                    "[!] FFmpeg not installed; continuing without it (quality may be limited)",
                );
                None
            }
            Ok(Err(e @ BootstrapError::Unsupported { .. })) => {
                self.renderer.println(format!("[!] {}", e));
                None
            }
            Ok(Err(e)) => {
                self.renderer.println(format!("[x] {}", e));
                None
            }
            Err(e) => {
                tracing::error!("Bootstrap task failed: {}", e);
                None
            }
        };

        self.state_manager.set_tool_location(location.clone());
        location
    }

    /// Run one batch over `raw_input` with the settings currently in state.
    ///
    /// Fails if a run is already active or the input is rejected before any job starts.
    pub async fn run_batch(&self, raw_input: &str) -> Result<BatchSummary> {
        if self.state_manager.try_begin_download().is_none() {
            return Err(anyhow!("A download is already in progress"));
        }

        let config = self.state_manager.read(|s| s.download_config());
        tracing::info!(
            "Starting batch: format={}, quality={}, destination={}",
            config.format,
            config.quality,
            config.destination_directory
        );

        let mut run = match self.orchestrator.start(raw_input, config) {
            Ok(run) => run,
            Err(e) => {
                self.state_manager.abort_download();
                return Err(e).context("Failed to start download");
            }
        };

        let canceller = run.canceller();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received - cancelling after the current download");
                canceller.cancel();
            }
        });

        let mut changes = self.state_manager.subscribe();
        let mut summary = None;
        while let Some(event) = run.next_event().await {
            self.state_manager.apply_run_event(&event);
            self.renderer.apply(&event);
            self.drain_changes(&mut changes);
            if let RunEvent::Finished(ref finished) = event {
                summary = Some(finished.clone());
            }
        }
        interrupt.abort();

        match summary {
            Some(summary) => Ok(summary),
            // Channel closed without a summary only if the worker panicked
            None => {
                self.state_manager.abort_download();
                run.wait().await.context("Download worker failed")
            }
        }
    }

    /// Hand every queued state change to the renderer.
    fn drain_changes(&self, changes: &mut broadcast::Receiver<StateChange>) {
        loop {
            match changes.try_recv() {
                Ok(change) => self.renderer.apply_state(&change),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!("Renderer missed {} state changes", missed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
