//! Data models for ytbulk.
//!
//! - [`AppState`]: What the front end shows, rebuilt from the run event stream
//! - [`DownloadConfig`]: Immutable per-batch input to the orchestrator
//! - [`UserConfig`]: Persisted settings loaded from `settings.yaml`
//! - [`BatchRun`] / [`Job`]: Working state of one run, owned by the orchestrator's worker
//!
//! # Architecture Note
//!
//! Config structs derive `Serialize`/`Deserialize` for YAML persistence. `AppState` is
//! wrapped in `Arc<RwLock<>>` by [`StateManager`](crate::state::StateManager); `BatchRun`
//! is never shared.

pub mod app_state;
pub mod config;
pub mod job;

pub use app_state::{AppState, MAX_LOG_LINES};
pub use config::{
    BootstrapSettings, DownloadConfig, DownloaderSettings, MediaFormat, PlaylistOptions,
    QualityTier, UserConfig,
};
pub use job::{BatchRun, BatchSummary, Job, JobState, UNKNOWN_TITLE};
