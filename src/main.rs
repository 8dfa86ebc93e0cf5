//! ytbulk - bulk media downloader built on yt-dlp
//!
//! Main entry point for the terminal application.
//!
//! # Overview
//!
//! This binary crate provides the console front end for ytbulk. It initializes:
//! - Logging infrastructure (daily rotating file, console with `--debug`)
//! - Tokio async runtime (4 worker threads for subprocess and HTTP I/O)
//! - State management ([`StateManager`])
//! - Configuration loading ([`ConfigManager`]) with command-line overrides
//! - Console controller ([`ConsoleController`] - bridges services with the progress bars)
//!
//! # Execution Flow
//!
//! 1. Parse arguments, initialize logging → `<config dir>/logs/ytbulk.<date>`
//! 2. Create tokio runtime with 4 worker threads
//! 3. Load `settings.yaml` (+ `YTBULK_*` environment), apply flags, optionally save
//! 4. Locate FFmpeg, offering to install it when missing
//! 5. Read URLs (arguments, `--input` file, or stdin) and run the batch
//! 6. Shutdown tokio runtime with 5s timeout
//!
//! The exit code is non-zero when any job failed or nothing was downloaded.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::{IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use ytbulk::config::{self, DEFAULT_CONFIG_DIR};
use ytbulk::models::{MediaFormat, QualityTier, UserConfig};
use ytbulk::services::{Bootstrapper, HttpArchiveFetcher, YtDlpExtractor};
use ytbulk::ui::{ConsoleController, ConsolePrompt, PromptMode};
use ytbulk::{APP_NAME, ConfigManager, Metrics, StateManager, VERSION};

const WORKER_THREADS: usize = 4;

/// Download YouTube videos, shorts and playlists in bulk.
#[derive(Parser, Debug)]
#[command(name = "ytbulk", version, about)]
struct Args {
    /// URLs to download (one job each)
    urls: Vec<String>,

    /// Read URLs from a file, one per line (`-` for stdin); `#` starts a comment
    #[arg(short, long, value_name = "FILE")]
    input: Option<Utf8PathBuf>,

    /// Output format: video (mp4) or audio (mp3)
    #[arg(short, long)]
    format: Option<MediaFormat>,

    /// Video quality: best, 1080p, 720p, 480p, 360p, smallest
    #[arg(short, long)]
    quality: Option<QualityTier>,

    /// Destination directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<Utf8PathBuf>,

    /// Download whole playlists instead of the single video
    #[arg(long)]
    playlist: bool,

    /// Maximum playlist entries per URL (0 = no limit); implies --playlist
    #[arg(long, value_name = "N")]
    playlist_limit: Option<u32>,

    /// Directory holding (or receiving) ffmpeg and ffprobe
    #[arg(long, value_name = "DIR")]
    tool_dir: Option<Utf8PathBuf>,

    /// Install FFmpeg without asking when it is missing
    #[arg(short = 'y', long, conflicts_with = "no_ffmpeg")]
    yes: bool,

    /// Never install FFmpeg; download what works without it
    #[arg(long)]
    no_ffmpeg: bool,

    /// yt-dlp executable
    #[arg(long, value_name = "PATH")]
    ytdlp: Option<String>,

    /// Configuration directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CONFIG_DIR)]
    config_dir: Utf8PathBuf,

    /// Persist the effective settings to settings.yaml
    #[arg(long)]
    save_settings: bool,

    /// Debug logging, also echoed to the console
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn prompt_mode(&self) -> PromptMode {
        if self.yes {
            PromptMode::AlwaysInstall
        } else if self.no_ffmpeg {
            PromptMode::NeverInstall
        } else {
            PromptMode::Ask
        }
    }

    /// Layer command-line flags over the loaded settings.
    fn apply_overrides(&self, config: &mut UserConfig) {
        let downloader = &mut config.downloader;
        if let Some(format) = self.format {
            downloader.format = format;
        }
        if let Some(quality) = self.quality {
            downloader.quality = quality;
        }
        if let Some(ref output) = self.output {
            downloader.download_dir = output.to_string();
        }
        if self.playlist {
            downloader.playlist_mode = true;
        }
        if let Some(limit) = self.playlist_limit {
            downloader.playlist_mode = true;
            downloader.playlist_limit = limit;
        }
        if let Some(ref ytdlp) = self.ytdlp {
            downloader.ytdlp_path = ytdlp.clone();
        }
        if self.debug {
            downloader.debug_mode = true;
        }
        if let Some(ref tool_dir) = self.tool_dir {
            config.bootstrap.tool_dir = tool_dir.to_string();
        }
    }

    /// Raw input text: positional URLs first, then the input file or piped stdin.
    fn read_input(&self) -> Result<String> {
        let mut text = self.urls.join("\n");

        let extra = match self.input.as_deref() {
            Some(path) if path.as_str() == "-" => Some(read_stdin()?),
            Some(path) => Some(
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read URL file: {}", path))?,
            ),
            None if self.urls.is_empty() && !std::io::stdin().is_terminal() => Some(read_stdin()?),
            None => None,
        };

        if let Some(extra) = extra {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&extra);
        }

        if text.trim().is_empty() {
            bail!("No URLs given. Pass them as arguments, with --input, or on stdin.");
        }
        Ok(text)
    }
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read URLs from stdin")?;
    Ok(text)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(&args.config_dir)?;
    let mut user_config = config_manager.load_user_config()?;
    args.apply_overrides(&mut user_config);

    let debug = user_config.downloader.debug_mode;
    let _log_guard = ytbulk::logging::setup_logging_with_console(
        &config_manager.config_dir().join("logs"),
        "ytbulk",
        debug,
        args.debug,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if args.save_settings {
        config_manager.save_user_config(&user_config)?;
    }

    let raw_input = args.read_input()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("ytbulk-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let metrics = Arc::new(Metrics::new());
    let state_manager = Arc::new(StateManager::new());
    state_manager.load_from_user_config(&user_config, config::resolve_download_dir(&user_config));

    let fetcher = HttpArchiveFetcher::new(Duration::from_secs(user_config.bootstrap.timeout_secs))
        .context("Failed to build HTTP client")?;
    let bootstrapper = Bootstrapper::new(
        config::resolve_tool_dir(&user_config),
        user_config.bootstrap.archive_url.clone(),
        Arc::new(fetcher),
    )
    .with_search_dirs(
        std::env::var_os("PATH")
            .map(|path| std::env::split_paths(&path).collect::<Vec<_>>())
            .unwrap_or_default(),
    )
    .with_metrics(Arc::clone(&metrics));

    let extractor = YtDlpExtractor::new(user_config.downloader.ytdlp_path.as_str());
    let mut controller = ConsoleController::new(
        Arc::clone(&state_manager),
        Arc::new(extractor),
        Arc::clone(&metrics),
    );

    let result = runtime.block_on(async {
        let prompt = Arc::new(ConsolePrompt::new(args.prompt_mode()));
        controller.resolve_tool(&bootstrapper, prompt).await;
        controller.run_batch(&raw_input).await
    });

    controller.metrics().log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Application shutdown complete");

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if summary.failed > 0 || summary.successful == 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
