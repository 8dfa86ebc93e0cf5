use crate::models::job::UNKNOWN_TITLE;
use crate::services::directive::FormatOptions;
use crate::services::extractor::{
    ExtractorError, ExtractorOptions, MediaExtractor, MediaMetadata, ProgressSample, SamplePhase,
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Prefix of the machine-readable progress lines requested from yt-dlp.
const PROGRESS_MARKER: &str = "[ytbulk-progress]";

/// Prefix of the metadata line printed after the file is moved into place.
const METADATA_MARKER: &str = "[ytbulk-meta]";

/// How many stderr lines are kept for error reporting.
const STDERR_TAIL: usize = 20;

/// Extractor backed by the `yt-dlp` executable.
///
/// Every call spawns one yt-dlp process. Progress is requested through
/// `--progress-template` in a `|`-separated form and parsed with `progress_pattern`;
/// final metadata comes from an `after_move` print in JSON.
pub struct YtDlpExtractor {
    program: Utf8PathBuf,

    /// Matches `[ytbulk-progress] status|downloaded|total|estimate|speed|eta`
    progress_pattern: Regex,
}

/// Subset of yt-dlp's info dict we care about.
#[derive(Debug, Deserialize)]
struct InfoDict {
    title: Option<String>,
    duration: Option<f64>,
    width: Option<u32>,
    height: Option<u32>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
}

impl From<InfoDict> for MediaMetadata {
    fn from(info: InfoDict) -> Self {
        MediaMetadata {
            title: info.title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            duration: info.duration,
            width: info.width,
            height: info.height,
            filesize: info
                .filesize
                .or(info.filesize_approx.map(|approx| approx.max(0.0) as u64)),
        }
    }
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            progress_pattern: Regex::new(
                r"^\[ytbulk-progress\]\s*(\w+)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\s*$",
            )
            .expect("Invalid progress regex"),
        }
    }

    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Arguments shared by metadata and download invocations.
    fn common_args(options: &ExtractorOptions) -> Vec<String> {
        let mut args = vec![
            "--no-check-certificates".to_string(),
            "--geo-bypass".to_string(),
            "--no-warnings".to_string(),
        ];

        match options.playlist {
            Some(playlist) => {
                args.push("--yes-playlist".to_string());
                if playlist.limit > 0 {
                    args.push("--playlist-items".to_string());
                    args.push(format!("1:{}", playlist.limit));
                }
            }
            None => args.push("--no-playlist".to_string()),
        }

        if let Some(ref location) = options.tool_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.to_string());
        }

        args
    }

    /// Build the argument list for a metadata-only lookup.
    pub fn build_resolve_args(&self, url: &str, options: &ExtractorOptions) -> Vec<String> {
        let mut args = vec!["--dump-single-json".to_string(), "--skip-download".to_string()];
        if options.playlist.is_some() {
            args.push("--flat-playlist".to_string());
        }
        args.extend(Self::common_args(options));
        args.push("-f".to_string());
        args.push(options.format.format_directive().to_string());
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Build the argument list for a download.
    pub fn build_download_args(&self, url: &str, options: &ExtractorOptions) -> Vec<String> {
        let mut args = vec![
            "--newline".to_string(),
            "--progress".to_string(),
            "--no-simulate".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s",
                PROGRESS_MARKER
            ),
            "--print".to_string(),
            format!(
                "after_move:{} %(.{{title,duration,width,height,filesize,filesize_approx}})j",
                METADATA_MARKER
            ),
            "-o".to_string(),
            options.output_template.clone(),
        ];
        args.extend(Self::common_args(options));

        args.push("-f".to_string());
        args.push(options.format.format_directive().to_string());

        match &options.format {
            FormatOptions::Video(video) => {
                if let Some(ref container) = video.merge_container {
                    args.push("--merge-output-format".to_string());
                    args.push(container.clone());
                }
            }
            FormatOptions::Audio(audio) => {
                if let Some(ref transcode) = audio.transcode {
                    args.push("--extract-audio".to_string());
                    args.push("--audio-format".to_string());
                    args.push(transcode.codec.clone());
                    args.push("--audio-quality".to_string());
                    args.push(format!("{}K", transcode.bitrate_kbps));
                }
            }
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Parse one progress line produced by the template above.
    pub fn parse_progress_line(&self, line: &str) -> Option<ProgressSample> {
        parse_progress(&self.progress_pattern, line)
    }

    /// Parse the `after_move` metadata line.
    pub fn parse_metadata_line(line: &str) -> Option<MediaMetadata> {
        let json = line.trim().strip_prefix(METADATA_MARKER)?;
        Self::parse_metadata_json(json.trim()).ok()
    }

    /// Parse an info dict as printed by `--dump-single-json`.
    pub fn parse_metadata_json(json: &str) -> Result<MediaMetadata, ExtractorError> {
        let info: InfoDict = serde_json::from_str(json)
            .map_err(|e| ExtractorError::Output(format!("invalid metadata JSON: {}", e)))?;
        Ok(info.into())
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(self.program.as_std_path());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

fn parse_optional_f64(field: &str) -> Option<f64> {
    match field.trim() {
        "" | "NA" | "None" | "null" => None,
        value => value.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn parse_progress(pattern: &Regex, line: &str) -> Option<ProgressSample> {
    let caps = pattern.captures(line.trim())?;

    let downloaded = parse_optional_f64(&caps[2]).unwrap_or(0.0).max(0.0) as u64;
    let total = parse_optional_f64(&caps[3]).map(|v| v.max(0.0) as u64);
    let estimate = parse_optional_f64(&caps[4]).map(|v| v.max(0.0) as u64);
    let speed = parse_optional_f64(&caps[5]);
    let eta = parse_optional_f64(&caps[6]).map(|v| v as i64);

    let sample = match &caps[1] {
        "downloading" => ProgressSample {
            downloaded_bytes: downloaded,
            total_bytes: total,
            total_bytes_estimate: estimate,
            speed,
            eta,
            phase: SamplePhase::Downloading,
        },
        // One stream finished; the job as a whole only finishes when the process exits
        "finished" => ProgressSample {
            downloaded_bytes: downloaded,
            total_bytes: Some(total.unwrap_or(downloaded).max(downloaded)),
            total_bytes_estimate: estimate,
            speed,
            eta: Some(0),
            phase: SamplePhase::Downloading,
        },
        "error" => ProgressSample {
            downloaded_bytes: downloaded,
            total_bytes: total,
            total_bytes_estimate: estimate,
            speed: None,
            eta: None,
            phase: SamplePhase::Error,
        },
        _ => return None,
    };

    Some(sample)
}

/// Next line of `reader` with invalid UTF-8 replaced, or `None` at the end of the stream.
async fn next_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Option<String> {
    buf.clear();
    match reader.read_until(b'\n', buf).await {
        Ok(0) => None,
        Ok(_) => Some(
            String::from_utf8_lossy(buf.as_slice())
                .trim_end_matches(['\r', '\n'])
                .to_string(),
        ),
        Err(e) => {
            tracing::debug!("Stopped reading yt-dlp output: {}", e);
            None
        }
    }
}

/// Pick the most useful line of stderr for a failure message.
fn failure_message(stderr_tail: &[String]) -> String {
    stderr_tail
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr_tail.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn resolve(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<MediaMetadata, ExtractorError> {
        let args = self.build_resolve_args(url, options);
        tracing::debug!("Resolving metadata: {} {}", self.program, args.join(" "));

        let output = self.command(&args).output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<String> = stderr.lines().map(str::to_string).collect();
            return Err(ExtractorError::Exited {
                code: output.status.code().unwrap_or(-1),
                message: failure_message(&tail),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_metadata_json(stdout.trim())
    }

    async fn download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        progress: mpsc::UnboundedSender<ProgressSample>,
    ) -> Result<MediaMetadata, ExtractorError> {
        let args = self.build_download_args(url, options);
        tracing::info!("Executing: {} {}", self.program, args.join(" "));

        let mut child = self.command(&args).spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractorError::Output("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractorError::Output("stderr not captured".to_string()))?;

        let stdout_pattern = self.progress_pattern.clone();
        let stdout_tx = progress.clone();
        let stdout_reader = tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut metadata = None;
            let mut last_bytes = 0u64;
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                if let Some(sample) = parse_progress(&stdout_pattern, &line) {
                    last_bytes = last_bytes.max(sample.downloaded_bytes);
                    let _ = stdout_tx.send(sample);
                } else if let Some(meta) = YtDlpExtractor::parse_metadata_line(&line) {
                    metadata = Some(meta);
                } else {
                    tracing::trace!("[yt-dlp] {}", line);
                }
            }
            (metadata, last_bytes)
        });

        // In quiet mode yt-dlp may route progress to stderr
        let stderr_pattern = self.progress_pattern.clone();
        let stderr_tx = progress.clone();
        let stderr_reader = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
            let mut last_bytes = 0u64;
            while let Some(line) = next_line_lossy(&mut reader, &mut buf).await {
                if let Some(sample) = parse_progress(&stderr_pattern, &line) {
                    last_bytes = last_bytes.max(sample.downloaded_bytes);
                    let _ = stderr_tx.send(sample);
                    continue;
                }
                tracing::debug!("[yt-dlp] {}", line);
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            (tail, last_bytes)
        });

        let status = child.wait().await?;

        let (metadata, stdout_bytes) = stdout_reader.await.unwrap_or_default();
        let (tail, stderr_bytes) = stderr_reader.await.unwrap_or_default();
        let last_bytes = stdout_bytes.max(stderr_bytes);

        if !status.success() {
            let _ = progress.send(ProgressSample {
                phase: SamplePhase::Error,
                ..ProgressSample::downloading(last_bytes, None)
            });
            return Err(ExtractorError::Exited {
                code: status.code().unwrap_or(-1),
                message: failure_message(&Vec::from(tail)),
            });
        }

        let metadata = metadata.unwrap_or_else(|| MediaMetadata {
            title: UNKNOWN_TITLE.to_string(),
            ..Default::default()
        });
        let final_bytes = metadata.filesize.unwrap_or(last_bytes);
        let _ = progress.send(ProgressSample::finished(final_bytes));

        Ok(metadata)
    }
}
