//! Progress aggregation: raw per-job byte samples to normalized percentages and
//! display strings. Everything here is pure.

use crate::services::extractor::{ProgressSample, SamplePhase};

/// Placeholder for a value that will never become known.
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder for a value that is not known yet but should be soon.
pub const CALCULATING: &str = "Calculating...";

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Normalized view of one progress sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProgress {
    /// 0..=100 for the current file
    pub file_percent: f64,
    /// 0..=100 across the whole batch
    pub overall_percent: f64,
    pub downloaded: String,
    pub total_size: String,
    pub speed: String,
    pub eta: String,
}

/// Percentage of the current file, clamped to `0..=100`.
///
/// A `Finished` sample is always 100, whatever the byte counts say.
pub fn file_percent(sample: &ProgressSample) -> f64 {
    if sample.phase == SamplePhase::Finished {
        return 100.0;
    }

    let total = sample.total_or_estimate();
    if total == 0 {
        return 0.0;
    }

    (100.0 * sample.downloaded_bytes as f64 / total as f64).clamp(0.0, 100.0)
}

/// Percentage across the batch given the 0-based file index and the file's own percentage.
pub fn overall_percent(current_index: usize, total_files: usize, file_percent: f64) -> f64 {
    if total_files == 0 {
        return file_percent;
    }
    let done = current_index as f64 + file_percent / 100.0;
    (100.0 * done / total_files as f64).clamp(0.0, 100.0)
}

/// Translate one raw sample into normalized percentages and formatted strings.
pub fn aggregate(
    current_index: usize,
    total_files: usize,
    sample: &ProgressSample,
) -> NormalizedProgress {
    let file = file_percent(sample);
    let total = sample.total_or_estimate();
    let in_flight = sample.phase == SamplePhase::Downloading;

    NormalizedProgress {
        file_percent: file,
        overall_percent: overall_percent(current_index, total_files, file),
        downloaded: format_bytes(sample.downloaded_bytes),
        total_size: if total > 0 {
            format_bytes(total)
        } else {
            NOT_AVAILABLE.to_string()
        },
        speed: format_speed(sample.speed, in_flight),
        eta: format_eta(sample.eta, in_flight),
    }
}

/// Render a byte count in the largest unit keeping the value below 1024.
///
/// `1023 -> "1023.00 B"`, `1024 -> "1.00 KB"`, `1048576 -> "1.00 MB"`.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, BYTE_UNITS[unit])
}

/// `45 -> "45s"`, `125 -> "2m 5s"`, `3725 -> "1h 2m 5s"`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if seconds < 60 {
        format!("{}s", secs)
    } else if seconds < 3600 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}h {}m {}s", hours, minutes, secs)
    }
}

/// Speed as `"<bytes>/s"`; unknown while in flight is transient, afterwards permanent.
pub fn format_speed(speed: Option<f64>, in_flight: bool) -> String {
    match speed {
        Some(bps) if bps.is_finite() && bps >= 0.0 => format!("{}/s", format_bytes(bps as u64)),
        _ if in_flight => CALCULATING.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Remaining time; negative values are never meaningful.
pub fn format_eta(eta: Option<i64>, in_flight: bool) -> String {
    match eta {
        Some(secs) if secs >= 0 => format_duration(secs as u64),
        Some(_) => NOT_AVAILABLE.to_string(),
        None if in_flight => CALCULATING.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}
