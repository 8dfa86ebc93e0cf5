use crate::models::{MediaFormat, QualityTier};

/// Single pre-muxed stream; the only thing that works without ffmpeg.
pub const PREMUXED_DIRECTIVE: &str = "b";

/// Best audio stream, falling back to the best overall stream.
pub const AUDIO_DIRECTIVE: &str = "bestaudio/best";

/// Container for merged video+audio output.
pub const MERGE_CONTAINER: &str = "mp4";

/// Codec and bitrate used when transcoding audio.
pub const AUDIO_CODEC: &str = "mp3";
pub const AUDIO_BITRATE_KBPS: u32 = 320;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOptions {
    pub format_directive: String,
    /// Set only when separate streams are merged (ffmpeg available)
    pub merge_container: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTranscode {
    pub codec: String,
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioOptions {
    pub format_directive: String,
    /// Set only when ffmpeg is available to convert
    pub transcode: Option<AudioTranscode>,
}

/// Format-specific extractor options, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOptions {
    Video(VideoOptions),
    Audio(AudioOptions),
}

impl FormatOptions {
    pub fn format_directive(&self) -> &str {
        match self {
            FormatOptions::Video(video) => &video.format_directive,
            FormatOptions::Audio(audio) => &audio.format_directive,
        }
    }
}

/// Outcome of directive resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDirective {
    pub format: FormatOptions,
    /// What will be downloaded, for the run log
    pub description: String,
    /// Set when the missing tool forces a downgrade
    pub degradation: Option<String>,
}

/// Resolve the format directive for a run.
///
/// With the tool missing this downgrades instead of failing: video falls back to a single
/// pre-muxed stream, audio skips transcoding.
pub fn resolve_directive(
    format: MediaFormat,
    quality: QualityTier,
    tool_present: bool,
) -> ResolvedDirective {
    match format {
        MediaFormat::Audio => resolve_audio(tool_present),
        MediaFormat::Video => resolve_video(quality, tool_present),
    }
}

fn resolve_audio(tool_present: bool) -> ResolvedDirective {
    if tool_present {
        ResolvedDirective {
            format: FormatOptions::Audio(AudioOptions {
                format_directive: AUDIO_DIRECTIVE.to_string(),
                transcode: Some(AudioTranscode {
                    codec: AUDIO_CODEC.to_string(),
                    bitrate_kbps: AUDIO_BITRATE_KBPS,
                }),
            }),
            description: format!(
                "Downloading: best audio, converted to {} {}kbps",
                AUDIO_CODEC.to_uppercase(),
                AUDIO_BITRATE_KBPS
            ),
            degradation: None,
        }
    } else {
        ResolvedDirective {
            format: FormatOptions::Audio(AudioOptions {
                format_directive: AUDIO_DIRECTIVE.to_string(),
                transcode: None,
            }),
            description: "Downloading: best audio in its original container".to_string(),
            degradation: Some(
                "WARNING: FFmpeg not found. MP3 conversion will likely fail; audio is saved unconverted."
                    .to_string(),
            ),
        }
    }
}

fn resolve_video(quality: QualityTier, tool_present: bool) -> ResolvedDirective {
    if !tool_present {
        let degradation = match quality.max_height() {
            Some(height) => format!(
                "No FFmpeg - downloading pre-merged format, {}p cap ignored (quality may be limited)",
                height
            ),
            None => {
                "No FFmpeg - downloading pre-merged format (quality may be limited)".to_string()
            }
        };
        return ResolvedDirective {
            format: FormatOptions::Video(VideoOptions {
                format_directive: PREMUXED_DIRECTIVE.to_string(),
                merge_container: None,
            }),
            description: "Downloading: best single pre-muxed stream".to_string(),
            degradation: Some(degradation),
        };
    }

    let (directive, description) = match quality {
        QualityTier::Best => (
            "bv*+ba/b".to_string(),
            "Downloading: BEST quality available".to_string(),
        ),
        QualityTier::Smallest => (
            "wv*+wa/w".to_string(),
            "Downloading: Smallest file size".to_string(),
        ),
        tier => {
            // Fixed-resolution tiers always carry a height
            let height = tier.max_height().unwrap_or(1080);
            (
                format!("bv*[height<={h}]+ba/b[height<={h}]/b", h = height),
                format!("Downloading: Up to {} ({})", tier, tier.description()),
            )
        }
    };

    ResolvedDirective {
        format: FormatOptions::Video(VideoOptions {
            format_directive: directive,
            merge_container: Some(MERGE_CONTAINER.to_string()),
        }),
        description,
        degradation: None,
    }
}
