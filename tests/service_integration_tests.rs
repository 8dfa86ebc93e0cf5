//! Integration tests for the stateless services and the yt-dlp process boundary
//!
//! These tests verify:
//! - URL filtering keeps input order and never accepts arbitrary hosts
//! - Progress aggregation stays within bounds for any sample
//! - Directive resolution downgrades instead of failing without FFmpeg
//! - The yt-dlp extractor against a scripted stand-in executable

use proptest::prelude::*;
use ytbulk::models::{MediaFormat, QualityTier};
use ytbulk::services::directive::PREMUXED_DIRECTIVE;
use ytbulk::services::progress::{self, CALCULATING, NOT_AVAILABLE};
use ytbulk::services::{FormatOptions, ProgressSample, SamplePhase, UrlFilter, resolve_directive};

fn video_id() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{11}"
}

fn youtube_url() -> impl Strategy<Value = String> {
    prop_oneof![
        video_id().prop_map(|id| format!("https://www.youtube.com/watch?v={}", id)),
        video_id().prop_map(|id| format!("https://youtu.be/{}", id)),
        video_id().prop_map(|id| format!("youtube.com/shorts/{}", id)),
        video_id().prop_map(|id| format!("https://m.youtube.com/watch?feature=share&v={}", id)),
        video_id().prop_map(|id| format!("https://www.youtube.com/playlist?list=PL{}", id)),
    ]
}

proptest! {
    #[test]
    fn prop_filter_preserves_order(urls in proptest::collection::vec(youtube_url(), 0..12)) {
        let filter = UrlFilter::new();
        let text = urls
            .iter()
            .map(|u| format!("  {}\t", u))
            .collect::<Vec<_>>()
            .join("\n\n");

        let outcome = filter.filter_text(&text);
        prop_assert_eq!(outcome.accepted, urls);
        prop_assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn prop_filter_rejects_other_hosts(path in "[a-z0-9/]{1,20}") {
        let filter = UrlFilter::new();
        let line = format!("https://example.com/{}", path);
        prop_assert!(!filter.is_valid(&line));
    }

    #[test]
    fn prop_percentages_are_bounded(
        downloaded in any::<u64>(),
        total in proptest::option::of(any::<u64>()),
        index in 0usize..50,
        extra in 1usize..50,
    ) {
        let sample = ProgressSample::downloading(downloaded, total);
        let normalized = progress::aggregate(index, index + extra, &sample);

        prop_assert!((0.0..=100.0).contains(&normalized.file_percent));
        prop_assert!((0.0..=100.0).contains(&normalized.overall_percent));
    }

    #[test]
    fn prop_overall_grows_with_file_percent(
        index in 0usize..20,
        extra in 1usize..20,
        a in 0.0f64..=100.0,
        b in 0.0f64..=100.0,
    ) {
        let total = index + extra;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let low = progress::overall_percent(index, total, lo);
        let high = progress::overall_percent(index, total, hi);
        prop_assert!(low <= high);
    }
}

#[test]
fn test_comment_and_blank_lines_are_silent() {
    let filter = UrlFilter::new();
    let outcome = filter.filter_text("# my list\n\n   \nhttps://youtu.be/dQw4w9WgXcQ\nfoo\n");

    assert_eq!(outcome.accepted, vec!["https://youtu.be/dQw4w9WgXcQ"]);
    assert_eq!(outcome.rejected, vec!["foo"]);
}

#[test]
fn test_placeholders_follow_phase() {
    let in_flight = progress::aggregate(0, 1, &ProgressSample::downloading(10, None));
    assert_eq!(in_flight.total_size, NOT_AVAILABLE);
    assert_eq!(in_flight.speed, CALCULATING);
    assert_eq!(in_flight.eta, CALCULATING);

    let finished = progress::aggregate(0, 1, &ProgressSample::finished(2048));
    assert_eq!(finished.file_percent, 100.0);
    assert_eq!(finished.overall_percent, 100.0);
    assert_eq!(finished.total_size, "2.00 KB");
    assert_eq!(finished.speed, NOT_AVAILABLE);
}

#[test]
fn test_every_tier_downgrades_without_tool() {
    for quality in QualityTier::ALL {
        let resolved = resolve_directive(MediaFormat::Video, quality, false);
        assert_eq!(resolved.format.format_directive(), PREMUXED_DIRECTIVE);
        assert!(resolved.degradation.is_some(), "{} should warn", quality);

        let with_tool = resolve_directive(MediaFormat::Video, quality, true);
        assert!(with_tool.degradation.is_none());
        match with_tool.format {
            FormatOptions::Video(video) => {
                assert_eq!(video.merge_container.as_deref(), Some("mp4"))
            }
            other => panic!("Expected video options, got: {:?}", other),
        }
    }
}

#[test]
fn test_audio_ignores_quality() {
    let a = resolve_directive(MediaFormat::Audio, QualityTier::Best, true);
    let b = resolve_directive(MediaFormat::Audio, QualityTier::P360, true);
    assert_eq!(a, b);
}

#[cfg(unix)]
mod ytdlp_process {
    use super::*;
    use camino::Utf8PathBuf;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use ytbulk::services::{ExtractorError, ExtractorOptions, MediaExtractor, YtDlpExtractor};

    const WORKING_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" = "--dump-single-json" ]; then
  echo '{"title": "Scripted clip", "duration": 12.5, "width": 640, "height": 360, "filesize_approx": 3000.7}'
  exit 0
fi
printf '[info] caf\351 in a legacy code page\n'
printf 'WARNING: caf\351 title\n' >&2
echo '[ytbulk-progress] downloading|1000|4000|NA|500.0|6'
echo '[ytbulk-progress] downloading|2000|4000|NA|NA|NA'
echo 'some unrelated chatter'
echo '[ytbulk-progress] finished|4000|4000|NA|NA|NA'
echo '[ytbulk-meta] {"title": "Scripted clip", "duration": 12.5, "width": 640, "height": 360, "filesize": 4000, "filesize_approx": null}'
exit 0
"#;

    const FAILING_SCRIPT: &str = r#"#!/bin/sh
echo '[ytbulk-progress] downloading|100|4000|NA|NA|NA'
echo 'WARNING: something odd' >&2
echo 'ERROR: [youtube] abc: Private video' >&2
echo 'trailing noise' >&2
exit 1
"#;

    fn install_script(dir: &TempDir, name: &str, body: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::try_from(dir.path().join(name)).unwrap();
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn options() -> ExtractorOptions {
        ExtractorOptions {
            output_template: "/tmp/%(title)s.%(ext)s".to_string(),
            format: resolve_directive(MediaFormat::Video, QualityTier::Best, false).format,
            tool_location: None,
            playlist: None,
        }
    }

    // One test drives every process so no other thread forks while a script is open
    #[tokio::test]
    async fn test_scripted_ytdlp() {
        let dir = TempDir::new().unwrap();
        let working = install_script(&dir, "yt-dlp-ok", WORKING_SCRIPT);
        let failing = install_script(&dir, "yt-dlp-fail", FAILING_SCRIPT);

        let extractor = YtDlpExtractor::new(working);
        let metadata =
            tokio_test::assert_ok!(extractor.resolve("https://youtu.be/abc", &options()).await);
        assert_eq!(metadata.title, "Scripted clip");
        assert_eq!(metadata.resolution(), "640x360");
        assert_eq!(metadata.filesize, Some(3000));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let metadata = tokio_test::assert_ok!(
            extractor
                .download("https://youtu.be/abc", &options(), tx)
                .await
        );
        // Lines after the invalid UTF-8 are still read
        assert_eq!(metadata.title, "Scripted clip");
        assert_eq!(metadata.filesize, Some(4000));

        let mut samples = Vec::new();
        while let Some(sample) = rx.recv().await {
            samples.push(sample);
        }
        assert!(samples.len() >= 4);
        assert_eq!(samples[0].speed, Some(500.0));
        assert_eq!(samples[0].eta, Some(6));
        assert_eq!(samples[1].speed, None);
        let last = samples.last().unwrap();
        assert_eq!(last.phase, SamplePhase::Finished);
        assert_eq!(last.downloaded_bytes, 4000);

        let extractor = YtDlpExtractor::new(failing);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = tokio_test::assert_err!(
            extractor
                .download("https://youtu.be/abc", &options(), tx)
                .await
        );
        match err {
            ExtractorError::Exited { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "[youtube] abc: Private video");
            }
            other => panic!("Expected Exited, got: {:?}", other),
        }

        let mut last = None;
        while let Some(sample) = rx.recv().await {
            last = Some(sample);
        }
        assert_eq!(last.map(|s| s.phase), Some(SamplePhase::Error));

        let missing = YtDlpExtractor::new(dir.path().join("does-not-exist").to_str().unwrap());
        let err = missing.resolve("https://youtu.be/abc", &options()).await.unwrap_err();
        assert!(matches!(err, ExtractorError::Launch(_)));
    }
}
