use regex::Regex;

/// Result of filtering raw input lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Accepted URLs, trimmed, in input order (duplicates kept)
    pub accepted: Vec<String>,
    /// Non-empty, non-comment lines that did not match
    pub rejected: Vec<String>,
}

/// Validates raw user input lines against the accepted video URL shapes.
///
/// Accepts `youtube.com/watch?...v=<id>`, `youtube.com/shorts/<id>`,
/// `youtube.com/playlist?...list=<id>` (on the `www.`, `m.` and `music.` hosts)
/// and `youtu.be/<id>`, with or without a scheme.
pub struct UrlFilter {
    pattern: Regex,
}

impl UrlFilter {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(
                r"^(?i:https?://)?(?i:(?:www|m|music)\.)?(?:(?i:youtube\.com)/(?:watch\?(?:[^#\s]*&)?v=|shorts/|playlist\?(?:[^#\s]*&)?list=)|(?i:youtu\.be)/)[A-Za-z0-9_-]+",
            )
            .expect("Invalid URL regex"),
        }
    }

    /// Check a single, already trimmed line.
    pub fn is_valid(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    /// Split `lines` into accepted and rejected URLs.
    ///
    /// Lines are trimmed; empty lines and lines starting with `#` are dropped silently.
    pub fn filter<'a, I>(&self, lines: I) -> FilterOutcome
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut outcome = FilterOutcome::default();

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if self.is_valid(line) {
                outcome.accepted.push(line.to_string());
            } else {
                tracing::warn!("Invalid URL skipped: {}", line);
                outcome.rejected.push(line.to_string());
            }
        }

        outcome
    }

    /// Filter a multi-line block of text.
    pub fn filter_text(&self, text: &str) -> FilterOutcome {
        self.filter(text.lines())
    }
}

impl Default for UrlFilter {
    fn default() -> Self {
        Self::new()
    }
}
