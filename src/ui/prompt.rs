// Install confirmation for the FFmpeg bootstrap.

use crate::services::bootstrap::InstallPrompt;
use camino::Utf8Path;
use std::io::{self, BufRead, Write};

/// How the console answers the install question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Ask on stdin
    Ask,
    /// `--yes`
    AlwaysInstall,
    /// `--no-ffmpeg`
    NeverInstall,
}

/// `y`/`yes` (any case) is consent; everything else, including EOF, is a refusal.
pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

pub struct ConsolePrompt {
    mode: PromptMode,
}

impl ConsolePrompt {
    pub fn new(mode: PromptMode) -> Self {
        Self { mode }
    }

    fn ask(&self, target_dir: &Utf8Path) -> io::Result<bool> {
        let mut stderr = io::stderr();
        writeln!(
            stderr,
            "FFmpeg was not found. It is needed to merge high-quality video and convert audio to MP3."
        )?;
        write!(
            stderr,
            "Download it now (about 80 MB) into {}? [y/N] ",
            target_dir
        )?;
        stderr.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_answer(&answer))
    }
}

impl InstallPrompt for ConsolePrompt {
    fn confirm_install(&self, target_dir: &Utf8Path) -> bool {
        match self.mode {
            PromptMode::AlwaysInstall => true,
            PromptMode::NeverInstall => false,
            PromptMode::Ask => self.ask(target_dir).unwrap_or_else(|e| {
                tracing::warn!("Could not read install answer: {}", e);
                false
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_answer() {
        assert!(parse_answer("y\n"));
        assert!(parse_answer("  YES "));
        assert!(!parse_answer("n"));
        assert!(!parse_answer(""));
        assert!(!parse_answer("yep"));
    }

    #[test]
    fn test_fixed_modes_never_read_stdin() {
        let dir = Utf8Path::new("/tmp/ffmpeg");
        assert!(ConsolePrompt::new(PromptMode::AlwaysInstall).confirm_install(dir));
        assert!(!ConsolePrompt::new(PromptMode::NeverInstall).confirm_install(dir));
    }
}
