use crate::models::UserConfig;
use crate::services::bootstrap;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Default configuration directory, relative to the working directory.
pub const DEFAULT_CONFIG_DIR: &str = "ytbulk-data";

/// File name of the persisted settings.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Prefix of environment overrides, e.g. `YTBULK_DOWNLOADER__FORMAT=audio`.
pub const ENV_PREFIX: &str = "YTBULK";

/// Loads and saves `settings.yaml`.
///
/// Loading layers the YAML file under `YTBULK_*` environment variables; saving writes only
/// the YAML file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the settings file with environment overrides applied.
    ///
    /// A missing file yields the defaults (still overridable from the environment).
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let config: UserConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(config)
    }

    /// Load the settings file alone, without environment overrides.
    pub fn load_file_config(&self) -> Result<UserConfig> {
        if !self.settings_path.exists() {
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))
    }

    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

/// Where downloads go: the configured directory, else `~/Downloads`, else `./downloads`.
pub fn resolve_download_dir(config: &UserConfig) -> Utf8PathBuf {
    let configured = config.downloader.download_dir.trim();
    if !configured.is_empty() {
        return Utf8PathBuf::from(configured);
    }

    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(|home| Utf8PathBuf::from(home).join("Downloads"))
        .unwrap_or_else(|_| Utf8PathBuf::from("downloads"))
}

/// Where the ffmpeg executables live: the configured directory or `<install dir>/ffmpeg`.
pub fn resolve_tool_dir(config: &UserConfig) -> Utf8PathBuf {
    let configured = config.bootstrap.tool_dir.trim();
    if configured.is_empty() {
        bootstrap::default_target_dir()
    } else {
        Utf8PathBuf::from(configured)
    }
}
