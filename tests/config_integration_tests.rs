//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Configuration loading and saving
//! - Default configuration generation
//! - Environment overrides layered over the file
//! - Integration with StateManager

use camino::Utf8PathBuf;
use std::fs;
use tempfile::TempDir;
use ytbulk::config::{SETTINGS_FILE, resolve_download_dir};
use ytbulk::models::{MediaFormat, QualityTier, UserConfig};
use ytbulk::{ConfigManager, StateManager};

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.settings_path(), config_path.join(SETTINGS_FILE));
}

#[test]
fn test_load_default_user_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    // Settings file doesn't exist, should return defaults
    let user_config = manager.load_file_config().unwrap();

    assert_eq!(user_config.downloader.format, MediaFormat::Video);
    assert_eq!(user_config.downloader.quality, QualityTier::Best);
    assert!(!user_config.downloader.playlist_mode);
    assert_eq!(user_config.downloader.ytdlp_path, "yt-dlp");
    assert_eq!(user_config.bootstrap.timeout_secs, 60);
    assert!(user_config.bootstrap.archive_url.starts_with("https://"));
}

#[test]
fn test_save_and_load_user_config() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut user_config = UserConfig::default();
    user_config.downloader.format = MediaFormat::Audio;
    user_config.downloader.quality = QualityTier::P1080;
    user_config.downloader.playlist_mode = true;
    user_config.downloader.playlist_limit = 25;
    user_config.bootstrap.tool_dir = "/opt/ffmpeg".to_string();

    manager.save_user_config(&user_config).unwrap();

    let yaml = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(yaml.contains("format: audio"));
    assert!(yaml.contains("quality: 1080p"));

    let loaded = manager.load_file_config().unwrap();
    assert_eq!(loaded, user_config);
}

#[test]
fn test_partial_settings_file_fills_defaults() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "downloader:\n  quality: 480p\n",
    )
    .unwrap();

    let loaded = manager.load_file_config().unwrap();
    assert_eq!(loaded.downloader.quality, QualityTier::P480);
    assert_eq!(loaded.downloader.format, MediaFormat::Video);
    assert_eq!(loaded.bootstrap.timeout_secs, 60);
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_path(), "downloader: [not, a, map").unwrap();

    let err = manager.load_file_config().unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse settings"));
}

#[test]
fn test_environment_overrides_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut user_config = UserConfig::default();
    user_config.downloader.quality = QualityTier::P720;
    user_config.bootstrap.timeout_secs = 30;
    manager.save_user_config(&user_config).unwrap();

    // The only test in this binary that touches the environment
    unsafe {
        std::env::set_var("YTBULK_BOOTSTRAP__TIMEOUT_SECS", "5");
    }
    let loaded = manager.load_user_config();
    unsafe {
        std::env::remove_var("YTBULK_BOOTSTRAP__TIMEOUT_SECS");
    }

    let loaded = loaded.unwrap();
    assert_eq!(loaded.bootstrap.timeout_secs, 5);
    assert_eq!(loaded.downloader.quality, QualityTier::P720);
}

#[test]
fn test_config_into_state_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut user_config = UserConfig::default();
    user_config.downloader.format = MediaFormat::Audio;
    user_config.downloader.download_dir = "/srv/media".to_string();
    user_config.downloader.playlist_mode = true;
    user_config.downloader.playlist_limit = 3;
    manager.save_user_config(&user_config).unwrap();

    let loaded = manager.load_file_config().unwrap();
    let state = StateManager::new();
    state.load_from_user_config(&loaded, resolve_download_dir(&loaded));

    let config = state.read(|s| s.download_config());
    assert_eq!(config.format, MediaFormat::Audio);
    assert_eq!(config.destination_directory, Utf8PathBuf::from("/srv/media"));
    assert_eq!(config.playlist.map(|p| p.limit), Some(3));
}
