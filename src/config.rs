//! Configuration management for Tandem
//!
//! Provides persistent settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.tandem/config.json`. Every section uses
//! `#[serde(default)]`, so partial files load and missing fields take their
//! defaults.

use crate::echo::DEFAULT_SIMILARITY_THRESHOLD;
use crate::speech::google::{PlayerCommand, DEFAULT_TTS_BASE_URL};
use crate::speech::system_voice::DEFAULT_FALLBACK_RATE;
use crate::speech::DEFAULT_MAX_CHUNK_CHARS;
use crate::translation::google::DEFAULT_TRANSLATE_BASE_URL;
use crate::turn::TurnTimings;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 2;

/// Global config instance for caching
static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    /// Echo suppression settings
    pub echo: EchoConfig,
    /// Turn controller timings
    pub turn: TurnConfig,
    /// Translation service settings
    pub translation: TranslationConfig,
    /// Speech output settings
    pub speech: SpeechConfig,
    /// Capture settings
    pub capture: CaptureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            echo: EchoConfig::default(),
            turn: TurnConfig::default(),
            translation: TranslationConfig::default(),
            speech: SpeechConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

impl Config {
    /// Timings for the turn machine
    pub fn turn_timings(&self) -> TurnTimings {
        TurnTimings {
            echo_cooldown: Duration::from_millis(self.turn.echo_cooldown_ms),
            error_cooldown: Duration::from_millis(self.turn.error_cooldown_ms),
            post_speech_cooldown: Duration::from_millis(self.turn.post_speech_cooldown_ms),
            echo_window: Duration::from_secs(self.echo.window_secs),
        }
    }
}

/// Echo suppression configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EchoConfig {
    /// Seconds heard/spoken text stays eligible for echo matching
    pub window_secs: u64,
    /// Similarity above which a transcript is treated as echo (0.0 - 1.0)
    pub similarity_threshold: f64,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            window_secs: 10,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

/// Turn controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Delay before listening again after an echo was dropped
    pub echo_cooldown_ms: u64,
    /// Delay before listening again after a failed turn
    pub error_cooldown_ms: u64,
    /// Delay between the end of speech and the next capture
    pub post_speech_cooldown_ms: u64,
    /// Reverse a turn when the transcript is in the target language
    pub detect_source_language: bool,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            echo_cooldown_ms: 1000,
            error_cooldown_ms: 500,
            post_speech_cooldown_ms: 800,
            detect_source_language: false,
        }
    }
}

/// Translation service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Translate endpoint base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_TRANSLATE_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// TTS endpoint base URL
    pub tts_base_url: String,
    /// Longest chunk sent to the TTS endpoint, in characters
    pub max_chunk_chars: usize,
    /// Audio player program
    pub player_command: String,
    /// Arguments passed to the player before the file path
    pub player_args: Vec<String>,
    /// Synthetic voice program used when networked playback fails
    pub fallback_command: String,
    /// Synthetic voice rate relative to normal speed
    pub fallback_rate: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let player = PlayerCommand::default();
        Self {
            tts_base_url: DEFAULT_TTS_BASE_URL.to_string(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            player_command: player.program,
            player_args: player.args,
            fallback_command: "espeak-ng".to_string(),
            fallback_rate: DEFAULT_FALLBACK_RATE,
        }
    }
}

impl SpeechConfig {
    /// Player invocation for networked playback
    pub fn player(&self) -> PlayerCommand {
        PlayerCommand {
            program: self.player_command.clone(),
            args: self.player_args.clone(),
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds without input before a session ends as silence
    pub silence_timeout_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            silence_timeout_secs: 8,
        }
    }
}

/// Get the path to the config file (~/.tandem/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.tandem)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".tandem")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from `path`, migrating it if needed
///
/// A missing file yields the defaults. A migrated config is written back.
pub fn load_from_path(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        tracing::info!("Config file not found, using defaults");
        return Ok(Config::default());
    }

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    let config: Config =
        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;

    if migrated.version != original_version {
        save_to_path(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to `path`, creating parent directories as needed
pub fn save_to_path(path: &Path, config: &Config) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialise config: {}", e))?;

    fs::write(path, contents).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, String> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, String> {
    match config.version {
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        // Version 1 -> 2: echo settings outside their valid range are reset
        1 => {
            let mut migrated = config;
            if !(migrated.echo.similarity_threshold > 0.0
                && migrated.echo.similarity_threshold <= 1.0)
            {
                tracing::warn!(
                    "Resetting out-of-range similarity threshold {}",
                    migrated.echo.similarity_threshold
                );
                migrated.echo.similarity_threshold = DEFAULT_SIMILARITY_THRESHOLD;
            }
            if migrated.echo.window_secs == 0 {
                migrated.echo.window_secs = EchoConfig::default().window_secs;
            }
            migrated.version = 2;
            Ok(migrated)
        }
        v => Err(format!("Unknown config version: {}", v)),
    }
}

/// Get the global config instance
fn get_config_instance() -> &'static RwLock<Config> {
    CONFIG.get_or_init(|| {
        let config = load_from_path(&get_config_path()).unwrap_or_else(|e| {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        });
        tracing::info!(
            "Config loaded (similarity threshold {}, detect source language {})",
            config.echo.similarity_threshold,
            config.turn.detect_source_language
        );
        RwLock::new(config)
    })
}

/// Get the current configuration
///
/// The config is cached in memory and loaded from disk on first access.
pub fn get_config() -> Result<Config, String> {
    let config = get_config_instance().read().clone();
    Ok(config)
}

/// Update the configuration
///
/// Replaces the current configuration and persists it to disk. The version
/// field is automatically updated to the current schema.
pub fn set_config(mut config: Config) -> Result<(), String> {
    config.version = CURRENT_VERSION;

    save_to_path(&get_config_path(), &config)?;

    let mut cached = get_config_instance().write();
    *cached = config;

    tracing::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults
///
/// Resets all settings to their default values and persists to disk.
pub fn reset_config() -> Result<Config, String> {
    let default_config = Config::default();

    save_to_path(&get_config_path(), &default_config)?;

    let mut cached = get_config_instance().write();
    *cached = default_config.clone();

    tracing::info!("Configuration reset to defaults");
    Ok(default_config)
}
