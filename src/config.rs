//! Configuration management for Auto Typer
//!
//! Two layers live here:
//!
//! - [`Config`]: persistent application settings, saved to and loaded from a
//!   platform-specific TOML file.
//! - [`SessionConfig`]: the values one typing session runs with, handed to
//!   the engine before `start`.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/auto-typer/config.toml` |
//! | macOS | `~/Library/Application Support/auto-typer/config.toml` |
//! | Windows | `%APPDATA%\auto-typer\config.toml` |
//!
//! ## Example
//!
//! ```no_run
//! use auto_typer::Config;
//!
//! // Load existing config or use defaults
//! let mut config = Config::load().unwrap_or_default();
//!
//! // Modify settings
//! config.typing.wpm = 90;
//!
//! // Save to disk
//! config.save().expect("Failed to save config");
//! ```

use crate::delay::{clamp_wpm, JitterConfig};
use crate::emitter::EmitMethod;
use crate::queue::Granularity;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory name under the platform config dir
pub const APP_DIR: &str = "auto-typer";

/// Longest pause between repeat passes (one day)
pub const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Default countdown before the first keystroke
pub const DEFAULT_COUNTDOWN_SECS: u32 = 3;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the application directory, creating it if needed.
pub fn app_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join(APP_DIR);

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir)
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir()?.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Typing behaviour
    #[serde(default)]
    pub typing: TypingSettings,
    /// Terminal key bindings
    #[serde(default)]
    pub hotkeys: HotkeyConfig,
}

/// Persistent typing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TypingSettings {
    /// Target words per minute
    pub wpm: u32,
    /// Pause before typing the text again; 0 types it once
    pub interval_secs: f64,
    /// Slow down on punctuation and speed up on common letter pairs
    pub context_rules: bool,
    /// Seconds of countdown before the first keystroke
    pub countdown_secs: u32,
    /// Characters per emission; 0 or 1 types one character at a time
    pub chunk_size: usize,
    /// How keystrokes reach the focused window
    pub method: EmitMethod,
    /// Local time of day to begin typing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<NaiveTime>,
    /// Random extra delay per keystroke
    pub random_delay: JitterConfig,
}

impl Default for TypingSettings {
    fn default() -> Self {
        Self {
            wpm: 60,
            interval_secs: 0.0,
            context_rules: true,
            countdown_secs: DEFAULT_COUNTDOWN_SECS,
            chunk_size: 0,
            method: EmitMethod::Direct,
            scheduled_start: None,
            random_delay: JitterConfig::default(),
        }
    }
}

impl TypingSettings {
    /// Session configuration for typing `text` with these settings
    pub fn session(&self, text: impl Into<String>) -> SessionConfig {
        SessionConfig {
            text: text.into(),
            speed: self.wpm,
            jitter: self.random_delay,
            interval_secs: self.interval_secs,
            scheduled_start: self.scheduled_start,
            granularity: Granularity::from_chunk_size(self.chunk_size),
            context_rules: self.context_rules,
            countdown_secs: self.countdown_secs,
        }
        .sanitized()
    }
}

/// Terminal key bindings for the front-end
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HotkeyConfig {
    /// Toggles pause
    pub pause: String,
    /// Stops typing immediately
    pub emergency_stop: String,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            pause: "space".to_string(),
            emergency_stop: "esc".to_string(),
        }
    }
}

/// Values for one typing session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Text to type; an empty text never starts
    pub text: String,
    /// Words per minute, kept within 1..=1000
    pub speed: u32,
    pub jitter: JitterConfig,
    /// Pause between repeat passes in seconds; 0 means no repeat
    pub interval_secs: f64,
    /// Wait for this local time before the countdown
    pub scheduled_start: Option<NaiveTime>,
    pub granularity: Granularity,
    pub context_rules: bool,
    pub countdown_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        TypingSettings::default().session(String::new())
    }
}

impl SessionConfig {
    /// Default settings for `text`
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_speed(mut self, wpm: u32) -> Self {
        self.speed = wpm;
        self.sanitized()
    }

    pub fn with_jitter(mut self, enabled: bool, min_ms: f64, max_ms: f64) -> Self {
        self.jitter = JitterConfig::new(enabled, min_ms, max_ms);
        self
    }

    pub fn with_interval(mut self, secs: f64) -> Self {
        self.interval_secs = secs;
        self.sanitized()
    }

    pub fn with_scheduled_start(mut self, at: Option<NaiveTime>) -> Self {
        self.scheduled_start = at;
        self
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_context_rules(mut self, enabled: bool) -> Self {
        self.context_rules = enabled;
        self
    }

    pub fn with_countdown(mut self, secs: u32) -> Self {
        self.countdown_secs = secs;
        self
    }

    /// Clamp every field into its valid range. Never fails.
    pub fn sanitized(mut self) -> Self {
        self.speed = clamp_wpm(self.speed);
        self.jitter = self.jitter.clamped();
        self.interval_secs = if self.interval_secs.is_finite() {
            self.interval_secs.clamp(0.0, MAX_INTERVAL_SECS)
        } else {
            0.0
        };
        self
    }
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
