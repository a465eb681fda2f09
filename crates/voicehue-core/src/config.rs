//! Configuration management for voicehue.
//!
//! This module provides core configuration that doesn't depend on
//! platform-specific audio or recognition libraries.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dirs::{config_dir, data_dir};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::APP_NAME;

/// Upper bound for `audio_queue_capacity`.
pub const MAX_AUDIO_QUEUE_CAPACITY: usize = 4096;

/// Core configuration structure for the application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Recognition locale, e.g. "en-US"
    #[serde(default = "default_locale", skip_serializing_if = "is_default_locale")]
    pub locale: String,

    /// Ask the recognizer for interim results while recording
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub report_partial_results: bool,

    /// Give up waiting for a final result this long after stopping (in
    /// seconds). Zero waits forever.
    #[serde(
        default = "default_stop_timeout",
        skip_serializing_if = "is_default_stop_timeout"
    )]
    pub stop_timeout: f32,

    /// Number of captured buffers that may queue up for the recognizer
    /// before new ones are dropped
    #[serde(
        default = "default_audio_queue_capacity",
        skip_serializing_if = "is_default_audio_queue_capacity"
    )]
    pub audio_queue_capacity: usize,

    /// Frames per captured audio buffer
    #[serde(
        default = "default_tap_buffer_size",
        skip_serializing_if = "is_default_tap_buffer_size"
    )]
    pub tap_buffer_size: u32,

    /// Location of the color database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,

    /// OpenAI API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_key: Option<String>,

    /// Model to use for transcriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Preferred language for transcription (ISO 639-1 code)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Number of retries for failed transcription requests
    #[serde(
        default = "default_retries",
        skip_serializing_if = "is_default_retries"
    )]
    pub retries: u8,
}

fn default_true() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn is_default_locale(v: &String) -> bool {
    v == "en-US"
}

fn default_stop_timeout() -> f32 {
    10.0
}

fn is_default_stop_timeout(v: &f32) -> bool {
    (*v - 10.0).abs() < f32::EPSILON
}

fn default_audio_queue_capacity() -> usize {
    64
}

fn is_default_audio_queue_capacity(v: &usize) -> bool {
    *v == 64
}

fn default_tap_buffer_size() -> u32 {
    1024
}

fn is_default_tap_buffer_size(v: &u32) -> bool {
    *v == 1024
}

fn default_retries() -> u8 {
    2
}

fn is_default_retries(v: &u8) -> bool {
    *v == 2
}

impl Default for Config {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            report_partial_results: true,
            stop_timeout: default_stop_timeout(),
            audio_queue_capacity: default_audio_queue_capacity(),
            tap_buffer_size: default_tap_buffer_size(),
            database_path: None,
            openai_key: None,
            model: None,
            language: None,
            retries: default_retries(),
        }
    }
}

impl Config {
    /// Get the OpenAI API key
    pub fn key_openai(&self) -> Option<&str> {
        self.openai_key.as_deref()
    }

    /// Get the preferred language
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Get the model name
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Bound on waiting for a final result after stopping, if any. Values
    /// that are not a representable positive duration disable the bound.
    pub fn stop_timeout(&self) -> Option<Duration> {
        if self.stop_timeout.is_nan() || self.stop_timeout <= 0.0 {
            return None;
        }
        match Duration::try_from_secs_f32(self.stop_timeout) {
            Ok(timeout) => Some(timeout),
            Err(e) => {
                warn!(stop_timeout = self.stop_timeout, "ignoring stop_timeout: {e}");
                None
            }
        }
    }

    /// Capacity of the capture to recognizer queue, in
    /// `1..=MAX_AUDIO_QUEUE_CAPACITY`.
    pub fn audio_queue_capacity(&self) -> usize {
        self.audio_queue_capacity.clamp(1, MAX_AUDIO_QUEUE_CAPACITY)
    }

    /// Resolve the database location, falling back to the platform data
    /// directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => {
                let data_dir = data_dir().context("Failed to retrieve data directory")?;
                Ok(data_dir.join(APP_NAME).join("colors.sqlite3"))
            }
        }
    }
}

/// Manages loading and saving configuration files.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the default configuration directory.
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Ok(Self { config_path })
    }

    /// Creates a new ConfigManager with a specified configuration directory.
    pub fn with_config_dir<P: AsRef<Path>>(dir: P) -> Self {
        let config_path = dir.as_ref().join(format!("{}.toml", APP_NAME));
        Self { config_path }
    }

    /// Returns the default path to the configuration file.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to retrieve configuration directory")?;
        Ok(config_dir.join(APP_NAME).join(format!("{}.toml", APP_NAME)))
    }

    /// Loads the configuration from the config file or returns default.
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }

        let config_content = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config file at {:?}", self.config_path))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file at {:?}", self.config_path))?;

        if config.stop_timeout().is_none() {
            warn!("stop_timeout is disabled, a stalled recognizer will keep the session stopping");
        }

        Ok(config)
    }

    /// Saves the configuration to the config file.
    pub fn save(&self, config: &Config) -> Result<()> {
        let config_dir = self
            .config_path
            .parent()
            .with_context(|| format!("Failed to get parent directory of {:?}", self.config_path))?;

        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory at {:?}", config_dir))?;

        let serialized =
            toml::to_string_pretty(&config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, serialized)
            .with_context(|| format!("Failed to write config file at {:?}", self.config_path))?;

        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
