//! Core types and configuration for voicehue.
//!
//! This crate provides platform-agnostic types that can be used across
//! all voicehue sub-crates.

mod config;
mod event;
mod rgb;
mod state;

pub use config::{Config, ConfigManager, MAX_AUDIO_QUEUE_CAPACITY};
pub use event::TranscriptEvent;
pub use rgb::Rgb;
pub use state::{Authorization, SessionState};

/// Application name
pub const APP_NAME: &str = "voicehue";

/// Pretty application name for display
pub const APP_NAME_PRETTY: &str = "VoiceHue";

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "VOICEHUE_LOG";
