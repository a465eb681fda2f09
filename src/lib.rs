// Re-export from sub-crates
pub use voicehue_core::{
    APP_NAME, APP_NAME_PRETTY, Authorization, Config, ConfigManager, DEFAULT_LOG_LEVEL, LOG_ENV,
    Rgb, SessionState,
};
pub use voicehue_store::{ColorRecord, RecordStore, StoreError, StoreEvent};

// App-specific modules
pub mod color;
pub mod display;
#[cfg(feature = "desktop")]
pub mod permission;
pub mod process;
pub mod session;

#[cfg(test)]
mod testing;

// Version from this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
