//! # iothread-settings
//!
//! Configuration for connections and the reference server, loaded from three
//! layers (in priority order):
//! 1. **Compiled defaults**: [`IoThreadSettings::default()`]
//! 2. **Settings file**: `~/.iothread/settings.json` or an explicit path
//! 3. **Environment variables**: `IOTHREAD_*` overrides

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    read_settings_file, settings_path,
};
pub use types::{
    ChannelSettings, FrameCodec, IoThreadSettings, LoggingSettings, MAX_CONNECTIONS_LIMIT,
    ServerSettings, TransportSettings,
};
