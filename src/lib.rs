//! `deskmode` - display and audio layout switcher
//!
//! Switches an X11 workstation between named layouts ("desk", "tv", "dual",
//! or saved profiles) in one step: which monitors are on, which is primary,
//! how they are arranged, and which audio devices are the defaults.
//!
//! Users refer to devices by logical names. Keyword rules from the config map
//! those names to whatever physical outputs and audio endpoints are currently
//! present, so the same layout works after ports or device ids change.
//!
//! # Layers
//! - [`shell`]: external commands (`xrandr`, `pactl`, `wpctl`) behind [`shell::CommandRunner`]
//! - [`discovery`]: parses their output into [`devices`] snapshots
//! - [`matcher`] / [`mapper`]: keyword matching and logical → physical mapping
//! - [`display`] / [`audio`]: controllers issuing the actual changes
//! - [`apply`]: realises a whole macro or profile
//! - [`config`] / [`profiles`]: TOML persistence

pub mod apply;
pub mod audio;
pub mod cli;
pub mod commands;
pub mod config;
pub mod devices;
pub mod discovery;
pub mod display;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod matcher;
pub mod notification;
pub mod profiles;
pub mod shell;
pub mod style;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types for convenience
pub use apply::Workstation;
pub use cli::Args;
pub use config::Config;
pub use error::DeviceError;
