//! Command-line interface definitions
//!
//! Uses clap for argument parsing with derive macros.

use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

use crate::display::Position;

/// deskmode - display and audio layout switcher
///
/// Applies named layouts ("desk", "tv", "dual" or saved profiles) across
/// xrandr displays and PulseAudio/PipeWire audio devices.
#[derive(Parser)]
#[command(name = "deskmode")]
#[command(version)]
#[command(about = "Switch display and audio layouts with one command")]
#[command(after_help = "\
LAYOUTS:
  deskmode apply desk           Desk monitor only, desk speakers
  deskmode apply tv             TV only, audio over HDMI
  deskmode apply dual           Both screens, desk primary
  deskmode apply --profile NAME Apply a saved profile

DEVICE NAMES:
  Logical names (desk, tv, headset) are resolved through the keyword lists in
  config.toml. Physical names (DP-1, alsa_output...) are accepted as-is.
  Run `deskmode detect` to see what each logical name currently maps to.

FILES:
  $XDG_CONFIG_HOME/deskmode/config.toml       Keywords, macros, settings
  $XDG_CONFIG_HOME/deskmode/profiles/*.toml   Saved profiles
  $XDG_DATA_HOME/deskmode/logs/deskmode.log   Debug log (rotated at 1 MB)

REQUIREMENTS:
  xrandr, plus pactl (PulseAudio) or wpctl (PipeWire/WirePlumber).

EXIT STATUS:
  0 success, 1 if any step failed, 130 when interrupted.")]
pub struct Args {
    /// Verbose logging (debug level on stderr)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Show detected displays, audio devices and logical mappings
    Detect {
        /// Also write the detection results as JSON to this file
        #[arg(short, long, value_name = "FILE")]
        save: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Apply a macro or a saved profile
    #[command(group(ArgGroup::new("layout").required(true).args(["macro_name", "profile"])))]
    Apply {
        /// Macro to apply (desk, tv, dual or any macro from config.toml)
        #[arg(value_name = "MACRO")]
        macro_name: Option<String>,

        /// Profile to apply
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// Manage displays
    #[command(group(ArgGroup::new("action").required(true).args(["list", "enable", "disable", "primary"])))]
    Display {
        /// List displays
        #[arg(short, long)]
        list: bool,

        /// Output the list in JSON format
        #[arg(long, requires = "list")]
        json: bool,

        /// Enable a display
        #[arg(short, long, value_name = "NAME")]
        enable: Option<String>,

        /// Resolution for --enable, e.g. 1920x1080
        #[arg(long, value_name = "WxH", requires = "enable")]
        mode: Option<String>,

        /// Placement for --enable: right-of, left-of, above, below, same-as
        #[arg(long, requires = "enable")]
        position: Option<Position>,

        /// Reference display for --position
        #[arg(long, value_name = "NAME", requires = "position")]
        relative_to: Option<String>,

        /// Disable a display
        #[arg(short, long, value_name = "NAME")]
        disable: Option<String>,

        /// Set the primary display
        #[arg(short, long, value_name = "NAME")]
        primary: Option<String>,
    },

    /// Manage audio devices
    #[command(group(ArgGroup::new("action").required(true).args(["list", "output", "input", "volume", "mute", "unmute"])))]
    Audio {
        /// List audio devices
        #[arg(short, long)]
        list: bool,

        /// Output the list in JSON format
        #[arg(long, requires = "list")]
        json: bool,

        /// Set the default output device
        #[arg(short, long, value_name = "NAME")]
        output: Option<String>,

        /// Set the default input device
        #[arg(short, long, value_name = "NAME")]
        input: Option<String>,

        /// Set volume (0-100, clamped)
        #[arg(long, allow_negative_numbers = true)]
        volume: Option<i64>,

        /// Mute the device
        #[arg(long)]
        mute: bool,

        /// Unmute the device
        #[arg(long)]
        unmute: bool,

        /// Device for --volume/--mute/--unmute (default: current default device)
        #[arg(long, value_name = "NAME")]
        device: Option<String>,

        /// Target input devices for --volume/--mute/--unmute
        #[arg(long)]
        source: bool,
    },

    /// Manage configuration
    #[command(group(ArgGroup::new("action").required(true).args(["show", "update", "reset"])))]
    Config {
        /// Show current config
        #[arg(short, long)]
        show: bool,

        /// Merge settings from a TOML or JSON file
        #[arg(short, long, value_name = "FILE")]
        update: Option<PathBuf>,

        /// Reset to the default config
        #[arg(short, long)]
        reset: bool,
    },

    /// Manage saved profiles
    #[command(group(ArgGroup::new("action").required(true).args(["list", "create", "delete", "show"])))]
    Profile {
        /// List available profiles
        #[arg(short, long)]
        list: bool,

        /// Create a profile from the current device state
        #[arg(short, long, value_name = "NAME")]
        create: Option<String>,

        /// Delete a profile
        #[arg(short, long, value_name = "NAME")]
        delete: Option<String>,

        /// Show a profile
        #[arg(short, long, value_name = "NAME")]
        show: Option<String>,

        /// Description for the new profile
        #[arg(long, requires = "create")]
        description: Option<String>,

        /// Primary display for the new profile
        #[arg(long, value_name = "NAME", requires = "create")]
        primary_display: Option<String>,

        /// Comma-separated displays to enable in the new profile
        #[arg(long, value_name = "NAMES", value_delimiter = ',', requires = "create")]
        enable_displays: Vec<String>,

        /// Default audio output for the new profile
        #[arg(long, value_name = "NAME", requires = "create")]
        audio_output: Option<String>,

        /// Default audio input for the new profile
        #[arg(long, value_name = "NAME", requires = "create")]
        audio_input: Option<String>,

        /// Volume for the new profile (0-100)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100), requires = "create")]
        volume: Option<u8>,
    },
}

impl Command {
    /// Whether the command talks to xrandr or the audio server
    #[must_use]
    pub fn touches_hardware(&self) -> bool {
        match self {
            Self::Detect { .. } | Self::Apply { .. } | Self::Display { .. } | Self::Audio { .. } => true,
            Self::Profile { create, .. } => create.is_some(),
            Self::Config { .. } => false,
        }
    }
}
