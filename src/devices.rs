//! Device snapshots
//!
//! Discovery produces a fresh batch of these on every call. Nothing mutates a
//! record in place; holders replace their whole batch on refresh.

use serde::Serialize;

/// A connected display output as reported by `xrandr`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRecord {
    /// Output name, e.g. `HDMI-1`
    pub name: String,
    pub connected: bool,
    /// Currently driven by a CRTC (has a geometry)
    pub active: bool,
    pub primary: bool,
    pub current_resolution: Option<String>,
    pub available_resolutions: Vec<String>,
}

impl DisplayRecord {
    /// Connected and not switched off
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.connected && self.active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioDirection {
    Output,
    Input,
}

/// An audio sink or source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioEndpointRecord {
    /// Backend-assigned id (`pactl` index or `wpctl` object id)
    pub id: String,
    /// Stable identifier used in commands
    pub name: String,
    /// Human-readable description, used for matching
    pub description: String,
    pub is_default: bool,
    pub direction: AudioDirection,
}

/// Outputs and inputs from one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioInventory {
    pub outputs: Vec<AudioEndpointRecord>,
    pub inputs: Vec<AudioEndpointRecord>,
}

impl AudioInventory {
    #[must_use]
    pub fn pool(&self, direction: AudioDirection) -> &[AudioEndpointRecord] {
        match direction {
            AudioDirection::Output => &self.outputs,
            AudioDirection::Input => &self.inputs,
        }
    }

    /// Current default endpoint for a direction, if the backend reported one
    #[must_use]
    pub fn default_endpoint(&self, direction: AudioDirection) -> Option<&AudioEndpointRecord> {
        self.pool(direction).iter().find(|e| e.is_default)
    }
}
