//! Device discovery
//!
//! Queries live OS state and turns tool output into [`DisplayRecord`]s and
//! [`AudioEndpointRecord`]s:
//! - `xrandr --query` for display outputs
//! - `pactl list sinks|sources` + `pactl info` when a PulseAudio server answers
//! - `wpctl status` otherwise (PipeWire/WirePlumber)
//!
//! Discovery never fails: a tool error is logged and yields an empty batch.

use regex::Regex;
use std::rc::Rc;
use std::sync::LazyLock;
use tracing::{debug, error, trace};

use crate::devices::{AudioDirection, AudioEndpointRecord, AudioInventory, DisplayRecord};
use crate::shell::{CommandRunner, Invocation, run_checked};

/// Source of fresh device snapshots
pub trait Discovery {
    /// Connected displays, in `xrandr` order
    fn discover_displays(&self) -> Vec<DisplayRecord>;

    /// Audio outputs and inputs, in backend order
    fn discover_audio(&self) -> AudioInventory;
}

/// Discovery backed by the real command-line tools
pub struct SystemDiscovery {
    runner: Rc<dyn CommandRunner>,
}

impl SystemDiscovery {
    pub fn new(runner: Rc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn pulse_inventory(&self) -> AudioInventory {
        let defaults = match run_checked(self.runner.as_ref(), &Invocation::new("pactl").arg("info")) {
            Ok(out) => parse_pactl_defaults(&out.stdout),
            Err(e) => {
                debug!("Could not query default endpoints: {}", e);
                PulseDefaults::default()
            }
        };

        let mut inventory = AudioInventory::default();
        for (kind, direction) in [("sinks", AudioDirection::Output), ("sources", AudioDirection::Input)] {
            let invocation = Invocation::new("pactl").args(["list", kind]);
            match run_checked(self.runner.as_ref(), &invocation) {
                Ok(out) => {
                    let default = match direction {
                        AudioDirection::Output => defaults.sink.as_deref(),
                        AudioDirection::Input => defaults.source.as_deref(),
                    };
                    let endpoints = parse_pactl_list(&out.stdout, direction, default);
                    match direction {
                        AudioDirection::Output => inventory.outputs = endpoints,
                        AudioDirection::Input => inventory.inputs = endpoints,
                    }
                }
                Err(e) => error!("Failed to list audio {}: {}", kind, e),
            }
        }
        inventory
    }
}

impl Discovery for SystemDiscovery {
    fn discover_displays(&self) -> Vec<DisplayRecord> {
        match run_checked(self.runner.as_ref(), &Invocation::new("xrandr").arg("--query")) {
            Ok(out) => {
                let displays = parse_xrandr(&out.stdout);
                trace!("xrandr reported {} connected displays", displays.len());
                displays
            }
            Err(e) => {
                error!("Failed to get display info: {}", e);
                Vec::new()
            }
        }
    }

    fn discover_audio(&self) -> AudioInventory {
        let probe = Invocation::new("pactl").args(["list", "short", "sinks"]);
        if run_checked(self.runner.as_ref(), &probe).is_ok() {
            return self.pulse_inventory();
        }

        match run_checked(self.runner.as_ref(), &Invocation::new("wpctl").arg("status")) {
            Ok(out) => parse_wpctl_status(&out.stdout),
            Err(e) => {
                error!("Failed to detect audio devices: {}", e);
                AudioInventory::default()
            }
        }
    }
}

// ============================================================================
// xrandr
// ============================================================================

static XRANDR_OUTPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\S+) (connected|disconnected)\b(.*)$").expect("valid xrandr output regex")
});
static XRANDR_GEOMETRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+x\d+\+\d+\+\d+").expect("valid geometry regex"));
static XRANDR_MODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s+(\d+x\d+)\S*\s").expect("valid mode regex"));

/// Parse `xrandr --query` output into connected display records
#[must_use]
pub fn parse_xrandr(stdout: &str) -> Vec<DisplayRecord> {
    let mut displays: Vec<DisplayRecord> = Vec::new();
    // Mode lines belong to the most recent header, but only connected ones are kept
    let mut in_connected = false;

    for line in stdout.lines() {
        if let Some(caps) = XRANDR_OUTPUT.captures(line) {
            in_connected = &caps[2] == "connected";
            if in_connected {
                let rest = &caps[3];
                displays.push(DisplayRecord {
                    name: caps[1].to_string(),
                    connected: true,
                    active: XRANDR_GEOMETRY.is_match(rest),
                    primary: rest.split_whitespace().any(|w| w == "primary"),
                    current_resolution: None,
                    available_resolutions: Vec::new(),
                });
            }
            continue;
        }

        if !in_connected {
            continue;
        }
        let (Some(display), Some(caps)) = (displays.last_mut(), XRANDR_MODE.captures(line)) else {
            continue;
        };
        let mode = caps[1].to_string();
        if line.contains('*') {
            display.current_resolution = Some(mode.clone());
        }
        if !display.available_resolutions.contains(&mode) {
            display.available_resolutions.push(mode);
        }
    }

    displays
}

// ============================================================================
// PulseAudio (pactl)
// ============================================================================

#[derive(Debug, Default, PartialEq, Eq)]
struct PulseDefaults {
    sink: Option<String>,
    source: Option<String>,
}

fn parse_pactl_defaults(stdout: &str) -> PulseDefaults {
    let mut defaults = PulseDefaults::default();
    for line in stdout.lines() {
        if let Some(name) = line.trim().strip_prefix("Default Sink:") {
            defaults.sink = Some(name.trim().to_string());
        } else if let Some(name) = line.trim().strip_prefix("Default Source:") {
            defaults.source = Some(name.trim().to_string());
        }
    }
    defaults
}

/// Parse `pactl list sinks` / `pactl list sources` blocks
///
/// Monitor sources are skipped: they mirror an output and are never a useful
/// default input.
#[must_use]
pub fn parse_pactl_list(
    stdout: &str,
    direction: AudioDirection,
    default_name: Option<&str>,
) -> Vec<AudioEndpointRecord> {
    let header = match direction {
        AudioDirection::Output => "Sink #",
        AudioDirection::Input => "Source #",
    };

    let mut endpoints = Vec::new();
    let mut current: Option<AudioEndpointRecord> = None;

    for line in stdout.lines() {
        if let Some(id) = line.strip_prefix(header) {
            endpoints.extend(current.take());
            current = Some(AudioEndpointRecord {
                id: id.trim().to_string(),
                name: String::new(),
                description: String::new(),
                is_default: false,
                direction,
            });
            continue;
        }

        let Some(endpoint) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        if let Some(name) = trimmed.strip_prefix("Name:") {
            endpoint.name = name.trim().to_string();
            endpoint.is_default = default_name == Some(endpoint.name.as_str());
        } else if let Some(desc) = trimmed.strip_prefix("Description:") {
            endpoint.description = desc.trim().to_string();
        }
    }
    endpoints.extend(current);

    endpoints
        .into_iter()
        .filter(|e| !e.name.is_empty() && !e.name.ends_with(".monitor"))
        .collect()
}

// ============================================================================
// PipeWire (wpctl)
// ============================================================================

static WPCTL_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\*)?\s*(\d+)\.\s+(.*?)\s*(\[vol:[^\]]*\])?\s*$").expect("valid wpctl regex")
});

/// Parse the `Audio` section of `wpctl status`
///
/// `wpctl` has no separate stable name, so the description doubles as name.
#[must_use]
pub fn parse_wpctl_status(stdout: &str) -> AudioInventory {
    let mut inventory = AudioInventory::default();
    let mut in_audio = false;
    let mut section: Option<AudioDirection> = None;

    for raw in stdout.lines() {
        // Top-level sections ("Audio", "Video", "Settings") start in column 0
        if raw.chars().next().is_some_and(|c| !c.is_whitespace() && c != '│' && c != '├' && c != '└') {
            in_audio = raw.trim() == "Audio";
            section = None;
            continue;
        }
        if !in_audio {
            continue;
        }

        let line: String = raw
            .chars()
            .map(|c| if matches!(c, '│' | '├' | '└' | '─') { ' ' } else { c })
            .collect();
        let trimmed = line.trim();

        if trimmed.ends_with(':') {
            section = match trimmed {
                "Sinks:" => Some(AudioDirection::Output),
                "Sources:" => Some(AudioDirection::Input),
                _ => None,
            };
            continue;
        }

        let Some(direction) = section else { continue };
        let Some(caps) = WPCTL_ENTRY.captures(&line) else {
            continue;
        };

        let description = caps[3].to_string();
        let endpoint = AudioEndpointRecord {
            id: caps[2].to_string(),
            name: description.clone(),
            description,
            is_default: caps.get(1).is_some(),
            direction,
        };
        match direction {
            AudioDirection::Output => inventory.outputs.push(endpoint),
            AudioDirection::Input => inventory.inputs.push(endpoint),
        }
    }

    inventory
}
