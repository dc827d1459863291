//! Audio control
//!
//! Two mutually exclusive command sets are supported:
//! - PulseAudio (`pactl`): addresses endpoints by name, volume in percent,
//!   moves running playback streams when the default sink changes
//! - PipeWire/WirePlumber (`wpctl`): addresses endpoints by object id, volume
//!   on a 0.0–1.5 scale
//!
//! The backend is detected once when the controller is built.

use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::devices::{AudioDirection, AudioEndpointRecord, AudioInventory};
use crate::discovery::Discovery;
use crate::error::{DeviceError, DeviceKind};
use crate::matcher::find_audio;
use crate::shell::{CommandRunner, Invocation, run_checked};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pulse,
    PipeWire,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pulse => "PulseAudio",
            Self::PipeWire => "PipeWire",
        })
    }
}

/// Builds backend-specific commands for one audio subsystem
pub trait AudioBackend {
    fn kind(&self) -> BackendKind;

    /// Make `endpoint` the default for its direction
    fn set_default(&self, endpoint: &AudioEndpointRecord) -> Invocation;

    /// Set volume; `level` is already clamped to 0..=100
    fn set_volume(&self, endpoint: &AudioEndpointRecord, level: u8) -> Invocation;

    fn set_mute(&self, endpoint: &AudioEndpointRecord, muted: bool) -> Invocation;

    /// Move running playback onto `endpoint` after it became the default
    ///
    /// Best effort: failures are logged, never returned.
    fn migrate_streams(&self, _runner: &dyn CommandRunner, _endpoint: &AudioEndpointRecord) {}
}

// ============================================================================
// PulseAudio
// ============================================================================

pub struct PulseBackend;

impl PulseBackend {
    fn noun(endpoint: &AudioEndpointRecord) -> &'static str {
        match endpoint.direction {
            AudioDirection::Output => "sink",
            AudioDirection::Input => "source",
        }
    }
}

impl AudioBackend for PulseBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Pulse
    }

    fn set_default(&self, endpoint: &AudioEndpointRecord) -> Invocation {
        Invocation::new("pactl").args([
            format!("set-default-{}", Self::noun(endpoint)),
            endpoint.name.clone(),
        ])
    }

    fn set_volume(&self, endpoint: &AudioEndpointRecord, level: u8) -> Invocation {
        Invocation::new("pactl").args([
            format!("set-{}-volume", Self::noun(endpoint)),
            endpoint.name.clone(),
            format!("{level}%"),
        ])
    }

    fn set_mute(&self, endpoint: &AudioEndpointRecord, muted: bool) -> Invocation {
        Invocation::new("pactl").args([
            format!("set-{}-mute", Self::noun(endpoint)),
            endpoint.name.clone(),
            u8::from(muted).to_string(),
        ])
    }

    fn migrate_streams(&self, runner: &dyn CommandRunner, endpoint: &AudioEndpointRecord) {
        let list = Invocation::new("pactl").args(["list", "short", "sink-inputs"]);
        let streams = match run_checked(runner, &list) {
            Ok(out) => out.stdout,
            Err(e) => {
                warn!("Could not list playback streams: {}", e);
                return;
            }
        };

        for stream in streams.lines().filter_map(|l| l.split_whitespace().next()) {
            let mv = Invocation::new("pactl").args(["move-sink-input", stream, endpoint.name.as_str()]);
            match run_checked(runner, &mv) {
                Ok(_) => debug!("Moved stream {} to {}", stream, endpoint.name),
                Err(e) => warn!("Failed to move stream {}: {}", stream, e),
            }
        }
    }
}

// ============================================================================
// PipeWire
// ============================================================================

pub struct PipeWireBackend;

/// Map 0..=100 onto `wpctl`'s 0.0–1.5 scale, two decimals
#[must_use]
pub fn wpctl_volume(level: u8) -> String {
    format!("{:.2}", f64::from(level) / 100.0 * 1.5)
}

impl AudioBackend for PipeWireBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PipeWire
    }

    fn set_default(&self, endpoint: &AudioEndpointRecord) -> Invocation {
        Invocation::new("wpctl").args(["set-default", endpoint.id.as_str()])
    }

    fn set_volume(&self, endpoint: &AudioEndpointRecord, level: u8) -> Invocation {
        Invocation::new("wpctl").args(["set-volume".to_string(), endpoint.id.clone(), wpctl_volume(level)])
    }

    fn set_mute(&self, endpoint: &AudioEndpointRecord, muted: bool) -> Invocation {
        Invocation::new("wpctl").args([
            "set-mute".to_string(),
            endpoint.id.clone(),
            u8::from(muted).to_string(),
        ])
    }
}

/// Probe for a PulseAudio server, then WirePlumber
///
/// Falls back to PulseAudio when neither answers.
pub fn detect_backend(runner: &dyn CommandRunner) -> Box<dyn AudioBackend> {
    if let Ok(out) = run_checked(runner, &Invocation::new("pactl").arg("info"))
        && out.stdout.contains("PulseAudio")
    {
        debug!("Detected PulseAudio");
        return Box::new(PulseBackend);
    }
    if run_checked(runner, &Invocation::new("wpctl").arg("status")).is_ok() {
        debug!("Detected PipeWire");
        return Box::new(PipeWireBackend);
    }
    warn!("Could not determine audio system, defaulting to PulseAudio");
    Box::new(PulseBackend)
}

/// Audio endpoint control over a privately refreshed inventory
pub struct AudioController {
    runner: Rc<dyn CommandRunner>,
    discovery: Rc<dyn Discovery>,
    backend: Box<dyn AudioBackend>,
    inventory: AudioInventory,
}

impl AudioController {
    /// Detect the backend and take an initial snapshot
    pub fn new(runner: Rc<dyn CommandRunner>, discovery: Rc<dyn Discovery>) -> Self {
        let backend = detect_backend(runner.as_ref());
        Self::with_backend(runner, discovery, backend)
    }

    pub fn with_backend(
        runner: Rc<dyn CommandRunner>,
        discovery: Rc<dyn Discovery>,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        let mut controller = Self {
            runner,
            discovery,
            backend,
            inventory: AudioInventory::default(),
        };
        controller.refresh();
        controller
    }

    pub fn refresh(&mut self) {
        self.inventory = self.discovery.discover_audio();
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn inventory(&self) -> &AudioInventory {
        &self.inventory
    }

    /// Exact name first, then keyword match over name and description
    #[must_use]
    pub fn get_device(&self, keyword: &str, direction: AudioDirection) -> Option<&AudioEndpointRecord> {
        let pool = self.inventory.pool(direction);
        pool.iter()
            .find(|e| e.name == keyword)
            .or_else(|| find_audio(keyword, pool))
    }

    fn resolve(&self, keyword: &str, direction: AudioDirection) -> Result<AudioEndpointRecord, DeviceError> {
        let kind = match direction {
            AudioDirection::Output => DeviceKind::AudioOutput,
            AudioDirection::Input => DeviceKind::AudioInput,
        };
        self.get_device(keyword, direction)
            .cloned()
            .ok_or_else(|| DeviceError::not_found(kind, keyword))
    }

    fn set_default(&mut self, keyword: &str, direction: AudioDirection) -> Result<(), DeviceError> {
        let endpoint = self.resolve(keyword, direction)?;
        let result = run_checked(self.runner.as_ref(), &self.backend.set_default(&endpoint)).map(|_| ());
        if result.is_ok() {
            info!("Default {} set to {}", direction_label(direction), endpoint.name);
            if direction == AudioDirection::Output {
                self.backend.migrate_streams(self.runner.as_ref(), &endpoint);
            }
        }
        self.refresh();
        result
    }

    /// Make an output the default and move running playback onto it
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] or the error of the set-default command.
    /// Stream moves never fail the call.
    pub fn set_default_output(&mut self, name_or_keyword: &str) -> Result<(), DeviceError> {
        self.set_default(name_or_keyword, AudioDirection::Output)
    }

    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn set_default_input(&mut self, name_or_keyword: &str) -> Result<(), DeviceError> {
        self.set_default(name_or_keyword, AudioDirection::Input)
    }

    /// Set volume, clamping `level` into 0..=100 first
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn set_volume(
        &self,
        name_or_keyword: &str,
        level: i64,
        direction: AudioDirection,
    ) -> Result<(), DeviceError> {
        let endpoint = self.resolve(name_or_keyword, direction)?;
        let clamped = u8::try_from(level.clamp(0, 100)).unwrap_or(100);
        if i64::from(clamped) != level {
            debug!("Volume {} clamped to {}", level, clamped);
        }
        run_checked(self.runner.as_ref(), &self.backend.set_volume(&endpoint, clamped))?;
        info!("Volume of {} set to {}%", endpoint.name, clamped);
        Ok(())
    }

    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn mute(&self, name_or_keyword: &str, muted: bool, direction: AudioDirection) -> Result<(), DeviceError> {
        let endpoint = self.resolve(name_or_keyword, direction)?;
        run_checked(self.runner.as_ref(), &self.backend.set_mute(&endpoint, muted))?;
        info!("{} {}", if muted { "Muted" } else { "Unmuted" }, endpoint.name);
        Ok(())
    }
}

fn direction_label(direction: AudioDirection) -> &'static str {
    match direction {
        AudioDirection::Output => "output",
        AudioDirection::Input => "input",
    }
}
