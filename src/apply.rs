//! Layout application
//!
//! Realises a macro or profile: display entries are resolved through the
//! mapper and handed to [`DisplayController::configure`] as one layout, then
//! audio output, input and volume are set. Every step is attempted; the result
//! is true only if all of them succeeded.

use std::rc::Rc;
use tracing::{error, info, warn};

use crate::audio::AudioController;
use crate::config::{AudioSettings, Config, DisplaySettings, LayoutDisplays};
use crate::devices::AudioDirection;
use crate::discovery::Discovery;
use crate::display::DisplayController;
use crate::mapper::DeviceMapper;
use crate::shell::CommandRunner;

/// Mapper plus both controllers, built from one config
pub struct Workstation {
    pub mapper: DeviceMapper,
    pub displays: DisplayController,
    pub audio: AudioController,
}

impl Workstation {
    pub fn new(config: &Config, runner: Rc<dyn CommandRunner>, discovery: Rc<dyn Discovery>) -> Self {
        let mapper = DeviceMapper::new(
            Rc::clone(&discovery),
            config.displays.keywords.clone(),
            config.audio.keywords.clone(),
        );
        let displays = DisplayController::new(Rc::clone(&runner), Rc::clone(&discovery));
        let audio = AudioController::new(runner, discovery);
        Self {
            mapper,
            displays,
            audio,
        }
    }

    /// Apply a layout; see [`apply`]
    pub fn apply(&mut self, displays: &LayoutDisplays, audio: &AudioSettings) -> bool {
        apply(displays, audio, &self.mapper, &mut self.displays, &mut self.audio)
    }
}

/// Translate layout keys and `relative_to` references into physical names
///
/// Returns the resolved layout and whether every entry resolved. A key that is
/// neither a mapped logical name nor a connected output is dropped.
#[must_use]
pub fn resolve_layout(
    layout: &LayoutDisplays,
    mapper: &DeviceMapper,
    display_ctrl: &DisplayController,
) -> (LayoutDisplays, bool) {
    let known = |name: &str| display_ctrl.displays().iter().any(|d| d.name == name);
    let mut resolved = LayoutDisplays::default();
    let mut complete = true;

    for (key, settings) in layout.iter() {
        let physical = match settings.output.as_deref() {
            Some(output) => Some(output.to_string()),
            None => mapper
                .get_display(key)
                .map(str::to_string)
                .or_else(|| known(key).then(|| key.to_string())),
        };
        let Some(physical) = physical else {
            warn!("Display '{}' not found in mappings, skipping", key);
            complete = false;
            continue;
        };
        if resolved.get(&physical).is_some() {
            warn!("'{}' resolves to {} which is already in the layout", key, physical);
        }

        let relative_to = settings
            .relative_to
            .as_deref()
            .map(|r| mapper.get_display(r).unwrap_or(r).to_string());
        resolved.insert(
            physical,
            DisplaySettings {
                relative_to,
                output: None,
                ..settings.clone()
            },
        );
    }

    (resolved, complete)
}

/// Apply displays then audio, continuing past failures
pub fn apply(
    displays: &LayoutDisplays,
    audio: &AudioSettings,
    mapper: &DeviceMapper,
    display_ctrl: &mut DisplayController,
    audio_ctrl: &mut AudioController,
) -> bool {
    let mut success = true;

    if !displays.is_empty() {
        let (resolved, complete) = resolve_layout(displays, mapper, display_ctrl);
        success &= complete;
        if !resolved.iter().any(|(_, settings)| settings.enabled == Some(true)) {
            // configure() turns every output off before enabling any
            warn!("No enabled display in the layout could be resolved, leaving displays unchanged");
        } else if display_ctrl.configure(&resolved) {
            info!("Display layout applied");
        } else {
            success = false;
        }
    }

    let mut volume_target = None;
    if let Some(ref output) = audio.output {
        let physical = mapper.get_audio_output(output).unwrap_or(output);
        match audio_ctrl.get_device(physical, AudioDirection::Output) {
            Some(endpoint) => volume_target = Some(endpoint.name.clone()),
            None => warn!("Audio output '{}' not found", output),
        }
        if let Err(e) = audio_ctrl.set_default_output(physical) {
            error!("Failed to set audio output: {}", e);
            success = false;
        }
    }

    if let Some(ref input) = audio.input {
        let physical = mapper.get_audio_input(input).unwrap_or(input);
        if let Err(e) = audio_ctrl.set_default_input(physical) {
            error!("Failed to set audio input: {}", e);
            success = false;
        }
    }

    if let Some(volume) = audio.volume {
        match volume_target {
            Some(ref target) => {
                if let Err(e) = audio_ctrl.set_volume(target, i64::from(volume), AudioDirection::Output) {
                    error!("Failed to set volume: {}", e);
                    success = false;
                }
            }
            None => warn!("No resolved audio output, volume not applied"),
        }
    }

    success
}
