//! CLI commands
//!
//! Each handler returns `Ok(true)` when everything it attempted succeeded,
//! `Ok(false)` when a step failed (already logged), and `Err` for problems
//! that stop it before any device work, such as a broken config or an unknown
//! profile.

use color_eyre::eyre::{self, Context as _, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::apply::Workstation;
use crate::audio::BackendKind;
use crate::cli::Command;
use crate::config::{Config, describe_audio, describe_display, write_private};
use crate::devices::{AudioDirection, AudioEndpointRecord, AudioInventory, DisplayRecord};
use crate::discovery::{Discovery, SystemDiscovery};
use crate::display::Position;
use crate::error::DeviceError;
use crate::mapper::{DeviceMapping, KeywordRules};
use crate::notification::notify_applied;
use crate::profiles::{ProfileDefinition, ProfileOverrides, ProfileStore};
use crate::shell::{CommandRunner, SystemRunner, tool_exists};
use crate::style::DeskStyle;

/// Everything a command needs: config, profile store and the system seams
pub struct Context {
    pub config: Config,
    pub config_path: PathBuf,
    pub profiles: ProfileStore,
    pub runner: Rc<dyn CommandRunner>,
    pub discovery: Rc<dyn Discovery>,
}

impl Context {
    /// Load the user config and wire up the real shell
    ///
    /// # Errors
    /// Returns an error if the config cannot be loaded or the profile
    /// directory cannot be created.
    pub fn load() -> Result<Self> {
        let config = Config::load()?;
        let config_path = Config::get_config_path()?;
        let profiles = ProfileStore::open()?;
        let runner: Rc<dyn CommandRunner> = Rc::new(SystemRunner::new(Duration::from_secs(
            config.settings.command_timeout_secs,
        )));
        let discovery: Rc<dyn Discovery> = Rc::new(SystemDiscovery::new(Rc::clone(&runner)));
        Ok(Self {
            config,
            config_path,
            profiles,
            runner,
            discovery,
        })
    }

    fn workstation(&self) -> Workstation {
        Workstation::new(&self.config, Rc::clone(&self.runner), Rc::clone(&self.discovery))
    }
}

/// Load the context, check tools if needed, and run one command
///
/// # Errors
/// See [`execute`].
pub fn run(command: &Command) -> Result<bool> {
    let mut ctx = Context::load()?;
    if command.touches_hardware() && !check_tools() {
        error!("Missing required dependencies");
        return Ok(false);
    }
    execute(command, &mut ctx)
}

/// # Errors
/// Returns an error for config, profile or I/O problems. Device failures are
/// reported through `Ok(false)`.
pub fn execute(command: &Command, ctx: &mut Context) -> Result<bool> {
    match command {
        Command::Detect { save, json } => detect(ctx, save.as_deref(), *json),
        Command::Apply { macro_name, profile } => apply(ctx, macro_name.as_deref(), profile.as_deref()),
        Command::Display {
            list,
            json,
            enable,
            mode,
            position,
            relative_to,
            disable,
            primary,
        } => {
            let action = if *list {
                DisplayAction::List { json: *json }
            } else if let Some(name) = enable {
                DisplayAction::Enable {
                    name,
                    mode: mode.as_deref(),
                    position: *position,
                    relative_to: relative_to.as_deref(),
                }
            } else if let Some(name) = disable {
                DisplayAction::Disable(name)
            } else if let Some(name) = primary {
                DisplayAction::Primary(name)
            } else {
                eyre::bail!("No display action given");
            };
            display(ctx, &action)
        }
        Command::Audio {
            list,
            json,
            output,
            input,
            volume,
            mute,
            unmute,
            device,
            source,
        } => {
            let action = if *list {
                AudioAction::List { json: *json }
            } else if let Some(name) = output {
                AudioAction::Output(name)
            } else if let Some(name) = input {
                AudioAction::Input(name)
            } else if let Some(level) = volume {
                AudioAction::Volume(*level)
            } else if *mute || *unmute {
                AudioAction::Mute(*mute)
            } else {
                eyre::bail!("No audio action given");
            };
            let direction = if *source {
                AudioDirection::Input
            } else {
                AudioDirection::Output
            };
            audio(ctx, &action, device.as_deref(), direction)
        }
        Command::Config { show, update, reset } => {
            if *show {
                ctx.config.print_summary();
                Ok(true)
            } else if let Some(path) = update {
                update_config(ctx, path)
            } else if *reset {
                ctx.config = Config::reset_at(&ctx.config_path)?;
                println!("{} {}", "Configuration reset:".success(), ctx.config_path.display());
                Ok(true)
            } else {
                eyre::bail!("No config action given")
            }
        }
        Command::Profile {
            list,
            create,
            delete,
            show,
            description,
            primary_display,
            enable_displays,
            audio_output,
            audio_input,
            volume,
        } => {
            if *list {
                list_profiles(&ctx.profiles)
            } else if let Some(name) = create {
                let overrides = ProfileOverrides {
                    primary_display: primary_display.clone(),
                    enable_displays: enable_displays
                        .iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect(),
                    audio_output: audio_output.clone(),
                    audio_input: audio_input.clone(),
                    volume: *volume,
                };
                create_profile(ctx, name, description.as_deref(), &overrides)
            } else if let Some(name) = delete {
                ctx.profiles.delete(name)?;
                println!("{} {}", "Deleted profile".success(), name.as_str().technical());
                Ok(true)
            } else if let Some(name) = show {
                show_profile(&ctx.profiles, name)
            } else {
                eyre::bail!("No profile action given")
            }
        }
    }
}

/// Verify the external tools are on `PATH`, logging install hints
#[must_use]
pub fn check_tools() -> bool {
    let mut all_met = true;

    if !tool_exists("xrandr") {
        error!("Required command 'xrandr' not found. Install the xorg-xrandr package");
        all_met = false;
    }

    if !["pactl", "wpctl"].iter().any(|tool| tool_exists(tool)) {
        error!("No supported audio system found");
        error!("Install either pulseaudio-utils (pactl) or wireplumber (wpctl)");
        all_met = false;
    }

    all_met
}

// ============================================================================
// Detect
// ============================================================================

/// Everything `detect` reports
#[derive(Debug, Serialize)]
pub struct DetectionReport<'a> {
    pub displays: &'a [DisplayRecord],
    pub audio: &'a AudioInventory,
    pub backend: BackendKind,
    pub mappings: &'a DeviceMapping,
}

fn detect(ctx: &Context, save: Option<&Path>, json: bool) -> Result<bool> {
    let station = ctx.workstation();
    let report = DetectionReport {
        displays: station.mapper.displays(),
        audio: station.mapper.audio(),
        backend: station.audio.backend_kind(),
        mappings: station.mapper.mapping(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &ctx.config);
    }

    if let Some(path) = save {
        let path = if path.is_relative() {
            ctx.config_path
                .parent()
                .map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
        } else {
            path.to_path_buf()
        };
        let contents = serde_json::to_string_pretty(&report).context("Failed to serialize detection results")?;
        write_private(&path, &contents)?;
        info!("Saved detection results to {:?}", path);
    }

    Ok(true)
}

fn print_report(report: &DetectionReport<'_>, config: &Config) {
    println!("{}", "DISPLAYS:".header());
    if report.displays.is_empty() {
        println!("  {}", "(none connected)".secondary());
    }
    for display in report.displays {
        print_display(display);
    }

    for (title, direction) in [("AUDIO OUTPUTS:", AudioDirection::Output), ("AUDIO INPUTS:", AudioDirection::Input)] {
        println!("\n{}", title.header());
        let pool = report.audio.pool(direction);
        if pool.is_empty() {
            println!("  {}", "(none)".secondary());
        }
        for endpoint in pool {
            print_endpoint(endpoint);
        }
    }

    println!("\n{} {}", "AUDIO BACKEND:".header(), report.backend.to_string().technical());

    println!("\n{}", "MAPPINGS:".header());
    print_mapping("display", &config.displays.keywords, &report.mappings.displays);
    print_mapping("output", &config.audio.keywords, &report.mappings.audio_outputs);
    print_mapping("input", &config.audio.keywords, &report.mappings.audio_inputs);
}

fn print_display(display: &DisplayRecord) {
    let marker = if display.primary { "* " } else { "  " };
    let state = if display.active {
        display
            .current_resolution
            .as_deref()
            .unwrap_or("on")
            .success()
            .to_string()
    } else {
        "off".warning().to_string()
    };
    println!("{}{} {}", marker, display.name.as_str().technical(), state);
    if !display.available_resolutions.is_empty() {
        println!("    {}", display.available_resolutions.join(" ").secondary());
    }
}

fn print_endpoint(endpoint: &AudioEndpointRecord) {
    let marker = if endpoint.is_default { "* " } else { "  " };
    println!(
        "{}{} {}",
        marker,
        endpoint.name.as_str().technical(),
        format!("[{}]", endpoint.id).secondary()
    );
    println!("    {}", endpoint.description.as_str().secondary());
}

fn print_mapping(label: &str, rules: &KeywordRules, resolved: &BTreeMap<String, String>) {
    for logical in rules.keys() {
        match resolved.get(logical) {
            Some(physical) => println!("  {label:<8} {logical} -> {}", physical.as_str().technical()),
            None => println!("  {label:<8} {logical} -> {}", "(unmapped)".warning()),
        }
    }
}

// ============================================================================
// Apply
// ============================================================================

fn apply(ctx: &Context, macro_name: Option<&str>, profile: Option<&str>) -> Result<bool> {
    let (name, displays, audio) = match (macro_name, profile) {
        (_, Some(profile)) => {
            let definition = ctx.profiles.get(profile)?;
            let name = if definition.name.is_empty() {
                profile.to_string()
            } else {
                definition.name
            };
            (name, definition.displays, definition.audio)
        }
        (Some(macro_name), None) => {
            let (key, definition) = ctx.config.macro_named(macro_name)?;
            (key, definition.displays.clone(), definition.audio.clone())
        }
        (None, None) => eyre::bail!("Specify a macro or --profile"),
    };

    info!("Applying {}", name);
    for (key, settings) in displays.iter() {
        info!("  {}: {}", key, describe_display(settings));
    }
    if let Some(line) = describe_audio(&audio) {
        info!("  audio: {}", line);
    }

    let mut station = ctx.workstation();
    let success = station.apply(&displays, &audio);

    if success {
        println!("{} {}", "Applied".success(), name.as_str().technical());
        if ctx.config.settings.notify {
            notify_applied(&name, &displays, &audio);
        }
    } else {
        error!("Failed to apply {}", name);
    }
    Ok(success)
}

// ============================================================================
// Display / Audio
// ============================================================================

pub enum DisplayAction<'a> {
    List {
        json: bool,
    },
    Enable {
        name: &'a str,
        mode: Option<&'a str>,
        position: Option<Position>,
        relative_to: Option<&'a str>,
    },
    Disable(&'a str),
    Primary(&'a str),
}

fn outcome(what: &str, result: Result<(), DeviceError>) -> bool {
    match result {
        Ok(()) => {
            println!("{} {}", "Done:".success(), what);
            true
        }
        Err(e) => {
            error!("{}: {}", what, e);
            false
        }
    }
}

fn display(ctx: &Context, action: &DisplayAction<'_>) -> Result<bool> {
    let mut station = ctx.workstation();
    let physical = |name: &str| -> String { station.mapper.get_display(name).unwrap_or(name).to_string() };

    let success = match *action {
        DisplayAction::List { json } => {
            let displays = station.displays.displays();
            if json {
                println!("{}", serde_json::to_string_pretty(displays)?);
            } else {
                println!("{}", "DISPLAYS:".header());
                for display in displays {
                    print_display(display);
                }
            }
            true
        }
        DisplayAction::Enable {
            name,
            mode,
            position,
            relative_to,
        } => {
            let target = physical(name);
            let reference = relative_to.map(&physical);
            let result = station
                .displays
                .enable(&target, mode, position, reference.as_deref());
            outcome(&format!("enable {target}"), result)
        }
        DisplayAction::Disable(name) => {
            let target = physical(name);
            outcome(&format!("disable {target}"), station.displays.disable(&target))
        }
        DisplayAction::Primary(name) => {
            let target = physical(name);
            outcome(&format!("set {target} as primary"), station.displays.set_primary(&target))
        }
    };
    Ok(success)
}

pub enum AudioAction<'a> {
    List { json: bool },
    Output(&'a str),
    Input(&'a str),
    Volume(i64),
    Mute(bool),
}

fn audio(ctx: &Context, action: &AudioAction<'_>, device: Option<&str>, direction: AudioDirection) -> Result<bool> {
    let mut station = ctx.workstation();
    let mapper = &station.mapper;
    let physical = |name: &str, direction: AudioDirection| -> String {
        let mapped = match direction {
            AudioDirection::Output => mapper.get_audio_output(name),
            AudioDirection::Input => mapper.get_audio_input(name),
        };
        mapped.unwrap_or(name).to_string()
    };

    let target = match device {
        Some(name) => Some(physical(name, direction)),
        None => station
            .audio
            .inventory()
            .default_endpoint(direction)
            .map(|e| e.name.clone()),
    };

    let success = match *action {
        AudioAction::List { json } => {
            let inventory = station.audio.inventory();
            if json {
                println!("{}", serde_json::to_string_pretty(inventory)?);
            } else {
                println!("{} {}", "AUDIO BACKEND:".header(), station.audio.backend_kind().to_string().technical());
                for (title, direction) in [("OUTPUTS:", AudioDirection::Output), ("INPUTS:", AudioDirection::Input)] {
                    println!("\n{}", title.header());
                    for endpoint in inventory.pool(direction) {
                        print_endpoint(endpoint);
                    }
                }
            }
            true
        }
        AudioAction::Output(name) => {
            let target = physical(name, AudioDirection::Output);
            outcome(&format!("default output {target}"), station.audio.set_default_output(&target))
        }
        AudioAction::Input(name) => {
            let target = physical(name, AudioDirection::Input);
            outcome(&format!("default input {target}"), station.audio.set_default_input(&target))
        }
        AudioAction::Volume(level) => match target {
            Some(ref target) => outcome(
                &format!("volume of {target}"),
                station.audio.set_volume(target, level, direction),
            ),
            None => {
                warn!("No default audio device to set the volume on; use --device");
                false
            }
        },
        AudioAction::Mute(muted) => match target {
            Some(ref target) => outcome(
                &format!("{} {target}", if muted { "mute" } else { "unmute" }),
                station.audio.mute(target, muted, direction),
            ),
            None => {
                warn!("No default audio device to mute; use --device");
                false
            }
        },
    };
    Ok(success)
}

// ============================================================================
// Config / Profiles
// ============================================================================

fn update_config(ctx: &mut Context, path: &Path) -> Result<bool> {
    let mut updated = ctx.config.clone();
    updated.update_from_file(path)?;
    updated.save_to(&ctx.config_path)?;
    ctx.config = updated;
    println!("{} {}", "Configuration updated:".success(), ctx.config_path.display());
    Ok(true)
}

fn list_profiles(store: &ProfileStore) -> Result<bool> {
    let profiles = store.list()?;
    if profiles.is_empty() {
        println!("No profiles found.");
        return Ok(true);
    }

    println!("{}", "PROFILES:".header());
    for profile in profiles {
        let description = if profile.description.is_empty() {
            String::new()
        } else {
            format!(" {}", profile.description.as_str().secondary())
        };
        println!("  {}{}", profile.id.as_str().technical(), description);
    }
    Ok(true)
}

fn create_profile(
    ctx: &Context,
    name: &str,
    description: Option<&str>,
    overrides: &ProfileOverrides,
) -> Result<bool> {
    let displays = ctx.discovery.discover_displays();
    let audio = ctx.discovery.discover_audio();
    let description = description.map_or_else(
        || format!("Snapshot of {} connected display(s)", displays.len()),
        str::to_string,
    );

    let mut profile = ProfileDefinition::from_detected(name, &description, &displays, &audio);
    profile.apply_overrides(overrides)?;
    let path = ctx.profiles.save(&profile)?;
    println!("{} {} -> {}", "Created profile".success(), name.technical(), path.display());
    Ok(true)
}

fn show_profile(store: &ProfileStore, name: &str) -> Result<bool> {
    let profile = store.get(name)?;
    print!("{}", toml::to_string_pretty(&profile).context("Failed to serialize profile")?);
    Ok(true)
}
