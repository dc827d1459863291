//! Saved profiles
//!
//! A profile is a user-saved layout with the same shape as a macro, stored as
//! one TOML file per profile under `$XDG_CONFIG_HOME/deskmode/profiles/`.

use color_eyre::eyre::{self, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::{AudioSettings, Config, DisplaySettings, LayoutDisplays, write_private};
use crate::devices::{AudioDirection, AudioInventory, DisplayRecord};

/// Volume stored in profiles built from detected devices
pub const DEFAULT_PROFILE_VOLUME: u8 = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDefinition {
    pub name: String,
    pub description: String,
    pub displays: LayoutDisplays,
    pub audio: AudioSettings,
}

/// Hand-picked changes on top of a detected profile
#[derive(Debug, Clone, Default)]
pub struct ProfileOverrides {
    pub primary_display: Option<String>,
    pub enable_displays: Vec<String>,
    pub audio_output: Option<String>,
    pub audio_input: Option<String>,
    pub volume: Option<u8>,
}

impl ProfileDefinition {
    /// Snapshot the current hardware state
    ///
    /// The primary display (or the first one) is kept on and primary; every
    /// other display is switched off. Audio uses the current defaults.
    #[must_use]
    pub fn from_detected(
        name: &str,
        description: &str,
        displays: &[DisplayRecord],
        audio: &AudioInventory,
    ) -> Self {
        let primary = displays
            .iter()
            .find(|d| d.primary)
            .or_else(|| displays.first())
            .map(|d| d.name.as_str());

        let layout = displays
            .iter()
            .map(|d| {
                let settings = if Some(d.name.as_str()) == primary {
                    DisplaySettings {
                        enabled: Some(true),
                        primary: Some(true),
                        ..DisplaySettings::default()
                    }
                } else {
                    DisplaySettings {
                        enabled: Some(false),
                        ..DisplaySettings::default()
                    }
                };
                (d.name.clone(), settings)
            })
            .collect();

        Self {
            name: name.to_string(),
            description: description.to_string(),
            displays: layout,
            audio: AudioSettings {
                output: audio
                    .default_endpoint(AudioDirection::Output)
                    .map(|e| e.name.clone()),
                input: audio
                    .default_endpoint(AudioDirection::Input)
                    .map(|e| e.name.clone()),
                volume: Some(DEFAULT_PROFILE_VOLUME),
            },
        }
    }

    /// # Errors
    /// Returns an error if a named display is not part of the profile or the
    /// volume is above 100.
    pub fn apply_overrides(&mut self, overrides: &ProfileOverrides) -> Result<()> {
        let known = |layout: &LayoutDisplays, name: &str| -> Result<()> {
            if layout.get(name).is_none() {
                let available: Vec<&str> = layout.iter().map(|(k, _)| k).collect();
                eyre::bail!("Display '{name}' not detected. Available: [{}]", available.join(", "));
            }
            Ok(())
        };

        if let Some(ref primary) = overrides.primary_display {
            known(&self.displays, primary)?;
            self.displays = self
                .displays
                .iter()
                .map(|(key, settings)| {
                    let is_primary = key == primary;
                    let mut settings = settings.clone();
                    settings.primary = is_primary.then_some(true);
                    if is_primary {
                        settings.enabled = Some(true);
                    }
                    (key.to_string(), settings)
                })
                .collect();
        }

        for name in &overrides.enable_displays {
            known(&self.displays, name)?;
            if let Some(settings) = self.displays.get(name) {
                let settings = DisplaySettings {
                    enabled: Some(true),
                    ..settings.clone()
                };
                self.displays.insert(name.clone(), settings);
            }
        }

        if let Some(ref output) = overrides.audio_output {
            self.audio.output = Some(output.clone());
        }
        if let Some(ref input) = overrides.audio_input {
            self.audio.input = Some(input.clone());
        }
        if let Some(volume) = overrides.volume {
            if volume > 100 {
                eyre::bail!("Volume {volume} is out of range (0-100)");
            }
            self.audio.volume = Some(volume);
        }
        Ok(())
    }
}

/// Listing entry for `profile --list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    /// File stem with underscores turned back into spaces
    pub id: String,
    /// Name stored inside the file
    pub name: String,
    pub description: String,
    pub path: PathBuf,
}

/// Directory of profile files
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Open the default store, creating its directory if needed
    ///
    /// # Errors
    /// Returns an error if the directory cannot be determined or created.
    pub fn open() -> Result<Self> {
        let dir = Config::config_dir()?.join("profiles");
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create profiles dir: {dir:?}"))?;
        Ok(Self::new(dir))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for a profile: lowercase, spaces as underscores
    ///
    /// # Errors
    /// Returns an error if the name could point outside the profile directory.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let stem = name.to_lowercase().replace(' ', "_");
        if stem.is_empty() || stem.contains(['/', '\\']) || stem.starts_with('.') {
            eyre::bail!("Invalid profile name '{name}'");
        }
        Ok(self.dir.join(format!("{stem}.toml")))
    }

    /// All readable profiles, sorted by file name
    ///
    /// Unreadable files are logged and skipped.
    ///
    /// # Errors
    /// Returns an error only if the directory itself cannot be read.
    pub fn list(&self) -> Result<Vec<ProfileSummary>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read profiles dir: {:?}", self.dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut profiles = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read(&path) {
                Ok(profile) => {
                    let id = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().replace('_', " "))
                        .unwrap_or_default();
                    profiles.push(ProfileSummary {
                        name: if profile.name.is_empty() { id.clone() } else { profile.name },
                        id,
                        description: profile.description,
                        path,
                    });
                }
                Err(e) => error!("Error reading profile {:?}: {:#}", path, e),
            }
        }
        Ok(profiles)
    }

    fn read(path: &Path) -> Result<ProfileDefinition> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {path:?}"))?;
        let profile: ProfileDefinition = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse profile: {path:?}"))?;
        if let Some(volume) = profile.audio.volume
            && volume > 100
        {
            eyre::bail!("Profile {path:?}: volume {volume} is out of range (0-100)");
        }
        Ok(profile)
    }

    /// # Errors
    /// Returns an error if the profile does not exist or cannot be parsed.
    pub fn get(&self, name: &str) -> Result<ProfileDefinition> {
        let path = self.path_for(name)?;
        if !path.exists() {
            eyre::bail!("Profile '{name}' not found");
        }
        Self::read(&path)
    }

    /// Create or replace a profile, returning the file written
    ///
    /// # Errors
    /// Returns an error if the profile cannot be serialized or written.
    pub fn save(&self, profile: &ProfileDefinition) -> Result<PathBuf> {
        if profile.name.trim().is_empty() {
            eyre::bail!("Profile name must not be empty");
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create profiles dir: {:?}", self.dir))?;
        let path = self.path_for(&profile.name)?;
        let contents = toml::to_string_pretty(profile).context("Failed to serialize profile")?;
        write_private(&path, &contents)?;
        info!("Profile {} saved to {:?}", profile.name, path);
        Ok(path)
    }

    /// # Errors
    /// Returns an error if the profile does not exist or cannot be removed.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if !path.exists() {
            eyre::bail!("Profile '{name}' not found");
        }
        fs::remove_file(&path).with_context(|| format!("Failed to delete profile: {path:?}"))?;
        info!("Profile {} deleted", name);
        Ok(())
    }
}
