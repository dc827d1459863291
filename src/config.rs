//! Configuration management
//!
//! Loads, validates and persists the TOML configuration: global settings,
//! keyword rules for displays and audio, and the macro layouts built from them.

use color_eyre::eyre::{self, Context, ContextCompat, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::display::Position;
use crate::mapper::KeywordRules;

/// Directory name under the XDG config/data dirs
pub const APP_DIR: &str = "deskmode";

// ============================================================================
// Layout Types
// ============================================================================

/// How one display should look after a layout is applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    /// Mode such as `1920x1080`; `xrandr --auto` when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_to: Option<String>,
    /// Physical output name, overriding the entry's key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl DisplaySettings {
    /// Name to act on: the `output` override, else the entry key
    #[must_use]
    pub fn target<'a>(&'a self, key: &'a str) -> &'a str {
        self.output.as_deref().unwrap_or(key)
    }
}

/// Audio part of a layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// 0..=100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
}

/// Display entries of a layout, kept in file order
///
/// Order matters: displays without an explicit reference are placed relative
/// to the first one enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutDisplays(Vec<(String, DisplaySettings)>);

impl LayoutDisplays {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DisplaySettings)> {
        self.0.iter().map(|(key, settings)| (key.as_str(), settings))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DisplaySettings> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    /// Replace an existing entry in place or append a new one
    pub fn insert(&mut self, key: String, settings: DisplaySettings) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = settings,
            None => self.0.push((key, settings)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(String, DisplaySettings)>> for LayoutDisplays {
    fn from(entries: Vec<(String, DisplaySettings)>) -> Self {
        entries.into_iter().collect()
    }
}

impl FromIterator<(String, DisplaySettings)> for LayoutDisplays {
    fn from_iter<I: IntoIterator<Item = (String, DisplaySettings)>>(iter: I) -> Self {
        let mut layout = Self::default();
        for (key, settings) in iter {
            layout.insert(key, settings);
        }
        layout
    }
}

impl Serialize for LayoutDisplays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, settings) in &self.0 {
            map.serialize_entry(key, settings)?;
        }
        map.end()
    }
}

struct LayoutVisitor;

impl<'de> Visitor<'de> for LayoutVisitor {
    type Value = LayoutDisplays;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table of display settings")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut layout = LayoutDisplays::default();
        while let Some((key, settings)) = access.next_entry::<String, DisplaySettings>()? {
            layout.insert(key, settings);
        }
        Ok(layout)
    }
}

impl<'de> Deserialize<'de> for LayoutDisplays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(LayoutVisitor)
    }
}

/// A predefined layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroDefinition {
    pub description: String,
    pub displays: LayoutDisplays,
    pub audio: AudioSettings,
}

// ============================================================================
// Configuration
// ============================================================================

/// Global settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Time budget for each external command
    pub command_timeout_secs: u64,
    /// Desktop notification after a layout was applied
    pub notify: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_timeout_secs: crate::shell::DEFAULT_TIMEOUT_SECS,
            notify: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordSection {
    pub keywords: KeywordRules,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub settings: Settings,
    pub displays: KeywordSection,
    pub audio: KeywordSection,
    pub macros: BTreeMap<String, MacroDefinition>,
}

const DEFAULT_CONFIG: &str = r#"# deskmode configuration
#
# Keywords map logical names ("desk", "tv") to physical devices. For each
# name the keywords are tried in order; the first one that appears in a
# device name (or audio description) wins. Matching is case-insensitive.
# Run 'deskmode detect' to see what is connected and what got mapped.

[settings]
command_timeout_secs = 30   # per xrandr/pactl/wpctl call
notify = false              # desktop notification after 'apply'

[displays.keywords]
desk = ["DP", "HDMI-0", "primary"]
tv = ["HDMI-1", "HDMI-2", "living", "TV"]

[audio.keywords]
desk = ["built-in", "headphone", "analog", "desk"]
tv = ["hdmi", "digital", "tv", "living"]

# Macros
# Display keys are logical names (or physical outputs). Settings:
#   enabled, primary, resolution = "1920x1080",
#   position = "right_of" | "left_of" | "above" | "below" | "same_as",
#   relative_to = <display>
# Audio: output, input (logical names or keywords), volume = 0..100

[macros.desk_mode]
description = "Desk mode (disable TV, enable desk)"
displays.desk = { enabled = true, primary = true }
displays.tv = { enabled = false }
audio = { output = "desk", volume = 50 }

[macros.tv_mode]
description = "TV mode (disable desk, enable TV)"
displays.desk = { enabled = false }
displays.tv = { enabled = true, primary = true }
audio = { output = "tv", volume = 70 }

[macros.dual_mode]
description = "Dual mode (enable both, desk primary)"
displays.desk = { enabled = true, primary = true }
displays.tv = { enabled = true, position = "right_of", relative_to = "desk" }
audio = { output = "desk", volume = 50 }
"#;

impl Config {
    /// Built-in defaults (the same document `reset` writes)
    ///
    /// # Errors
    /// Only if the embedded default document is broken.
    pub fn defaults() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG).context("Built-in default config is invalid")
    }

    /// Load configuration from the default XDG config path
    ///
    /// Writes the default config first if none exists.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, read, parsed or validated.
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Creating default config at {:?}", config_path);
            write_private(&config_path, DEFAULT_CONFIG)?;
        }

        Self::load_from_path(&config_path)
    }

    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {path:?}"))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config: {path:?}"))?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.settings.command_timeout_secs == 0 {
            eyre::bail!("command_timeout_secs must be at least 1");
        }

        for (section, rules) in [("displays", &self.displays.keywords), ("audio", &self.audio.keywords)] {
            for (logical, keywords) in rules {
                if keywords.is_empty() {
                    warn!("{} keyword list for '{}' is empty and will never match", section, logical);
                }
            }
        }

        for (name, definition) in &self.macros {
            if let Some(volume) = definition.audio.volume
                && volume > 100
            {
                eyre::bail!("Macro '{name}': volume {volume} is out of range (0-100)");
            }
            let primaries = definition
                .displays
                .iter()
                .filter(|(_, s)| s.enabled == Some(true) && s.primary == Some(true))
                .count();
            if primaries > 1 {
                eyre::bail!("Macro '{name}': {primaries} displays marked primary, only one allowed");
            }
        }

        Ok(())
    }

    /// Get the XDG config directory for deskmode, creating it if needed
    ///
    /// # Errors
    /// Returns an error if the directory cannot be determined or created.
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join(APP_DIR);
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config dir: {config_dir:?}"))?;
        Ok(config_dir)
    }

    /// # Errors
    /// See [`config_dir`](Self::config_dir).
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Write this config to the default path
    ///
    /// # Errors
    /// See [`save_to`](Self::save_to).
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    /// Atomically write this config as TOML (mode 0600)
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        write_private(path, &contents)?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Overwrite the default config file with the built-in defaults
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn reset() -> Result<Self> {
        Self::reset_at(&Self::get_config_path()?)
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn reset_at(path: &Path) -> Result<Self> {
        write_private(path, DEFAULT_CONFIG)?;
        info!("Reset configuration at {:?}", path);
        Self::defaults()
    }

    /// Deep-merge a TOML or JSON document into this config
    ///
    /// Tables merge key by key; any other value replaces the existing one. The
    /// result must still validate, otherwise `self` is left untouched.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or the merged
    /// config is invalid.
    pub fn update_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read update file: {path:?}"))?;

        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let update: toml::Value = if is_json {
            let json: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON: {path:?}"))?;
            toml::Value::try_from(json).context("JSON update cannot be expressed as TOML")?
        } else {
            toml::from_str(&contents).with_context(|| format!("Failed to parse TOML: {path:?}"))?
        };
        let toml::Value::Table(update) = update else {
            eyre::bail!("Update file must contain a table at the top level");
        };

        let toml::Value::Table(mut current) =
            toml::Value::try_from(&*self).context("Failed to serialize config")?
        else {
            eyre::bail!("Config did not serialize to a table");
        };
        deep_merge(&mut current, update);

        let merged: Self = toml::Value::Table(current)
            .try_into()
            .context("Merged config is invalid")?;
        merged.validate()?;
        *self = merged;
        Ok(())
    }

    /// Look up a macro, accepting the short names `desk`, `tv` and `dual`
    ///
    /// # Errors
    /// Returns an error listing the available macros if none matches.
    pub fn macro_named(&self, name: &str) -> Result<(String, &MacroDefinition)> {
        let key = match name {
            "desk" | "tv" | "dual" => format!("{name}_mode"),
            other => other.to_string(),
        };
        match self.macros.get(&key) {
            Some(definition) => Ok((key, definition)),
            None => {
                let available: Vec<&str> = self.macros.keys().map(String::as_str).collect();
                eyre::bail!(
                    "Unknown macro '{}'. Available: [{}]",
                    name,
                    available.join(", ")
                )
            }
        }
    }

    /// Print a human-readable summary of the configuration
    pub fn print_summary(&self) {
        println!("Settings:");
        println!("  command_timeout_secs: {}", self.settings.command_timeout_secs);
        println!("  notify: {}", self.settings.notify);

        for (title, rules) in [("Display keywords", &self.displays.keywords), ("Audio keywords", &self.audio.keywords)] {
            println!("\n{} ({}):", title, rules.len());
            for (logical, keywords) in rules {
                println!("  {}: {}", logical, keywords.join(", "));
            }
        }

        if self.macros.is_empty() {
            println!("\nNo macros configured.");
        } else {
            println!("\nMacros ({}):", self.macros.len());
            for (name, definition) in &self.macros {
                println!("  {name}: {}", definition.description);
                for (display, settings) in definition.displays.iter() {
                    println!("     {display}: {}", describe_display(settings));
                }
                if let Some(line) = describe_audio(&definition.audio) {
                    println!("     audio: {line}");
                }
            }
        }

        if let Ok(path) = Self::get_config_path() {
            println!("\nConfig: {path:?}");
        }
    }
}

/// One-line summary of display settings, e.g. `on, primary, 1920x1080`
#[must_use]
pub fn describe_display(settings: &DisplaySettings) -> String {
    let mut parts = vec![match settings.enabled {
        Some(true) => "on".to_string(),
        Some(false) => "off".to_string(),
        None => "unchanged".to_string(),
    }];
    if settings.primary == Some(true) {
        parts.push("primary".to_string());
    }
    if let Some(ref mode) = settings.resolution {
        parts.push(mode.clone());
    }
    if let Some(ref reference) = settings.relative_to {
        parts.push(format!("{} {reference}", settings.position.unwrap_or_default()));
    }
    if let Some(ref output) = settings.output {
        parts.push(format!("output {output}"));
    }
    parts.join(", ")
}

/// One-line summary of audio settings, `None` if nothing is set
#[must_use]
pub fn describe_audio(audio: &AudioSettings) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(ref output) = audio.output {
        parts.push(format!("output {output}"));
    }
    if let Some(ref input) = audio.input {
        parts.push(format!("input {input}"));
    }
    if let Some(volume) = audio.volume {
        parts.push(format!("volume {volume}%"));
    }
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn deep_merge(target: &mut toml::Table, source: toml::Table) {
    for (key, value) in source {
        match value {
            toml::Value::Table(incoming) if target.get(&key).is_some_and(toml::Value::is_table) => {
                if let Some(toml::Value::Table(existing)) = target.get_mut(&key) {
                    deep_merge(existing, incoming);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

/// Write `contents` via a temp file in the same directory, then rename
///
/// The file is readable by the owner only.
///
/// # Errors
/// Returns an error if the directory is missing or any write step fails.
pub(crate) fn write_private(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {dir:?}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .context("Failed to set file permissions")?;
    }

    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {path:?}"))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn defaults_have_three_macros() {
        let config = Config::defaults().unwrap();
        assert_eq!(
            config.macros.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["desk_mode", "dual_mode", "tv_mode"]
        );
        assert_eq!(config.settings.command_timeout_secs, 30);
        assert!(!config.settings.notify);
        assert_eq!(config.displays.keywords["desk"], vec!["DP", "HDMI-0", "primary"]);
    }

    #[test]
    fn tv_mode_matches_expected_shape() {
        let config = Config::defaults().unwrap();
        let (key, tv) = config.macro_named("tv").unwrap();
        assert_eq!(key, "tv_mode");
        assert_eq!(tv.displays.get("desk").unwrap().enabled, Some(false));
        let tv_display = tv.displays.get("tv").unwrap();
        assert_eq!(tv_display.enabled, Some(true));
        assert_eq!(tv_display.primary, Some(true));
        assert_eq!(tv.audio.output.as_deref(), Some("tv"));
        assert_eq!(tv.audio.volume, Some(70));
    }

    #[test]
    fn dual_mode_positions_tv_right_of_desk() {
        let config = Config::defaults().unwrap();
        let (_, dual) = config.macro_named("dual_mode").unwrap();
        let tv = dual.displays.get("tv").unwrap();
        assert_eq!(tv.position, Some(Position::RightOf));
        assert_eq!(tv.relative_to.as_deref(), Some("desk"));
    }

    #[test]
    fn unknown_macro_lists_available() {
        let config = Config::defaults().unwrap();
        let err = config.macro_named("couch").unwrap_err().to_string();
        assert!(err.contains("couch"));
        assert!(err.contains("desk_mode, dual_mode, tv_mode"));
    }

    #[test]
    fn layout_keeps_file_order() {
        let config = Config::parse(
            r#"
[macros.wall]
displays.zeta = { enabled = true }
displays.alpha = { enabled = true, primary = true }
displays.mid = { enabled = false }
"#,
        )
        .unwrap();
        let keys: Vec<&str> = config.macros["wall"].displays.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn legacy_position_spelling_accepted() {
        let config = Config::parse(
            r#"
[macros.m]
displays.tv = { enabled = true, position = "--left-of", relative_to = "desk" }
"#,
        )
        .unwrap();
        assert_eq!(
            config.macros["m"].displays.get("tv").unwrap().position,
            Some(Position::LeftOf)
        );
    }

    #[test]
    fn out_of_range_volume_rejected() {
        let result = Config::parse(
            r#"
[macros.loud]
audio = { output = "tv", volume = 150 }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn two_primaries_rejected() {
        let result = Config::parse(
            r#"
[macros.m]
displays.a = { enabled = true, primary = true }
displays.b = { enabled = true, primary = true }
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let config = Config::defaults().unwrap();

        config.save_to(&path).unwrap();
        let reloaded = Config::load_from_path(&path).unwrap();
        assert_eq!(reloaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn update_merges_tables_and_replaces_values() {
        let temp = TempDir::new().unwrap();
        let update = temp.path().join("update.toml");
        fs::write(
            &update,
            r#"
[displays.keywords]
tv = ["HDMI-A-1"]
side = ["DP-2"]

[macros.tv_mode.audio]
volume = 40
"#,
        )
        .unwrap();

        let mut config = Config::defaults().unwrap();
        config.update_from_file(&update).unwrap();

        assert_eq!(config.displays.keywords["tv"], vec!["HDMI-A-1"]);
        assert_eq!(config.displays.keywords["side"], vec!["DP-2"]);
        assert_eq!(config.displays.keywords["desk"], vec!["DP", "HDMI-0", "primary"]);
        let tv = &config.macros["tv_mode"];
        assert_eq!(tv.audio.volume, Some(40));
        assert_eq!(tv.audio.output.as_deref(), Some("tv"));
        assert_eq!(tv.displays.len(), 2);
    }

    #[test]
    fn update_accepts_json() {
        let temp = TempDir::new().unwrap();
        let update = temp.path().join("update.json");
        fs::write(&update, r#"{"settings": {"notify": true}}"#).unwrap();

        let mut config = Config::defaults().unwrap();
        config.update_from_file(&update).unwrap();
        assert!(config.settings.notify);
        assert_eq!(config.settings.command_timeout_secs, 30);
    }

    #[test]
    fn invalid_update_leaves_config_untouched() {
        let temp = TempDir::new().unwrap();
        let update = temp.path().join("update.toml");
        fs::write(&update, "[macros.tv_mode.audio]\nvolume = 101\n").unwrap();

        let mut config = Config::defaults().unwrap();
        assert!(config.update_from_file(&update).is_err());
        assert_eq!(config, Config::defaults().unwrap());
    }

    #[test]
    fn reset_at_writes_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[settings]\nnotify = true\n").unwrap();

        let config = Config::reset_at(&path).unwrap();
        assert!(!config.settings.notify);
        assert_eq!(Config::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn describe_display_summarises_settings() {
        let settings = DisplaySettings {
            enabled: Some(true),
            primary: Some(true),
            resolution: Some("2560x1440".to_string()),
            ..DisplaySettings::default()
        };
        assert_eq!(describe_display(&settings), "on, primary, 2560x1440");
        assert_eq!(describe_audio(&AudioSettings::default()), None);
    }
}
