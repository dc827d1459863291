//! Logical → physical device mapping
//!
//! Keyword rules name roles ("desk", "tv"); the mapper resolves each role to the
//! first device its keywords hit. Roles with no hit are simply absent.
//!
//! The mapping is a cached view of one discovery pass. It is not invalidated
//! when hardware changes; call [`DeviceMapper::refresh`] before relying on it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

use crate::devices::{AudioDirection, AudioInventory, DisplayRecord};
use crate::discovery::Discovery;
use crate::matcher::{first_audio_match, first_display_match};

/// Logical name → ordered keywords (earlier keywords win)
pub type KeywordRules = BTreeMap<String, Vec<String>>;

/// Resolved logical → physical names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMapping {
    #[serde(default)]
    pub displays: BTreeMap<String, String>,
    #[serde(default)]
    pub audio_outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub audio_inputs: BTreeMap<String, String>,
}

impl DeviceMapping {
    /// Overwrite entries with those from `partial` (last write wins per key)
    pub fn merge(&mut self, partial: DeviceMapping) {
        self.displays.extend(partial.displays);
        self.audio_outputs.extend(partial.audio_outputs);
        self.audio_inputs.extend(partial.audio_inputs);
    }
}

/// Resolve every rule against the given pools
///
/// Audio rules are searched twice, independently: once among outputs and once
/// among inputs, so a role may map to either, both, or neither.
#[must_use]
pub fn build_mapping(
    display_rules: &KeywordRules,
    audio_rules: &KeywordRules,
    displays: &[DisplayRecord],
    audio: &AudioInventory,
) -> DeviceMapping {
    let mut mapping = DeviceMapping::default();

    for (logical, keywords) in display_rules {
        if let Some(display) = first_display_match(keywords, displays) {
            mapping.displays.insert(logical.clone(), display.name.clone());
        }
    }

    for (logical, keywords) in audio_rules {
        if let Some(out) = first_audio_match(keywords, audio.pool(AudioDirection::Output)) {
            mapping.audio_outputs.insert(logical.clone(), out.name.clone());
        }
        if let Some(input) = first_audio_match(keywords, audio.pool(AudioDirection::Input)) {
            mapping.audio_inputs.insert(logical.clone(), input.name.clone());
        }
    }

    mapping
}

/// Owns the latest device snapshot and the mapping built from it
pub struct DeviceMapper {
    discovery: Rc<dyn Discovery>,
    display_rules: KeywordRules,
    audio_rules: KeywordRules,
    displays: Vec<DisplayRecord>,
    audio: AudioInventory,
    mapping: DeviceMapping,
}

impl DeviceMapper {
    /// Create a mapper and run an initial discovery
    pub fn new(
        discovery: Rc<dyn Discovery>,
        display_rules: KeywordRules,
        audio_rules: KeywordRules,
    ) -> Self {
        let mut mapper = Self {
            discovery,
            display_rules,
            audio_rules,
            displays: Vec::new(),
            audio: AudioInventory::default(),
            mapping: DeviceMapping::default(),
        };
        mapper.refresh();
        mapper
    }

    /// Re-run discovery and rebuild the mapping from scratch
    ///
    /// Manual entries added via [`update_mappings`](Self::update_mappings) are dropped.
    pub fn refresh(&mut self) {
        self.displays = self.discovery.discover_displays();
        self.audio = self.discovery.discover_audio();
        self.mapping = build_mapping(&self.display_rules, &self.audio_rules, &self.displays, &self.audio);
        debug!(
            "Mapped {} displays, {} outputs, {} inputs",
            self.mapping.displays.len(),
            self.mapping.audio_outputs.len(),
            self.mapping.audio_inputs.len()
        );
    }

    /// Hand-correct entries without a full refresh
    pub fn update_mappings(&mut self, partial: DeviceMapping) {
        self.mapping.merge(partial);
    }

    #[must_use]
    pub fn get_display(&self, logical: &str) -> Option<&str> {
        self.mapping.displays.get(logical).map(String::as_str)
    }

    #[must_use]
    pub fn get_audio_output(&self, logical: &str) -> Option<&str> {
        self.mapping.audio_outputs.get(logical).map(String::as_str)
    }

    #[must_use]
    pub fn get_audio_input(&self, logical: &str) -> Option<&str> {
        self.mapping.audio_inputs.get(logical).map(String::as_str)
    }

    #[must_use]
    pub fn mapping(&self) -> &DeviceMapping {
        &self.mapping
    }

    #[must_use]
    pub fn displays(&self) -> &[DisplayRecord] {
        &self.displays
    }

    #[must_use]
    pub fn audio(&self) -> &AudioInventory {
        &self.audio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeSystem, display, sink, source};
    use pretty_assertions::assert_eq;

    fn rules(entries: &[(&str, &[&str])]) -> KeywordRules {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
            .collect()
    }

    #[test]
    fn later_keyword_used_when_earlier_misses() {
        let display_rules = rules(&[("desk", &["DP", "HDMI-0"])]);
        let mapping = build_mapping(
            &display_rules,
            &KeywordRules::new(),
            &[display("HDMI-0")],
            &AudioInventory::default(),
        );
        assert_eq!(mapping.displays.get("desk").map(String::as_str), Some("HDMI-0"));
    }

    #[test]
    fn unmatched_role_is_absent() {
        let display_rules = rules(&[("desk", &["DP", "HDMI-0"])]);
        let mapping = build_mapping(
            &display_rules,
            &KeywordRules::new(),
            &[display("VGA-1")],
            &AudioInventory::default(),
        );
        assert!(!mapping.displays.contains_key("desk"));
        assert!(mapping.displays.is_empty());
    }

    #[test]
    fn audio_roles_resolve_outputs_and_inputs_independently() {
        let audio_rules = rules(&[("desk", &["analog"]), ("tv", &["hdmi"])]);
        let audio = AudioInventory {
            outputs: vec![
                sink("1", "alsa_output.analog-stereo", "Built-in Analog"),
                sink("2", "alsa_output.hdmi-stereo", "HDMI Out"),
            ],
            inputs: vec![source("3", "alsa_input.analog-stereo", "Built-in Mic")],
        };
        let mapping = build_mapping(&KeywordRules::new(), &audio_rules, &[], &audio);

        assert_eq!(mapping.audio_outputs.get("desk").unwrap(), "alsa_output.analog-stereo");
        assert_eq!(mapping.audio_outputs.get("tv").unwrap(), "alsa_output.hdmi-stereo");
        assert_eq!(mapping.audio_inputs.get("desk").unwrap(), "alsa_input.analog-stereo");
        assert!(!mapping.audio_inputs.contains_key("tv"));
    }

    #[test]
    fn refresh_is_idempotent_without_hardware_change() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut mapper = DeviceMapper::new(
            fake.discovery(),
            rules(&[("desk", &["DP"]), ("tv", &["HDMI-1"])]),
            KeywordRules::new(),
        );
        let first = mapper.mapping().clone();
        mapper.refresh();
        assert_eq!(mapper.mapping(), &first);
        assert_eq!(mapper.get_display("tv"), Some("HDMI-1"));
    }

    #[test]
    fn refresh_replaces_previous_state() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut mapper = DeviceMapper::new(
            fake.discovery(),
            rules(&[("desk", &["DP"]), ("tv", &["HDMI-1"])]),
            KeywordRules::new(),
        );
        mapper.update_mappings(DeviceMapping {
            displays: BTreeMap::from([("side".to_string(), "DP-3".to_string())]),
            ..DeviceMapping::default()
        });

        fake.set_displays(vec![display("DP-1")]);
        mapper.refresh();

        assert_eq!(mapper.get_display("desk"), Some("DP-1"));
        assert_eq!(mapper.get_display("tv"), None);
        assert_eq!(mapper.get_display("side"), None);
        assert_eq!(mapper.displays().len(), 1);
    }

    #[test]
    fn update_mappings_overwrites_per_key() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut mapper = DeviceMapper::new(
            fake.discovery(),
            rules(&[("desk", &["DP"]), ("tv", &["HDMI-1"])]),
            KeywordRules::new(),
        );

        mapper.update_mappings(DeviceMapping {
            displays: BTreeMap::from([("tv".to_string(), "HDMI-2".to_string())]),
            audio_outputs: BTreeMap::from([("tv".to_string(), "hdmi-out".to_string())]),
            ..DeviceMapping::default()
        });

        assert_eq!(mapper.get_display("desk"), Some("DP-1"));
        assert_eq!(mapper.get_display("tv"), Some("HDMI-2"));
        assert_eq!(mapper.get_audio_output("tv"), Some("hdmi-out"));
        assert_eq!(mapper.get_audio_input("tv"), None);
    }
}
