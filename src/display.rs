//! Display control via `xrandr`
//!
//! [`DisplayController`] keeps its own snapshot of connected outputs and issues
//! one `xrandr` invocation per change. Multi-display layouts go through
//! [`DisplayController::configure`], which resets everything first and then
//! brings outputs back in a fixed order: primary, then the rest.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use tracing::{debug, error, info, warn};

use crate::config::LayoutDisplays;
use crate::devices::DisplayRecord;
use crate::discovery::Discovery;
use crate::error::{DeviceError, DeviceKind};
use crate::matcher::find_display;
use crate::shell::{CommandRunner, Invocation, run_checked};

/// Placement of a display relative to another one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    #[serde(alias = "--right-of")]
    RightOf,
    #[serde(alias = "--left-of")]
    LeftOf,
    #[serde(alias = "--above")]
    Above,
    #[serde(alias = "--below")]
    Below,
    #[serde(alias = "--same-as")]
    SameAs,
}

impl Position {
    /// The matching `xrandr` flag
    #[must_use]
    pub fn xrandr_flag(self) -> &'static str {
        match self {
            Self::RightOf => "--right-of",
            Self::LeftOf => "--left-of",
            Self::Above => "--above",
            Self::Below => "--below",
            Self::SameAs => "--same-as",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RightOf => "right_of",
            Self::LeftOf => "left_of",
            Self::Above => "above",
            Self::Below => "below",
            Self::SameAs => "same_as",
        })
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("--").replace('-', "_").as_str() {
            "right_of" => Ok(Self::RightOf),
            "left_of" => Ok(Self::LeftOf),
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            "same_as" => Ok(Self::SameAs),
            _ => Err(format!(
                "invalid position '{s}' (expected right_of, left_of, above, below or same_as)"
            )),
        }
    }
}

/// Drives `xrandr` against a privately refreshed display snapshot
pub struct DisplayController {
    runner: Rc<dyn CommandRunner>,
    discovery: Rc<dyn Discovery>,
    displays: Vec<DisplayRecord>,
}

impl DisplayController {
    /// Create a controller and take an initial snapshot
    pub fn new(runner: Rc<dyn CommandRunner>, discovery: Rc<dyn Discovery>) -> Self {
        let mut controller = Self {
            runner,
            discovery,
            displays: Vec::new(),
        };
        controller.refresh();
        controller
    }

    pub fn refresh(&mut self) {
        self.displays = self.discovery.discover_displays();
    }

    #[must_use]
    pub fn displays(&self) -> &[DisplayRecord] {
        &self.displays
    }

    /// Look a display up by exact name, falling back to keyword match
    #[must_use]
    pub fn get_display(&self, name: &str) -> Option<&DisplayRecord> {
        self.displays
            .iter()
            .find(|d| d.name == name)
            .or_else(|| find_display(name, &self.displays))
    }

    fn resolve(&self, name: &str) -> Result<String, DeviceError> {
        self.get_display(name)
            .map(|d| d.name.clone())
            .ok_or_else(|| DeviceError::not_found(DeviceKind::Display, name))
    }

    fn xrandr(&self, invocation: &Invocation) -> Result<(), DeviceError> {
        run_checked(self.runner.as_ref(), invocation).map(|_| ())
    }

    fn output_args(name: &str, resolution: Option<&str>) -> Invocation {
        let base = Invocation::new("xrandr").args(["--output", name]);
        match resolution {
            Some(mode) => base.args(["--mode", mode]),
            None => base.arg("--auto"),
        }
    }

    /// Turn a display on, optionally placing it next to another
    ///
    /// Without `relative_to` the first other connected display is used as the
    /// reference. Positioning is skipped when only one display is known, when
    /// `position` is [`Position::SameAs`], or when no reference can be found.
    /// The snapshot is refreshed afterwards even if `xrandr` failed.
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] if `name` matches nothing and a command
    /// error if `xrandr` fails.
    pub fn enable(
        &mut self,
        name: &str,
        resolution: Option<&str>,
        position: Option<Position>,
        relative_to: Option<&str>,
    ) -> Result<(), DeviceError> {
        let target = self.resolve(name)?;
        let position = position.unwrap_or_default();

        let mut placement = None;
        if self.displays.len() > 1 && position != Position::SameAs {
            let reference = match relative_to {
                Some(reference) => self.get_display(reference).map(|d| d.name.clone()),
                None => self
                    .displays
                    .iter()
                    .find(|d| d.connected && d.name != target)
                    .map(|d| d.name.clone()),
            };
            match reference {
                Some(reference) if reference != target => placement = Some((position, reference)),
                Some(_) => debug!("{} cannot be positioned relative to itself", target),
                None => warn!(
                    "No reference display for {}, enabling without position",
                    target
                ),
            }
        }

        self.enable_placed(&target, resolution, placement.as_ref().map(|(p, r)| (*p, r.as_str())))
    }

    fn enable_placed(
        &mut self,
        target: &str,
        resolution: Option<&str>,
        placement: Option<(Position, &str)>,
    ) -> Result<(), DeviceError> {
        let mut invocation = Self::output_args(target, resolution);
        if let Some((position, reference)) = placement {
            invocation = invocation.args([position.xrandr_flag(), reference]);
        }

        let result = self.xrandr(&invocation);
        self.refresh();
        if result.is_ok() {
            info!("Enabled display {}", target);
        }
        result
    }

    /// Turn a display on and make it primary with a single command
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn enable_as_primary(&mut self, name: &str, resolution: Option<&str>) -> Result<(), DeviceError> {
        let target = self.resolve(name)?;
        let invocation = Self::output_args(&target, resolution).arg("--primary");
        let result = self.xrandr(&invocation);
        self.refresh();
        if result.is_ok() {
            info!("Enabled {} as primary display", target);
        }
        result
    }

    /// Switch a display off
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn disable(&mut self, name: &str) -> Result<(), DeviceError> {
        let target = self.resolve(name)?;
        self.xrandr(&Invocation::new("xrandr").args(["--output", target.as_str(), "--off"]))?;
        self.refresh();
        info!("Disabled display {}", target);
        Ok(())
    }

    /// Mark a display as primary
    ///
    /// # Errors
    /// Returns [`DeviceError::NotFound`] or a command error.
    pub fn set_primary(&mut self, name: &str) -> Result<(), DeviceError> {
        let target = self.resolve(name)?;
        self.xrandr(&Invocation::new("xrandr").args(["--output", target.as_str(), "--primary"]))?;
        self.refresh();
        info!("Set {} as primary display", target);
        Ok(())
    }

    /// Apply a whole layout
    ///
    /// Every known display is switched off first. The primary (if any) comes
    /// back with one combined enable+primary command, then the remaining
    /// enabled displays follow in layout order, each placed relative to its
    /// `relative_to`, else the primary, else the first display enabled here.
    /// Finally the primary flag is verified and retried once.
    ///
    /// Failures are logged and folded into the result; later steps still run.
    pub fn configure(&mut self, layout: &LayoutDisplays) -> bool {
        let mut success = true;
        let mut record = |step: Result<(), DeviceError>, what: &str| {
            if let Err(e) = step {
                error!("{}: {}", what, e);
                success = false;
            }
        };

        let mut enabled: Vec<_> = layout
            .iter()
            .filter(|(_, settings)| settings.enabled == Some(true))
            .collect();
        let primaries: Vec<_> = enabled
            .iter()
            .filter(|(_, settings)| settings.primary == Some(true))
            .copied()
            .collect();
        if primaries.len() > 1 {
            warn!("Several displays marked primary, using {}", primaries[0].0);
        }
        let primary = primaries.first().copied();
        debug!(
            "Configuring {} enabled displays (primary: {})",
            enabled.len(),
            primary.map_or("none", |(key, _)| key)
        );

        // Reset
        self.refresh();
        let known: Vec<String> = self.displays.iter().map(|d| d.name.clone()).collect();
        for name in &known {
            record(self.disable(name), &format!("Failed to disable {name}"));
        }

        // Primary
        let mut reference: Option<String> = None;
        if let Some((key, settings)) = primary {
            enabled.retain(|(k, _)| *k != key);
            let target = settings.target(key);
            let step = self.enable_as_primary(target, settings.resolution.as_deref());
            if step.is_ok() {
                reference = self.get_display(target).map(|d| d.name.clone());
            }
            record(step, &format!("Failed to enable primary display {target}"));
        }

        // The rest, in layout order
        for (key, settings) in enabled {
            let target = settings.target(key);
            let resolution = settings.resolution.as_deref();
            let position = settings.position.unwrap_or_default();
            let anchor = settings.relative_to.clone().or_else(|| reference.clone());
            let step = match anchor {
                Some(anchor) => self.enable(target, resolution, Some(position), Some(&anchor)),
                None => self.resolve(target).and_then(|physical| {
                    reference = Some(physical.clone());
                    self.enable_placed(&physical, resolution, None)
                }),
            };
            record(step, &format!("Failed to enable display {target}"));
        }

        // Verify primary
        if let Some((key, settings)) = primary {
            let target = settings.target(key);
            self.refresh();
            let is_primary = self.get_display(target).is_some_and(|d| d.primary);
            if !is_primary {
                debug!("{} not reported primary, retrying", target);
                if let Err(e) = self.set_primary(target) {
                    warn!("Failed to set {} as primary display: {}", target, e);
                    success = false;
                }
            }
        }

        success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplaySettings;
    use crate::test_utils::{FakeSystem, display};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn controller(fake: &FakeSystem) -> DisplayController {
        DisplayController::new(fake.runner(), fake.discovery())
    }

    fn on() -> DisplaySettings {
        DisplaySettings {
            enabled: Some(true),
            ..DisplaySettings::default()
        }
    }

    fn primary() -> DisplaySettings {
        DisplaySettings {
            primary: Some(true),
            ..on()
        }
    }

    #[test_case("right_of", Position::RightOf ; "snake case")]
    #[test_case("--left-of", Position::LeftOf ; "xrandr flag")]
    #[test_case("same-as", Position::SameAs ; "dashed")]
    fn position_parses(input: &str, expected: Position) {
        assert_eq!(input.parse::<Position>().unwrap(), expected);
    }

    #[test]
    fn position_rejects_garbage() {
        assert!("diagonal".parse::<Position>().is_err());
    }

    #[test]
    fn get_display_prefers_exact_name() {
        let fake = FakeSystem::new(vec![display("HDMI-10"), display("HDMI-1")]);
        let ctrl = controller(&fake);
        assert_eq!(ctrl.get_display("HDMI-1").unwrap().name, "HDMI-1");
        assert_eq!(ctrl.get_display("hdmi").unwrap().name, "HDMI-10");
        assert!(ctrl.get_display("VGA").is_none());
    }

    #[test]
    fn enable_defaults_to_right_of_first_other_display() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut ctrl = controller(&fake);
        ctrl.enable("HDMI", None, None, None).unwrap();
        assert_eq!(
            fake.commands(),
            vec!["xrandr --output HDMI-1 --auto --right-of DP-1"]
        );
    }

    #[test]
    fn enable_single_display_skips_positioning() {
        let fake = FakeSystem::new(vec![display("DP-1")]);
        let mut ctrl = controller(&fake);
        ctrl.enable("DP-1", Some("1280x720"), Some(Position::LeftOf), Some("HDMI-1"))
            .unwrap();
        assert_eq!(fake.commands(), vec!["xrandr --output DP-1 --mode 1280x720"]);
    }

    #[test]
    fn enable_same_as_skips_positioning() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut ctrl = controller(&fake);
        ctrl.enable("HDMI-1", None, Some(Position::SameAs), Some("DP-1"))
            .unwrap();
        assert_eq!(fake.commands(), vec!["xrandr --output HDMI-1 --auto"]);
    }

    #[test]
    fn enable_refreshes_even_on_failure() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        fake.fail("xrandr --output HDMI-1 --auto --above DP-1");
        let mut ctrl = controller(&fake);
        let before = fake.display_queries();

        let err = ctrl
            .enable("HDMI-1", None, Some(Position::Above), Some("DP-1"))
            .unwrap_err();
        assert!(err.is_command_failure());
        assert_eq!(fake.display_queries(), before + 1);
    }

    #[test]
    fn unknown_display_is_not_found_and_runs_nothing() {
        let fake = FakeSystem::new(vec![display("DP-1")]);
        let mut ctrl = controller(&fake);
        assert!(matches!(
            ctrl.disable("VGA-1"),
            Err(DeviceError::NotFound { kind: DeviceKind::Display, .. })
        ));
        assert!(matches!(ctrl.set_primary("VGA-1"), Err(DeviceError::NotFound { .. })));
        assert!(fake.commands().is_empty());
    }

    #[test]
    fn disable_reports_command_failure() {
        let fake = FakeSystem::new(vec![display("DP-1")]);
        fake.fail("xrandr --output DP-1 --off");
        let mut ctrl = controller(&fake);
        assert!(matches!(ctrl.disable("DP-1"), Err(DeviceError::CommandFailed { .. })));
    }

    #[test]
    fn configure_orders_reset_then_primary_then_rest() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut ctrl = controller(&fake);

        // Secondary listed first: ordering must not depend on layout order
        let layout = LayoutDisplays::from(vec![
            (
                "HDMI-1".to_string(),
                DisplaySettings {
                    position: Some(Position::RightOf),
                    relative_to: Some("DP-1".to_string()),
                    ..on()
                },
            ),
            ("DP-1".to_string(), primary()),
        ]);

        assert!(ctrl.configure(&layout));
        assert_eq!(
            fake.commands(),
            vec![
                "xrandr --output DP-1 --off",
                "xrandr --output HDMI-1 --off",
                "xrandr --output DP-1 --auto --primary",
                "xrandr --output HDMI-1 --auto --right-of DP-1",
            ]
        );
        let state = fake.displays();
        assert!(state.iter().all(|d| d.active));
        assert!(state.iter().find(|d| d.name == "DP-1").unwrap().primary);
    }

    #[test]
    fn configure_without_primary_uses_first_enabled_as_reference() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1"), display("HDMI-2")]);
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![
            ("HDMI-2".to_string(), on()),
            (
                "HDMI-1".to_string(),
                DisplaySettings {
                    position: Some(Position::LeftOf),
                    ..on()
                },
            ),
            (
                "DP-1".to_string(),
                DisplaySettings {
                    enabled: Some(false),
                    ..DisplaySettings::default()
                },
            ),
        ]);

        assert!(ctrl.configure(&layout));
        let xrandr = fake.commands_for("xrandr");
        assert_eq!(
            xrandr[3..].to_vec(),
            vec![
                "xrandr --output HDMI-2 --auto",
                "xrandr --output HDMI-1 --auto --left-of HDMI-2",
            ]
        );
        assert!(!fake.displays()[0].active);
    }

    #[test]
    fn configure_uses_output_override_and_resolution() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![(
            "tv".to_string(),
            DisplaySettings {
                output: Some("HDMI-1".to_string()),
                resolution: Some("1280x720".to_string()),
                ..primary()
            },
        )]);

        assert!(ctrl.configure(&layout));
        assert!(fake.ran("xrandr --output HDMI-1 --mode 1280x720 --primary"));
    }

    #[test]
    fn configure_keeps_going_after_a_failure() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1"), display("HDMI-2")]);
        fake.fail("xrandr --output HDMI-1 --auto --right-of DP-1");
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![
            ("DP-1".to_string(), primary()),
            ("HDMI-1".to_string(), on()),
            ("HDMI-2".to_string(), on()),
        ]);

        assert!(!ctrl.configure(&layout));
        assert!(fake.ran("xrandr --output HDMI-2 --auto --right-of DP-1"));
    }

    #[test]
    fn configure_retries_primary_once() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        fake.ignore_primary();
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![("HDMI-1".to_string(), primary())]);

        // The retry "succeeds" at the command level, so the layout still counts as applied
        assert!(ctrl.configure(&layout));
        assert_eq!(
            fake.commands().last().map(String::as_str),
            Some("xrandr --output HDMI-1 --primary")
        );
    }

    #[test]
    fn configure_fails_when_primary_retry_fails() {
        let fake = FakeSystem::new(vec![display("DP-1"), display("HDMI-1")]);
        fake.ignore_primary();
        fake.fail("xrandr --output HDMI-1 --primary");
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![("HDMI-1".to_string(), primary())]);

        assert!(!ctrl.configure(&layout));
    }

    #[test]
    fn configure_reports_unknown_display() {
        let fake = FakeSystem::new(vec![display("DP-1")]);
        let mut ctrl = controller(&fake);
        let layout = LayoutDisplays::from(vec![("VGA-1".to_string(), on())]);
        assert!(!ctrl.configure(&layout));
        assert_eq!(fake.commands(), vec!["xrandr --output DP-1 --off"]);
    }
}
