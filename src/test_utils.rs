//! Test doubles shared by unit tests
//!
//! [`FakeSystem`] stands in for both the shell and discovery. It records every
//! command, answers scripted ones, fails the ones it is told to fail, and
//! applies `xrandr` side effects to its own display table so refreshes see the
//! result of earlier commands.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::devices::{AudioDirection, AudioEndpointRecord, AudioInventory, DisplayRecord};
use crate::discovery::Discovery;
use crate::error::DeviceError;
use crate::shell::{CommandOutput, CommandRunner, Invocation};

/// Connected, active, non-primary display at 1920x1080
pub(crate) fn display(name: &str) -> DisplayRecord {
    DisplayRecord {
        name: name.to_string(),
        connected: true,
        active: true,
        primary: false,
        current_resolution: Some("1920x1080".to_string()),
        available_resolutions: vec!["1920x1080".to_string(), "1280x720".to_string()],
    }
}

pub(crate) fn sink(id: &str, name: &str, description: &str) -> AudioEndpointRecord {
    endpoint(id, name, description, AudioDirection::Output)
}

pub(crate) fn source(id: &str, name: &str, description: &str) -> AudioEndpointRecord {
    endpoint(id, name, description, AudioDirection::Input)
}

fn endpoint(id: &str, name: &str, description: &str, direction: AudioDirection) -> AudioEndpointRecord {
    AudioEndpointRecord {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_default: false,
        direction,
    }
}

#[derive(Default)]
struct FakeState {
    displays: RefCell<Vec<DisplayRecord>>,
    audio: RefCell<AudioInventory>,
    log: RefCell<Vec<String>>,
    responses: RefCell<HashMap<String, CommandOutput>>,
    failing: RefCell<HashSet<String>>,
    ignore_primary: Cell<bool>,
    display_queries: Cell<usize>,
}

/// Scripted shell + discovery
#[derive(Clone, Default)]
pub(crate) struct FakeSystem {
    state: Rc<FakeState>,
}

impl FakeSystem {
    pub fn new(displays: Vec<DisplayRecord>) -> Self {
        let fake = Self::default();
        *fake.state.displays.borrow_mut() = displays;
        fake
    }

    pub fn with_audio(self, audio: AudioInventory) -> Self {
        *self.state.audio.borrow_mut() = audio;
        self
    }

    pub fn runner(&self) -> Rc<dyn CommandRunner> {
        Rc::new(self.clone())
    }

    pub fn discovery(&self) -> Rc<dyn Discovery> {
        Rc::new(self.clone())
    }

    /// Answer this exact command line with `output`
    pub fn respond(&self, command: &str, output: CommandOutput) {
        self.state
            .responses
            .borrow_mut()
            .insert(command.to_string(), output);
    }

    /// Make this exact command line exit 1
    pub fn fail(&self, command: &str) {
        self.state.failing.borrow_mut().insert(command.to_string());
    }

    /// Accept `--primary` but don't apply it (simulates a driver that drops it)
    pub fn ignore_primary(&self) {
        self.state.ignore_primary.set(true);
    }

    /// Replace the display table, as if hardware changed
    pub fn set_displays(&self, displays: Vec<DisplayRecord>) {
        *self.state.displays.borrow_mut() = displays;
    }

    pub fn displays(&self) -> Vec<DisplayRecord> {
        self.state.displays.borrow().clone()
    }

    /// Every command line run so far, in order
    pub fn commands(&self) -> Vec<String> {
        self.state.log.borrow().clone()
    }

    /// Commands for one program only
    pub fn commands_for(&self, program: &str) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .collect()
    }

    pub fn ran(&self, command: &str) -> bool {
        self.state.log.borrow().iter().any(|c| c == command)
    }

    pub fn display_queries(&self) -> usize {
        self.state.display_queries.get()
    }

    fn apply_xrandr(&self, args: &[String]) {
        let Some(pos) = args.iter().position(|a| a == "--output") else {
            return;
        };
        let Some(name) = args.get(pos + 1) else { return };

        let mut displays = self.state.displays.borrow_mut();
        let make_primary = args.iter().any(|a| a == "--primary") && !self.state.ignore_primary.get();
        if make_primary {
            for d in displays.iter_mut() {
                d.primary = false;
            }
        }

        let Some(display) = displays.iter_mut().find(|d| &d.name == name) else {
            return;
        };
        if args.iter().any(|a| a == "--off") {
            display.active = false;
            display.primary = false;
        }
        if args.iter().any(|a| a == "--auto") {
            display.active = true;
        }
        if let Some(i) = args.iter().position(|a| a == "--mode") {
            display.active = true;
            display.current_resolution = args.get(i + 1).cloned();
        }
        if make_primary {
            display.primary = true;
        }
    }
}

impl CommandRunner for FakeSystem {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, DeviceError> {
        let line = invocation.to_string();
        self.state.log.borrow_mut().push(line.clone());

        if let Some(output) = self.state.responses.borrow().get(&line) {
            return Ok(output.clone());
        }
        if self.state.failing.borrow().contains(&line) {
            return Ok(CommandOutput::failed(1, format!("simulated failure: {line}")));
        }
        if invocation.program == "xrandr" {
            self.apply_xrandr(&invocation.args);
        }
        Ok(CommandOutput::ok(""))
    }
}

impl Discovery for FakeSystem {
    fn discover_displays(&self) -> Vec<DisplayRecord> {
        self.state.display_queries.set(self.state.display_queries.get() + 1);
        self.state
            .displays
            .borrow()
            .iter()
            .filter(|d| d.connected)
            .cloned()
            .collect()
    }

    fn discover_audio(&self) -> AudioInventory {
        self.state.audio.borrow().clone()
    }
}
