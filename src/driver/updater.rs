//! Acquisition state machine of one device
//!
//! The updater is synchronous: [`Updater::next_action`] tells the session
//! which request or timer to start, and [`Updater::handle`] consumes its
//! outcome. At most one action is outstanding at any time.

use super::types::{Action, DetectStep, Event, EventKind, IdentifyStep, Phase};
use crate::commands::{CompositeCommand, ZBM_COMMANDS};
use crate::config::AcquisitionConfig;
use crate::device::{ConnectionState, DeviceRecord, DeviceSettings};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::registers::{
    REG_APPLICATION, REG_DEVICE, REG_FIRMWARE_VERSION, REG_SERIAL, compose_serial,
    decode_unsigned16,
};

/// Drives identification, detection and periodic acquisition of one device
pub struct Updater {
    record: DeviceRecord,
    config: AcquisitionConfig,
    commands: &'static [CompositeCommand],
    phase: Phase,
    setup_requested: bool,
    timeout_count: u32,
    command_index: usize,
    cycle_index: u32,
    application: i32,
    logger: StructuredLogger,
}

impl Updater {
    pub fn new(record: DeviceRecord, config: &AcquisitionConfig) -> Self {
        let logger = get_logger_with_context(
            LogContext::new("updater")
                .with_port(record.port_name())
                .with_device_address(record.device_address()),
        );
        Self {
            record,
            config: config.clone(),
            commands: &ZBM_COMMANDS,
            phase: Phase::default(),
            setup_requested: false,
            timeout_count: 0,
            command_index: 0,
            cycle_index: 0,
            application: 0,
            logger,
        }
    }

    /// Replace the acquisition command table
    pub fn with_commands(mut self, commands: &'static [CompositeCommand]) -> Self {
        self.commands = commands;
        self
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut DeviceRecord {
        &mut self.record
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timeout_count(&self) -> u32 {
        self.timeout_count
    }

    pub fn cycle_index(&self) -> u32 {
        self.cycle_index
    }

    /// Application code read during setup check; advisory only
    pub fn application(&self) -> i32 {
        self.application
    }

    /// Enter the current phase and return the request or timer it needs.
    /// Phases that need neither (settings creation, table exhaustion) are
    /// passed through here without waiting.
    pub fn next_action(&mut self) -> Action {
        loop {
            if self.setup_requested {
                self.setup_requested = false;
                self.phase = Phase::Detect(DetectStep::CheckSetup);
            }

            match self.phase {
                Phase::Identify(IdentifyStep::Device) => {
                    self.record
                        .set_connection_state(ConnectionState::Searching);
                    return Action::Read {
                        start: REG_DEVICE,
                        count: 1,
                    };
                }
                Phase::Identify(IdentifyStep::Serial) => {
                    return Action::Read {
                        start: REG_SERIAL,
                        count: 2,
                    };
                }
                Phase::Identify(IdentifyStep::Firmware) => {
                    return Action::Read {
                        start: REG_FIRMWARE_VERSION,
                        count: 2,
                    };
                }
                Phase::Detect(DetectStep::AwaitStart) => {
                    self.logger.info(&format!(
                        "Device found: serial {} firmware {}",
                        self.record.serial(),
                        self.record.firmware_version()
                    ));
                    let settings =
                        DeviceSettings::new(self.record.device_type(), self.record.serial());
                    self.record.attach_settings(settings);
                    self.record.set_connection_state(ConnectionState::Detected);
                    self.setup_requested = true;
                }
                Phase::Detect(DetectStep::CheckSetup) => {
                    return Action::Read {
                        start: REG_APPLICATION,
                        count: 2,
                    };
                }
                Phase::Acquire => {
                    if let Some(action) = self.next_command() {
                        return action;
                    }
                }
                Phase::Wait => return Action::Sleep(self.config.wait_interval()),
                Phase::Lost => return Action::Sleep(self.config.connection_lost_wait()),
            }
        }
    }

    /// Request for the next due command, or `None` after moving to Wait at
    /// the end of the table
    fn next_command(&mut self) -> Option<Action> {
        loop {
            if let Some(cmd) = self.commands.get(self.command_index)
                && cmd.is_due(self.cycle_index)
            {
                return Some(Action::Read {
                    start: cmd.register,
                    count: cmd.register_count(),
                });
            }

            self.command_index += 1;
            if self.command_index >= self.commands.len() {
                self.command_index = 0;
                self.cycle_index += 1;
                if self.cycle_index >= self.config.cycle_count {
                    self.cycle_index = 0;
                    self.record.set_connection_state(ConnectionState::Connected);
                }
                self.phase = Phase::Wait;
                return None;
            }
        }
    }

    /// Consume the outcome of the outstanding action
    pub fn handle(&mut self, event: Event) {
        if event.device_address != self.record.device_address() {
            self.logger.trace(&format!(
                "Ignoring event for device {}",
                event.device_address
            ));
            return;
        }

        match event.kind {
            EventKind::ReadCompleted(words) => {
                self.timeout_count = 0;
                self.on_reply(Some(words.as_slice()));
            }
            EventKind::WriteCompleted { register, value } => {
                self.timeout_count = 0;
                self.logger.debug(&format!(
                    "Register {:#06x} acknowledged value {}",
                    register, value
                ));
                self.phase = Phase::Acquire;
            }
            EventKind::Exception(code) => {
                self.logger.warn(&format!(
                    "Exception {:#04x} in phase {:?}, reply discarded",
                    code, self.phase
                ));
                self.on_reply(None);
            }
            EventKind::Timeout => self.on_timeout(),
            EventKind::TimerExpired => {
                self.phase = match self.phase {
                    Phase::Lost => Phase::Identify(IdentifyStep::Device),
                    _ => Phase::Acquire,
                };
            }
        }
    }

    /// Advance after a reply; `None` means the reply carried no usable data
    fn on_reply(&mut self, words: Option<&[u16]>) {
        match self.phase {
            Phase::Identify(IdentifyStep::Device) => {
                if let Some(&id) = words.and_then(|w| w.first()) {
                    self.logger.info(&format!("Equipment id: {:#06x}", id));
                }
                self.phase = Phase::Identify(IdentifyStep::Serial);
            }
            Phase::Identify(IdentifyStep::Serial) => {
                match words {
                    Some(&[hi, lo, ..]) => {
                        let serial = compose_serial(hi, lo);
                        self.logger.info(&format!("Serial: {}", serial));
                        self.record.set_serial(&serial);
                    }
                    Some(short) => self.logger.warn(&format!(
                        "Serial reply too short: {} words",
                        short.len()
                    )),
                    None => {}
                }
                self.phase = Phase::Identify(IdentifyStep::Firmware);
            }
            Phase::Identify(IdentifyStep::Firmware) => {
                if let Some(&version) = words.and_then(|w| w.first()) {
                    self.record
                        .set_firmware_version(decode_unsigned16(version));
                }
                self.phase = Phase::Detect(DetectStep::AwaitStart);
            }
            Phase::Detect(DetectStep::CheckSetup) => {
                if let Some(&application) = words.and_then(|w| w.first()) {
                    self.application = decode_unsigned16(application);
                    self.logger
                        .info(&format!("Application: {:#06x}", self.application));
                }
                self.phase = Phase::Acquire;
            }
            Phase::Acquire => {
                if let Some(words) = words {
                    self.decode_command_reply(words);
                }
                self.command_index += 1;
            }
            Phase::Wait => self.phase = Phase::Acquire,
            Phase::Detect(DetectStep::AwaitStart) | Phase::Lost => {
                self.logger
                    .error(&format!("Unexpected reply in phase {:?}", self.phase));
                self.phase = if self.record.settings().is_none() {
                    Phase::Identify(IdentifyStep::Device)
                } else {
                    Phase::Acquire
                };
            }
        }
    }

    fn decode_command_reply(&mut self, words: &[u16]) {
        let Some(cmd) = self.commands.get(self.command_index) else {
            self.logger.error(&format!(
                "Reply for unknown command index {}",
                self.command_index
            ));
            return;
        };

        for action in cmd.active_actions() {
            let Some(&word) = words.get(usize::from(action.offset)) else {
                self.logger.warn(&format!(
                    "Reply from {:#06x} has {} words, {:?} at offset {} skipped",
                    cmd.register,
                    words.len(),
                    action.parameter,
                    action.offset
                ));
                continue;
            };
            if let Some((field, value)) = action.parameter.decode(word) {
                self.logger.debug(&format!("{:?}: {}", field, value));
                self.record.store_raw(field, value);
            }
        }
    }

    fn on_timeout(&mut self) {
        self.timeout_count += 1;
        if self.timeout_count >= self.config.max_timeout_count {
            self.connection_lost();
        } else {
            self.logger.debug(&format!(
                "Timeout {} of {} in phase {:?}, retrying",
                self.timeout_count, self.config.max_timeout_count, self.phase
            ));
        }
    }

    fn connection_lost(&mut self) {
        if !self.record.serial().is_empty() {
            self.logger.error("Lost connection to battery controller");
        }
        self.phase = Phase::Lost;
        self.timeout_count = self.config.max_timeout_count.saturating_sub(1);
        self.record.set_serial("");
        self.record
            .set_connection_state(ConnectionState::Disconnected);
        self.record.detach_settings();
    }
}
