use crate::device::DeviceField;
use std::time::Duration;

/// Identification read currently outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifyStep {
    /// Device type register
    Device,
    /// Serial number (two words)
    Serial,
    /// Firmware version
    Firmware,
}

/// Detection sub-state between identification and acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectStep {
    /// Identity known; settings are created on the next step
    AwaitStart,
    /// Application register read outstanding
    CheckSetup,
}

/// Phase of the acquisition state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Identify(IdentifyStep),
    Detect(DetectStep),
    /// Walking the command table
    Acquire,
    /// Pause between acquisition passes
    Wait,
    /// Long pause after the device stopped answering
    Lost,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Identify(IdentifyStep::Device)
    }
}

/// What the session has to do next for the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read `count` holding registers starting at `start`
    Read { start: u16, count: u16 },
    /// Arm the timer; [`EventKind::TimerExpired`] follows
    Sleep(Duration),
}

/// Outcome delivered to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ReadCompleted(Vec<u16>),
    WriteCompleted { register: u16, value: u16 },
    Exception(u8),
    Timeout,
    TimerExpired,
}

/// Transport or timer outcome, tagged with the device address it belongs to.
/// Outcomes for other addresses on a shared link are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub device_address: u8,
    pub kind: EventKind,
}

impl Event {
    pub fn new(device_address: u8, kind: EventKind) -> Self {
        Self {
            device_address,
            kind,
        }
    }
}

/// Commands accepted by a device session from the publishing side
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Store a maintenance/command field value
    Write { field: DeviceField, value: i32 },
    SetCustomName(String),
    SetServiceType(String),
}
