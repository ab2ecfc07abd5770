//! Acquisition command table
//!
//! Each composite command reads one contiguous block of holding registers and
//! distributes the returned words over several device fields.

use crate::device::DeviceField;
use crate::registers::{decode_signed16, decode_unsigned16};

/// Maximum number of field actions in one composite command
pub const MAX_REG_COUNT: usize = 6;

/// Device field a register word is decoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Terminates a field map; no word beyond it is considered
    None,
    BattVolts,
    BussVolts,
    BattAmps,
    BussAmps,
    BattTemp,
    AirTemp,
    Soc,
    SocAmpHrs,
    StsRegWarning,
    StsRegSummary,
    StsRegHardwareFailure,
    StsRegOperationalFailure,
    /// Word is read (it widens the request) but not decoded
    NotUsed,
    StsRegOperationalMode,
    HealthIndication,
    ZbmState,
}

impl Parameter {
    /// Decode one register word into the device field it belongs to.
    /// Currents, temperatures and amp-hours are signed; everything else is unsigned.
    pub fn decode(self, word: u16) -> Option<(DeviceField, i32)> {
        let decoded = match self {
            Parameter::BattVolts => (DeviceField::BattVolts, decode_unsigned16(word)),
            Parameter::BussVolts => (DeviceField::BussVolts, decode_unsigned16(word)),
            Parameter::BattAmps => (DeviceField::BattAmps, decode_signed16(word)),
            Parameter::BussAmps => (DeviceField::BussAmps, decode_signed16(word)),
            Parameter::BattTemp => (DeviceField::BattTemp, decode_signed16(word)),
            Parameter::AirTemp => (DeviceField::AirTemp, decode_signed16(word)),
            Parameter::Soc => (DeviceField::Soc, decode_unsigned16(word)),
            Parameter::SocAmpHrs => (DeviceField::SocAmpHrs, decode_signed16(word)),
            Parameter::StsRegWarning => (DeviceField::StsRegWarning, decode_unsigned16(word)),
            Parameter::StsRegSummary => (DeviceField::StsRegSummary, decode_unsigned16(word)),
            Parameter::StsRegHardwareFailure => {
                (DeviceField::StsRegHardwareFailure, decode_unsigned16(word))
            }
            Parameter::StsRegOperationalFailure => {
                (DeviceField::StsRegOperationalFailure, decode_unsigned16(word))
            }
            Parameter::StsRegOperationalMode => {
                (DeviceField::StsRegOperationalMode, decode_unsigned16(word))
            }
            Parameter::HealthIndication => {
                (DeviceField::HealthIndication, decode_unsigned16(word))
            }
            Parameter::ZbmState => (DeviceField::State, decode_unsigned16(word)),
            Parameter::None | Parameter::NotUsed => return None,
        };
        Some(decoded)
    }
}

/// One (word offset, field) pair of a composite command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAction {
    pub offset: u16,
    pub parameter: Parameter,
}

const fn act(offset: u16, parameter: Parameter) -> RegisterAction {
    RegisterAction { offset, parameter }
}

/// A logical acquisition step reading one register block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeCommand {
    /// First register of the block
    pub register: u16,
    /// 0 = every cycle, N = only in acquisition cycle N
    pub interval: u32,
    pub actions: [RegisterAction; MAX_REG_COUNT],
}

impl CompositeCommand {
    /// Actions up to (not including) the first [`Parameter::None`] sentinel
    pub fn active_actions(&self) -> impl Iterator<Item = &RegisterAction> {
        self.actions
            .iter()
            .take_while(|a| a.parameter != Parameter::None)
    }

    /// Registers to request: highest referenced offset plus two, so that a
    /// field spanning two words at the last offset is still covered
    pub fn register_count(&self) -> u16 {
        self.active_actions()
            .map(|a| a.offset)
            .max()
            .unwrap_or(0)
            + 2
    }

    /// Whether this command runs in the given acquisition cycle
    pub fn is_due(&self, cycle_index: u32) -> bool {
        self.interval == 0 || self.interval == cycle_index
    }
}

/// Command table of the ZBM battery controller
pub static ZBM_COMMANDS: [CompositeCommand; 4] = [
    CompositeCommand {
        register: 0x9011,
        interval: 0,
        actions: [
            act(0, Parameter::Soc),
            act(1, Parameter::SocAmpHrs),
            act(2, Parameter::BattVolts),
            act(3, Parameter::BattAmps),
            act(4, Parameter::BattTemp),
            act(5, Parameter::AirTemp),
        ],
    },
    CompositeCommand {
        register: 0x9001,
        interval: 0,
        actions: [
            act(0, Parameter::StsRegSummary),
            act(1, Parameter::StsRegHardwareFailure),
            act(2, Parameter::StsRegOperationalFailure),
            act(3, Parameter::StsRegWarning),
            act(4, Parameter::NotUsed),
            act(5, Parameter::NotUsed),
        ],
    },
    CompositeCommand {
        register: 0x9008,
        interval: 0,
        actions: [
            act(0, Parameter::StsRegOperationalMode),
            act(1, Parameter::NotUsed),
            act(2, Parameter::NotUsed),
            act(3, Parameter::NotUsed),
            act(4, Parameter::NotUsed),
            act(5, Parameter::NotUsed),
        ],
    },
    CompositeCommand {
        register: 0x9017,
        interval: 0,
        actions: [
            act(0, Parameter::HealthIndication),
            act(1, Parameter::BussVolts),
            act(2, Parameter::ZbmState),
            act(3, Parameter::NotUsed),
            act(4, Parameter::NotUsed),
            act(5, Parameter::NotUsed),
        ],
    },
];
