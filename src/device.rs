//! Device record of one ZBM battery controller
//!
//! The record holds identity, connection status and every decoded measurement
//! of a single device. It is mutated only by the acquisition state machine.
//! Each mutation that changes a stored value is reported synchronously to the
//! registered listeners, either per field or for the whole record. Fields keep
//! their last known value until a newer read overwrites them.

use crate::error::{Result, ZbmError};
use crate::registers::{AMPS_SCALE, SOC_SCALE, TEMP_SCALE, VOLTS_SCALE, unscale};
use serde::{Deserialize, Serialize};
use std::fmt;

mod settings;

pub use settings::{DeviceSettings, SERVICE_PREFIX, device_instance_for_port};

/// Product name reported for every ZBM controller
pub const PRODUCT_NAME: &str = "ZBM";

/// Externally visible health of the device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Searching,
    Detected,
    Connected,
}

impl ConnectionState {
    /// Value published on the `/Connected` path
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

/// Every observable field of a [`DeviceRecord`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceField {
    ConnectionState,
    Serial,
    FirmwareVersion,
    DeviceType,
    DeviceSubType,
    ErrorCode,
    BattVolts,
    BussVolts,
    BattAmps,
    BussAmps,
    BattTemp,
    AirTemp,
    BattPower,
    Soc,
    SocAmpHrs,
    HealthIndication,
    State,
    StsRegSummary,
    StsRegHardwareFailure,
    StsRegOperationalFailure,
    StsRegWarning,
    StsRegOperationalMode,
    ClearStatusRegisterFlags,
    RequestDelayedSelfMaintenance,
    SetOperationalMode,
    RequestImmediateSelfMaintenance,
    EnableSelfMaintenanceAtEndOfDischarge,
    EnterRunCommand,
    SelfDischargeAndMaintenanceCycle,
    Settings,
    CustomName,
    ServiceType,
}

impl DeviceField {
    /// Maintenance/command fields that the publishing side may write
    pub fn is_command(self) -> bool {
        matches!(
            self,
            DeviceField::ClearStatusRegisterFlags
                | DeviceField::RequestDelayedSelfMaintenance
                | DeviceField::SetOperationalMode
                | DeviceField::RequestImmediateSelfMaintenance
                | DeviceField::EnableSelfMaintenanceAtEndOfDischarge
                | DeviceField::EnterRunCommand
                | DeviceField::SelfDischargeAndMaintenanceCycle
        )
    }
}

/// Change listener; receives the record after the change and the changed field
pub type Listener = Box<dyn Fn(&DeviceRecord, DeviceField) + Send + Sync>;

/// Mutable state of one physical device
pub struct DeviceRecord {
    port_name: String,
    device_address: u8,

    connection_state: ConnectionState,
    serial: String,
    firmware_version: i32,
    device_type: i32,
    device_sub_type: i32,
    error_code: i32,

    batt_volts: i32,
    buss_volts: i32,
    batt_amps: i32,
    buss_amps: i32,
    batt_temp: i32,
    air_temp: i32,
    soc: i32,
    soc_amp_hrs: i32,
    health_indication: i32,
    state: i32,

    sts_reg_summary: i32,
    sts_reg_hardware_failure: i32,
    sts_reg_operational_failure: i32,
    sts_reg_warning: i32,
    sts_reg_operational_mode: i32,

    clear_status_register_flags: i32,
    request_delayed_self_maintenance: i32,
    set_operational_mode: i32,
    request_immediate_self_maintenance: i32,
    enable_self_maintenance_at_end_of_discharge: i32,
    enter_run_command: i32,
    self_discharge_and_maintenance_cycle: i32,

    settings: Option<DeviceSettings>,
    listeners: Vec<(Option<DeviceField>, Listener)>,
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("port_name", &self.port_name)
            .field("device_address", &self.device_address)
            .field("connection_state", &self.connection_state)
            .field("serial", &self.serial)
            .field("settings", &self.settings)
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl DeviceRecord {
    /// Create the record for the device at `device_address` on `port_name`
    pub fn new(port_name: &str, device_address: u8) -> Self {
        Self {
            port_name: port_name.to_string(),
            device_address,
            connection_state: ConnectionState::Disconnected,
            serial: String::new(),
            firmware_version: 0,
            device_type: 0,
            device_sub_type: 0,
            error_code: 0,
            batt_volts: 0,
            buss_volts: 0,
            batt_amps: 0,
            buss_amps: 0,
            batt_temp: 0,
            air_temp: 0,
            soc: 0,
            soc_amp_hrs: 0,
            health_indication: 0,
            state: 0,
            sts_reg_summary: 0,
            sts_reg_hardware_failure: 0,
            sts_reg_operational_failure: 0,
            sts_reg_warning: 0,
            sts_reg_operational_mode: 0,
            clear_status_register_flags: 0,
            request_delayed_self_maintenance: 0,
            set_operational_mode: 0,
            request_immediate_self_maintenance: 0,
            enable_self_maintenance_at_end_of_discharge: 0,
            enter_run_command: 0,
            self_discharge_and_maintenance_cycle: 0,
            settings: None,
            listeners: Vec::new(),
        }
    }

    /// Register a listener for a single field
    pub fn on_change<F>(&mut self, field: DeviceField, listener: F)
    where
        F: Fn(&DeviceRecord, DeviceField) + Send + Sync + 'static,
    {
        self.listeners.push((Some(field), Box::new(listener)));
    }

    /// Register a listener for every field
    pub fn on_any_change<F>(&mut self, listener: F)
    where
        F: Fn(&DeviceRecord, DeviceField) + Send + Sync + 'static,
    {
        self.listeners.push((None, Box::new(listener)));
    }

    fn notify(&self, field: DeviceField) {
        for (filter, listener) in &self.listeners {
            if filter.is_none_or(|f| f == field) {
                listener(self, field);
            }
        }
    }

    fn int_slot(&mut self, field: DeviceField) -> Option<&mut i32> {
        let slot = match field {
            DeviceField::FirmwareVersion => &mut self.firmware_version,
            DeviceField::DeviceType => &mut self.device_type,
            DeviceField::DeviceSubType => &mut self.device_sub_type,
            DeviceField::ErrorCode => &mut self.error_code,
            DeviceField::BattVolts => &mut self.batt_volts,
            DeviceField::BussVolts => &mut self.buss_volts,
            DeviceField::BattAmps => &mut self.batt_amps,
            DeviceField::BussAmps => &mut self.buss_amps,
            DeviceField::BattTemp => &mut self.batt_temp,
            DeviceField::AirTemp => &mut self.air_temp,
            DeviceField::Soc => &mut self.soc,
            DeviceField::SocAmpHrs => &mut self.soc_amp_hrs,
            DeviceField::HealthIndication => &mut self.health_indication,
            DeviceField::State => &mut self.state,
            DeviceField::StsRegSummary => &mut self.sts_reg_summary,
            DeviceField::StsRegHardwareFailure => &mut self.sts_reg_hardware_failure,
            DeviceField::StsRegOperationalFailure => &mut self.sts_reg_operational_failure,
            DeviceField::StsRegWarning => &mut self.sts_reg_warning,
            DeviceField::StsRegOperationalMode => &mut self.sts_reg_operational_mode,
            DeviceField::ClearStatusRegisterFlags => &mut self.clear_status_register_flags,
            DeviceField::RequestDelayedSelfMaintenance => {
                &mut self.request_delayed_self_maintenance
            }
            DeviceField::SetOperationalMode => &mut self.set_operational_mode,
            DeviceField::RequestImmediateSelfMaintenance => {
                &mut self.request_immediate_self_maintenance
            }
            DeviceField::EnableSelfMaintenanceAtEndOfDischarge => {
                &mut self.enable_self_maintenance_at_end_of_discharge
            }
            DeviceField::EnterRunCommand => &mut self.enter_run_command,
            DeviceField::SelfDischargeAndMaintenanceCycle => {
                &mut self.self_discharge_and_maintenance_cycle
            }
            DeviceField::ConnectionState
            | DeviceField::Serial
            | DeviceField::BattPower
            | DeviceField::Settings
            | DeviceField::CustomName
            | DeviceField::ServiceType => return None,
        };
        Some(slot)
    }

    /// Store a raw (still scaled) integer field. Returns false for fields
    /// that are not integer-valued.
    pub(crate) fn store_raw(&mut self, field: DeviceField, value: i32) -> bool {
        let Some(slot) = self.int_slot(field) else {
            return false;
        };
        if *slot != value {
            *slot = value;
            self.notify(field);
            if matches!(field, DeviceField::BattVolts | DeviceField::BattAmps) {
                self.notify(DeviceField::BattPower);
            }
        }
        true
    }

    /// Raw stored value of an integer field
    pub fn raw(&self, field: DeviceField) -> Option<i32> {
        let value = match field {
            DeviceField::FirmwareVersion => self.firmware_version,
            DeviceField::DeviceType => self.device_type,
            DeviceField::DeviceSubType => self.device_sub_type,
            DeviceField::ErrorCode => self.error_code,
            DeviceField::BattVolts => self.batt_volts,
            DeviceField::BussVolts => self.buss_volts,
            DeviceField::BattAmps => self.batt_amps,
            DeviceField::BussAmps => self.buss_amps,
            DeviceField::BattTemp => self.batt_temp,
            DeviceField::AirTemp => self.air_temp,
            DeviceField::Soc => self.soc,
            DeviceField::SocAmpHrs => self.soc_amp_hrs,
            DeviceField::HealthIndication => self.health_indication,
            DeviceField::State => self.state,
            DeviceField::StsRegSummary => self.sts_reg_summary,
            DeviceField::StsRegHardwareFailure => self.sts_reg_hardware_failure,
            DeviceField::StsRegOperationalFailure => self.sts_reg_operational_failure,
            DeviceField::StsRegWarning => self.sts_reg_warning,
            DeviceField::StsRegOperationalMode => self.sts_reg_operational_mode,
            DeviceField::ClearStatusRegisterFlags => self.clear_status_register_flags,
            DeviceField::RequestDelayedSelfMaintenance => self.request_delayed_self_maintenance,
            DeviceField::SetOperationalMode => self.set_operational_mode,
            DeviceField::RequestImmediateSelfMaintenance => {
                self.request_immediate_self_maintenance
            }
            DeviceField::EnableSelfMaintenanceAtEndOfDischarge => {
                self.enable_self_maintenance_at_end_of_discharge
            }
            DeviceField::EnterRunCommand => self.enter_run_command,
            DeviceField::SelfDischargeAndMaintenanceCycle => {
                self.self_discharge_and_maintenance_cycle
            }
            _ => return None,
        };
        Some(value)
    }

    /// Store a maintenance/command value requested by the publishing side.
    /// The value is kept as-is; acting on it is left to the device or a higher layer.
    pub fn set_command(&mut self, field: DeviceField, value: i32) -> Result<()> {
        if !field.is_command() {
            return Err(ZbmError::validation(
                format!("{:?}", field),
                "Field is not writable".to_string(),
            ));
        }
        self.store_raw(field, value);
        Ok(())
    }

    // Identity

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    pub fn product_name(&self) -> &'static str {
        PRODUCT_NAME
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection_state == state {
            return;
        }
        self.connection_state = state;
        self.notify(DeviceField::ConnectionState);
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn set_serial(&mut self, serial: &str) {
        if self.serial == serial {
            return;
        }
        self.serial = serial.to_string();
        self.notify(DeviceField::Serial);
    }

    pub fn firmware_version(&self) -> i32 {
        self.firmware_version
    }

    pub fn set_firmware_version(&mut self, version: i32) {
        self.store_raw(DeviceField::FirmwareVersion, version);
    }

    pub fn device_type(&self) -> i32 {
        self.device_type
    }

    pub fn device_sub_type(&self) -> i32 {
        self.device_sub_type
    }

    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    // Measurements, exposed in physical units

    /// Battery voltage in V
    pub fn battery_voltage(&self) -> f64 {
        unscale(self.batt_volts, VOLTS_SCALE)
    }

    /// Bus voltage in V
    pub fn bus_voltage(&self) -> f64 {
        unscale(self.buss_volts, VOLTS_SCALE)
    }

    /// Battery current in A; the meter reports the opposite sign convention
    pub fn battery_current(&self) -> f64 {
        -unscale(self.batt_amps, AMPS_SCALE)
    }

    /// Bus current in A (not part of the acquisition table)
    pub fn bus_current(&self) -> f64 {
        -unscale(self.buss_amps, AMPS_SCALE)
    }

    /// Battery power in W, derived from voltage and current
    pub fn battery_power(&self) -> f64 {
        self.battery_voltage() * self.battery_current()
    }

    /// Battery temperature in °C
    pub fn battery_temperature(&self) -> f64 {
        unscale(self.batt_temp, TEMP_SCALE)
    }

    /// Air temperature in °C
    pub fn air_temperature(&self) -> i32 {
        self.air_temp
    }

    /// State of charge in %
    pub fn soc(&self) -> f64 {
        unscale(self.soc, SOC_SCALE)
    }

    pub fn soc_amp_hours(&self) -> i32 {
        self.soc_amp_hrs
    }

    pub fn health_indication(&self) -> i32 {
        self.health_indication
    }

    /// Device operating state
    pub fn state(&self) -> i32 {
        self.state
    }

    pub fn status_summary(&self) -> i32 {
        self.sts_reg_summary
    }

    pub fn status_hardware_failure(&self) -> i32 {
        self.sts_reg_hardware_failure
    }

    pub fn status_operational_failure(&self) -> i32 {
        self.sts_reg_operational_failure
    }

    pub fn status_warning(&self) -> i32 {
        self.sts_reg_warning
    }

    pub fn status_operational_mode(&self) -> i32 {
        self.sts_reg_operational_mode
    }

    // Settings child object

    pub fn settings(&self) -> Option<&DeviceSettings> {
        self.settings.as_ref()
    }

    pub(crate) fn attach_settings(&mut self, settings: DeviceSettings) {
        self.settings = Some(settings);
        self.notify(DeviceField::Settings);
    }

    pub(crate) fn detach_settings(&mut self) {
        if self.settings.take().is_some() {
            self.notify(DeviceField::Settings);
        }
    }

    /// Returns false when no settings object exists (device not detected)
    pub fn set_custom_name(&mut self, name: &str) -> bool {
        let Some(settings) = self.settings.as_mut() else {
            return false;
        };
        if settings.set_custom_name(name) {
            self.notify(DeviceField::CustomName);
        }
        true
    }

    /// Returns false when no settings object exists (device not detected)
    pub fn set_service_type(&mut self, service_type: &str) -> bool {
        let Some(settings) = self.settings.as_mut() else {
            return false;
        };
        if settings.set_service_type(service_type) {
            self.notify(DeviceField::ServiceType);
        }
        true
    }

    /// Serializable copy of every exposed value
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            port_name: self.port_name.clone(),
            device_address: self.device_address,
            product_name: PRODUCT_NAME.to_string(),
            connection_state: self.connection_state,
            serial: self.serial.clone(),
            firmware_version: self.firmware_version,
            device_type: self.device_type,
            error_code: self.error_code,
            battery_voltage: self.battery_voltage(),
            bus_voltage: self.bus_voltage(),
            battery_current: self.battery_current(),
            battery_power: self.battery_power(),
            battery_temperature: self.battery_temperature(),
            air_temperature: self.air_temp,
            soc: self.soc(),
            soc_amp_hours: self.soc_amp_hrs,
            health_indication: self.health_indication,
            state: self.state,
            status_summary: self.sts_reg_summary,
            status_hardware_failure: self.sts_reg_hardware_failure,
            status_operational_failure: self.sts_reg_operational_failure,
            status_warning: self.sts_reg_warning,
            status_operational_mode: self.sts_reg_operational_mode,
            settings: self.settings.clone(),
        }
    }
}

/// Point-in-time copy of a [`DeviceRecord`]
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub timestamp: String,
    pub port_name: String,
    pub device_address: u8,
    pub product_name: String,
    pub connection_state: ConnectionState,
    pub serial: String,
    pub firmware_version: i32,
    pub device_type: i32,
    pub error_code: i32,
    pub battery_voltage: f64,
    pub bus_voltage: f64,
    pub battery_current: f64,
    pub battery_power: f64,
    pub battery_temperature: f64,
    pub air_temperature: i32,
    pub soc: f64,
    pub soc_amp_hours: i32,
    pub health_indication: i32,
    pub state: i32,
    pub status_summary: i32,
    pub status_hardware_failure: i32,
    pub status_operational_failure: i32,
    pub status_warning: i32,
    pub status_operational_mode: i32,
    pub settings: Option<DeviceSettings>,
}
