//! Configuration management for the ZBM driver
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{Result, ZbmError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod defaults;

/// Highest address a Modbus RTU slave may use
pub const MAX_DEVICE_ADDRESS: u8 = 247;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link shared by all configured devices
    pub transport: TransportConfig,

    /// Device addresses polled on the shared link
    pub devices: Vec<u8>,

    /// Timing and retry policy of the acquisition state machine
    pub acquisition: AcquisitionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Serial link parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial device path (eg. /dev/ttyUSB0)
    pub port: String,

    /// Line speed in baud
    pub baud_rate: u32,

    /// Time to wait for a reply before reporting a timeout
    pub response_timeout_ms: u64,
}

/// Acquisition state machine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Consecutive timeouts that are treated as a lost connection
    pub max_timeout_count: u32,

    /// Fixed delay between two acquisition cycles
    pub wait_interval_ms: u64,

    /// Back-off before re-identifying a device after connection loss
    pub connection_lost_wait_ms: u64,

    /// Number of acquisition cycles in one full pass (cycle index wraps here)
    pub cycle_count: u32,
}

impl AcquisitionConfig {
    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }

    pub fn connection_lost_wait(&self) -> Duration {
        Duration::from_millis(self.connection_lost_wait_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console level override
    pub console_level: Option<String>,

    /// Optional file level override
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rotated files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "redflow_zbm.yaml",
            "/data/redflow_zbm.yaml",
            "/etc/redflow-zbm/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                let config = Self::from_file(path)?;
                config.validate()?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.transport.port.is_empty() {
            return Err(ZbmError::validation(
                "transport.port",
                "Serial port cannot be empty",
            ));
        }

        if self.transport.baud_rate == 0 {
            return Err(ZbmError::validation(
                "transport.baud_rate",
                "Must be greater than 0",
            ));
        }

        if self.transport.response_timeout_ms == 0 {
            return Err(ZbmError::validation(
                "transport.response_timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.devices.is_empty() {
            return Err(ZbmError::validation(
                "devices",
                "At least one device address is required",
            ));
        }

        if let Some(bad) = self
            .devices
            .iter()
            .find(|a| **a == 0 || **a > MAX_DEVICE_ADDRESS)
        {
            return Err(ZbmError::validation(
                "devices".to_string(),
                format!("Device address {} outside 1..={}", bad, MAX_DEVICE_ADDRESS),
            ));
        }

        if self.acquisition.max_timeout_count == 0 {
            return Err(ZbmError::validation(
                "acquisition.max_timeout_count",
                "Must be greater than 0",
            ));
        }

        if self.acquisition.cycle_count == 0 {
            return Err(ZbmError::validation(
                "acquisition.cycle_count",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
