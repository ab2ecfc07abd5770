//! # redflow-zbm - Redflow ZBM battery controller driver
//!
//! Polls one or more Redflow ZBM zinc-bromide battery controllers over
//! Modbus RTU and keeps a live record of each device for a telemetry bridge
//! (Victron Venus OS) to publish.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration with defaults and validation
//! - `logging`: Structured logging and tracing
//! - `registers`: Register word decoding and fixed-point scaling
//! - `commands`: Static acquisition command table
//! - `device`: Device record, settings object and change notification
//! - `transport`: Register transport contract shared by device sessions
//! - `modbus`: Modbus RTU transport on a serial port
//! - `driver`: Acquisition state machine and per-device session loop

pub mod commands;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod logging;
pub mod modbus;
pub mod registers;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use device::{ConnectionState, DeviceRecord};
pub use driver::{DeviceCommand, DeviceSession};
pub use error::{Result, ZbmError};
