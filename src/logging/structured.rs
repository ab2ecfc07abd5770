//! Component loggers bound to a serial link and a device address on it

use std::fmt;
use tracing::{debug, error, info, trace, warn};

/// Origin of a log line
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "updater", "modbus", "session")
    pub component: String,
    /// Serial port the component talks through
    pub port: Option<String>,
    /// Modbus address of the device on the shared link
    pub device_address: Option<u8>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            port: None,
            device_address: None,
        }
    }

    pub fn with_port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn with_device_address(mut self, device_address: u8) -> Self {
        self.device_address = Some(device_address);
        self
    }
}

/// `updater@/dev/ttyUSB0#1`, `modbus@/dev/ttyUSB0`, or just the component
impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.component)?;
        match (&self.port, self.device_address) {
            (Some(port), Some(address)) => write!(f, "@{}#{}", port, address),
            (Some(port), None) => write!(f, "@{}", port),
            (None, Some(address)) => write!(f, "#{}", address),
            (None, None) => Ok(()),
        }
    }
}

/// Logger that tags every event with its `source` label.
/// Several sessions share one port, so the address is what tells their lines apart.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
    source: String,
}

impl StructuredLogger {
    pub fn new(context: LogContext) -> Self {
        let source = context.to_string();
        Self { context, source }
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    pub fn info(&self, message: &str) {
        info!(source = %self.source, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(source = %self.source, "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(source = %self.source, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(source = %self.source, "{}", message);
    }

    pub fn trace(&self, message: &str) {
        trace!(source = %self.source, "{}", message);
    }
}

/// Create a logger for a component that is not bound to a link
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
