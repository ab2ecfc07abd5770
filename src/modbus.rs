//! Modbus RTU client for ZBM battery controller communication
//!
//! This module provides the serial-line implementation of
//! [`RegisterTransport`]: one RTU context on one port, addressed per request,
//! with a response timeout and lazy (re)connection after link errors.

use crate::config::TransportConfig;
use crate::error::{Result, ZbmError};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::transport::RegisterTransport;
use std::time::Duration;
use tokio::time::timeout;
use tokio_modbus::ExceptionCode;
use tokio_modbus::client::{Context, rtu};
use tokio_modbus::prelude::*;

/// Modbus RTU client on a serial port
pub struct ModbusClient {
    /// RTU context, present while the port is open
    client: Option<Context>,

    /// Serial link configuration
    config: TransportConfig,

    /// Per-request reply timeout
    operation_timeout: Duration,

    logger: StructuredLogger,
}

impl ModbusClient {
    /// Create a new client; the port is opened on first use
    pub fn new(config: &TransportConfig) -> Self {
        let logger = get_logger_with_context(LogContext::new("modbus").with_port(&config.port));
        Self {
            client: None,
            config: config.clone(),
            operation_timeout: Duration::from_millis(config.response_timeout_ms),
            logger,
        }
    }

    /// Open the serial port and attach an RTU context to it
    pub fn connect(&mut self) -> Result<()> {
        self.logger.info(&format!(
            "Opening serial port {} at {} baud",
            self.config.port, self.config.baud_rate
        ));

        let builder =
            tokio_serial::new(&self.config.port, self.config.baud_rate).timeout(self.operation_timeout);
        let stream = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            let err = ZbmError::from(e);
            self.logger.error(&err.to_string());
            err
        })?;

        self.client = Some(rtu::attach(stream));
        self.logger.info("Serial port opened");
        Ok(())
    }

    /// Close the serial port
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.logger.info("Closing serial port");
        }
    }

    /// Check if the port is open
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Get the RTU context addressed to `device_address`, opening the port if needed
    fn get_client(&mut self, device_address: u8) -> Result<&mut Context> {
        if self.client.is_none() {
            self.connect()?;
        }
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| ZbmError::modbus("Not connected to serial port"))?;
        client.set_slave(Slave(device_address));
        Ok(client)
    }

    /// Map the nested tokio-modbus outcome onto the transport contract.
    /// Link errors and timeouts drop the context so the next request starts on
    /// a freshly opened port instead of a half-received frame.
    fn settle<T>(
        &mut self,
        what: &str,
        outcome: std::result::Result<
            std::result::Result<std::result::Result<T, ExceptionCode>, tokio_modbus::Error>,
            tokio::time::error::Elapsed,
        >,
    ) -> Result<T> {
        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(code))) => {
                let code = exception_code(code);
                self.logger
                    .warn(&format!("{} answered with exception {:#04x}", what, code));
                Err(ZbmError::exception(code))
            }
            Ok(Err(e)) => {
                let error_msg = format!("{} failed: {}", what, e);
                self.logger.error(&error_msg);
                self.disconnect();
                Err(ZbmError::modbus(error_msg))
            }
            Err(_) => {
                self.logger.debug(&format!("{} timed out", what));
                self.disconnect();
                Err(ZbmError::timeout(format!("{} timeout", what)))
            }
        }
    }
}

#[async_trait::async_trait]
impl RegisterTransport for ModbusClient {
    async fn read_registers(
        &mut self,
        device_address: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.logger.trace(&format!(
            "Reading {} registers from {:#06x} on device {}",
            count, start, device_address
        ));

        let timeout_duration = self.operation_timeout;
        let client = self.get_client(device_address)?;
        let outcome = timeout(timeout_duration, client.read_holding_registers(start, count)).await;
        self.settle("Read", outcome)
    }

    async fn write_register(
        &mut self,
        device_address: u8,
        register: u16,
        value: u16,
    ) -> Result<()> {
        self.logger.debug(&format!(
            "Writing {} to register {:#06x} on device {}",
            value, register, device_address
        ));

        let timeout_duration = self.operation_timeout;
        let client = self.get_client(device_address)?;
        let outcome =
            timeout(timeout_duration, client.write_single_register(register, value)).await;
        self.settle("Write", outcome)
    }
}

/// Raw code of a Modbus exception response, non-standard codes included
pub fn exception_code(code: ExceptionCode) -> u8 {
    u8::from(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modbus_client_creation() {
        let config = TransportConfig::default();
        let client = ModbusClient::new(&config);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_exception_codes() {
        assert_eq!(exception_code(ExceptionCode::IllegalDataAddress), 0x02);
        assert_eq!(exception_code(ExceptionCode::ServerDeviceBusy), 0x06);
        assert_eq!(exception_code(ExceptionCode::Custom(0x80)), 0x80);
    }

    #[tokio::test]
    async fn test_missing_port_reports_error() {
        let config = TransportConfig {
            port: "/dev/does-not-exist-zbm".to_string(),
            ..Default::default()
        };
        let mut client = ModbusClient::new(&config);
        let err = client.read_registers(1, 0x000D, 1).await.unwrap_err();
        assert!(matches!(err, ZbmError::Modbus { .. }));
        assert!(!client.is_connected());
    }
}
