//! Register transport contract
//!
//! A transport delivers exactly one outcome per request: the returned words,
//! a protocol exception ([`ZbmError::Exception`]) or a timeout
//! ([`ZbmError::Timeout`]). A transport may be shared by several device
//! sessions on the same serial link through [`SharedTransport`]; the mutex
//! keeps at most one request in flight and serves waiters in FIFO order.

use crate::error::{Result, ZbmError};
use std::sync::Arc;
use tokio::sync::Mutex;

#[async_trait::async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` holding registers starting at `start` from `device_address`
    async fn read_registers(
        &mut self,
        device_address: u8,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Write a single holding register on `device_address`
    async fn write_register(&mut self, device_address: u8, register: u16, value: u16)
    -> Result<()>;
}

/// Transport shared between the device sessions of one serial link
pub type SharedTransport = Arc<Mutex<dyn RegisterTransport>>;

/// Wrap a transport for sharing between sessions
pub fn shared<T: RegisterTransport + 'static>(transport: T) -> SharedTransport {
    Arc::new(Mutex::new(transport))
}

/// How the acquisition state machine sees a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Exception(u8),
}

impl Failure {
    /// Classify a transport error. Everything that is not an exception reply
    /// (link errors included) counts as a timeout and goes through the bounded
    /// retry policy.
    pub fn classify(err: &ZbmError) -> Self {
        match err {
            ZbmError::Exception { code } => Failure::Exception(*code),
            _ => Failure::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_failures() {
        assert_eq!(
            Failure::classify(&ZbmError::exception(2)),
            Failure::Exception(2)
        );
        assert_eq!(
            Failure::classify(&ZbmError::timeout("no reply")),
            Failure::Timeout
        );
        assert_eq!(
            Failure::classify(&ZbmError::modbus("Not connected")),
            Failure::Timeout
        );
    }
}
