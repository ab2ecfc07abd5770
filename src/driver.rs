//! Device session of the ZBM driver
//!
//! A [`DeviceSession`] owns the acquisition state machine of one device and
//! executes its actions against a shared register transport. Commands from
//! the publishing side are applied between transport outcomes without
//! cancelling the request in flight, and a snapshot of the device record is
//! published after every change.

use crate::config::AcquisitionConfig;
use crate::device::{DeviceRecord, DeviceSnapshot};
use crate::error::Result;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::transport::{Failure, SharedTransport};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

mod commands;
mod types;
mod updater;

pub use types::{Action, DetectStep, DeviceCommand, Event, EventKind, IdentifyStep, Phase};
pub use updater::Updater;

/// Acquisition session of one device on a (possibly shared) serial link
pub struct DeviceSession {
    updater: Updater,

    /// Register transport, shared with the other sessions on the same port
    transport: SharedTransport,

    logger: StructuredLogger,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Commands from the publishing side
    commands_tx: mpsc::UnboundedSender<DeviceCommand>,
    commands_rx: mpsc::UnboundedReceiver<DeviceCommand>,

    /// Latest snapshot of the device record
    snapshot_tx: watch::Sender<Arc<DeviceSnapshot>>,
}

impl DeviceSession {
    pub fn new(record: DeviceRecord, transport: SharedTransport, config: &AcquisitionConfig) -> Self {
        Self::with_updater(Updater::new(record, config), transport)
    }

    /// Create a session around an already configured state machine
    pub fn with_updater(updater: Updater, transport: SharedTransport) -> Self {
        let record = updater.record();
        let logger = get_logger_with_context(
            LogContext::new("session")
                .with_port(record.port_name())
                .with_device_address(record.device_address()),
        );
        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(Arc::new(record.snapshot()));

        Self {
            updater,
            transport,
            logger,
            shutdown_tx,
            shutdown_rx,
            commands_tx,
            commands_rx,
            snapshot_tx,
        }
    }

    pub fn device_address(&self) -> u8 {
        self.updater.record().device_address()
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    pub fn record(&self) -> &DeviceRecord {
        self.updater.record()
    }

    /// Mutable record access, e.g. to register change listeners before `run`
    pub fn record_mut(&mut self) -> &mut DeviceRecord {
        self.updater.record_mut()
    }

    /// Sender for stopping [`DeviceSession::run`]
    pub fn shutdown_sender(&self) -> mpsc::UnboundedSender<()> {
        self.shutdown_tx.clone()
    }

    /// Sender for [`DeviceCommand`]s
    pub fn command_sender(&self) -> mpsc::UnboundedSender<DeviceCommand> {
        self.commands_tx.clone()
    }

    /// Subscribe to record snapshots
    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<DeviceSnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Request shutdown of the session loop
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the acquisition loop until shutdown is requested
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting device session");

        loop {
            let action = self.updater.next_action();
            self.publish_snapshot();

            let io = execute(self.transport.clone(), self.device_address(), action);
            tokio::pin!(io);

            let event = loop {
                tokio::select! {
                    event = &mut io => break event,
                    Some(cmd) = self.commands_rx.recv() => {
                        self.handle_command(cmd);
                        self.publish_snapshot();
                    }
                    _ = self.shutdown_rx.recv() => {
                        self.logger.info("Shutdown signal received");
                        return Ok(());
                    }
                }
            };

            self.updater.handle(event);
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx
            .send_replace(Arc::new(self.updater.record().snapshot()));
    }
}

/// Perform one action and report its outcome as an event
async fn execute(transport: SharedTransport, device_address: u8, action: Action) -> Event {
    let kind = match action {
        Action::Read { start, count } => {
            let result = {
                let mut transport = transport.lock().await;
                transport.read_registers(device_address, start, count).await
            };
            match result {
                Ok(words) => EventKind::ReadCompleted(words),
                Err(e) => match Failure::classify(&e) {
                    Failure::Exception(code) => EventKind::Exception(code),
                    Failure::Timeout => EventKind::Timeout,
                },
            }
        }
        Action::Sleep(duration) => {
            tokio::time::sleep(duration).await;
            EventKind::TimerExpired
        }
    };
    Event::new(device_address, kind)
}

#[cfg(test)]
mod tests;
