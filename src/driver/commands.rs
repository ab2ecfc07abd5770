use super::{DeviceCommand, DeviceSession};

impl DeviceSession {
    pub(crate) fn handle_command(&mut self, cmd: DeviceCommand) {
        let record = self.updater.record_mut();
        match cmd {
            DeviceCommand::Write { field, value } => {
                if let Err(e) = record.set_command(field, value) {
                    self.logger.warn(&format!("Rejected write: {}", e));
                }
            }
            DeviceCommand::SetCustomName(name) => {
                if !record.set_custom_name(&name) {
                    self.logger
                        .warn("Custom name ignored: device not detected");
                }
            }
            DeviceCommand::SetServiceType(service_type) => {
                if !record.set_service_type(&service_type) {
                    self.logger
                        .warn("Service type ignored: device not detected");
                }
            }
        }
    }
}
