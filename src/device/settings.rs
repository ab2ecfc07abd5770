use serde::Serialize;

/// Prefix of the bus service a detected battery is published under
pub const SERVICE_PREFIX: &str = "com.victronenergy.battery.redflow_";

/// Per-device settings, present only while a device is detected or connected.
///
/// `service_type` and `custom_name` are owned by the publishing side; the
/// driver only creates the object on detection and drops it on connection loss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSettings {
    device_type: i32,
    serial: String,
    custom_name: String,
    service_type: String,
}

impl DeviceSettings {
    pub fn new(device_type: i32, serial: &str) -> Self {
        Self {
            device_type,
            serial: serial.to_string(),
            custom_name: String::new(),
            service_type: String::new(),
        }
    }

    pub fn device_type(&self) -> i32 {
        self.device_type
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn custom_name(&self) -> &str {
        &self.custom_name
    }

    /// Returns true when the name actually changed
    pub fn set_custom_name(&mut self, name: &str) -> bool {
        if self.custom_name == name {
            return false;
        }
        self.custom_name = name.to_string();
        true
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    /// Returns true when the service type actually changed
    pub fn set_service_type(&mut self, service_type: &str) -> bool {
        if self.service_type == service_type {
            return false;
        }
        self.service_type = service_type.to_string();
        true
    }

    /// Name shown to users; falls back to the product name when no custom name is set
    pub fn display_name<'a>(&'a self, product_name: &'a str) -> &'a str {
        if self.custom_name.is_empty() {
            product_name
        } else {
            &self.custom_name
        }
    }

    /// Bus service name of this device
    pub fn service_name(&self) -> String {
        format!("{}{}", SERVICE_PREFIX, self.serial)
    }
}

/// Device instance derived from the serial port name:
/// `/dev/ttyUSBn` maps to 288 + n and `/dev/ttyOn` to 256 + n.
pub fn device_instance_for_port(port: &str) -> Option<u32> {
    const BASES: [(&str, u32); 2] = [("/dev/ttyUSB", 288), ("/dev/ttyO", 256)];
    BASES.iter().find_map(|(prefix, base)| {
        port.strip_prefix(prefix)
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(|n| base.checked_add(n))
    })
}
