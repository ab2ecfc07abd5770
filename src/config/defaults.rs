use super::*;

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            response_timeout_ms: 1000,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_timeout_count: 5,
            wait_interval_ms: 5000,
            connection_lost_wait_ms: 60_000,
            cycle_count: 1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/var/log/redflow-zbm/redflow-zbm.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            devices: vec![1],
            acquisition: AcquisitionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
