use anyhow::Result;
use redflow_zbm::config::Config;
use redflow_zbm::device::{DeviceField, DeviceRecord, device_instance_for_port};
use redflow_zbm::driver::DeviceSession;
use redflow_zbm::logging::{LogContext, get_logger, get_logger_with_context, init_logging};
use redflow_zbm::modbus::ModbusClient;
use redflow_zbm::transport::shared;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let logger = get_logger("main");
    logger.info(&format!(
        "Redflow ZBM driver {} ({}) starting on {}",
        env!("APP_VERSION"),
        env!("APP_TARGET"),
        config.transport.port
    ));
    if let Some(instance) = device_instance_for_port(&config.transport.port) {
        logger.info(&format!("Device instance {}", instance));
    }

    // All devices on the port share one RTU client
    let transport = shared(ModbusClient::new(&config.transport));

    let mut shutdowns = Vec::new();
    let mut tasks = Vec::new();
    for &address in &config.devices {
        let mut record = DeviceRecord::new(&config.transport.port, address);
        let device_logger = get_logger_with_context(
            LogContext::new("device")
                .with_port(&config.transport.port)
                .with_device_address(address),
        );
        record.on_change(DeviceField::ConnectionState, move |r, _| {
            device_logger.info(&format!("Connection state: {:?}", r.connection_state()));
        });

        let mut session = DeviceSession::new(record, transport.clone(), &config.acquisition);
        shutdowns.push(session.shutdown_sender());
        tasks.push(tokio::spawn(async move { session.run().await }));
    }

    tokio::signal::ctrl_c().await?;
    logger.info("Interrupt received, stopping device sessions");
    for tx in &shutdowns {
        let _ = tx.send(());
    }

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => logger.error(&format!("Device session failed: {}", e)),
            Err(e) => logger.error(&format!("Device session panicked: {}", e)),
        }
    }

    logger.info("Driver shutdown complete");
    Ok(())
}
