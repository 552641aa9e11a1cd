use std::time::Duration;

use tracing::{error, info};

use bacnet_to_mqtt::bacnet::client::BacnetClient;
use bacnet_to_mqtt::config::Config;
use bacnet_to_mqtt::mqtt::client::MqttPublisher;
use bacnet_to_mqtt::poll::Poller;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting bacnet-to-mqtt bridge (mqtt={}:{}, device={}:{}, {} points, every {}s)",
        config.mqtt.broker_host,
        config.mqtt.broker_port,
        config.bacnet.device_ip,
        config.bacnet.device_port,
        config.points.len(),
        config.poll.interval_secs,
    );

    let mut publisher = MqttPublisher::connect(&config.mqtt);

    // The broker connection is released below no matter how the run ends:
    // signal, device bind failure, or a fault out of the poll loop.
    match BacnetClient::bind(&config.bacnet).await {
        Ok(reader) => {
            let mut poller = Poller::new(
                reader,
                &mut publisher,
                config.points.clone(),
                config.mqtt.topic.clone(),
                config.poll.mode,
                Duration::from_secs(config.poll.interval_secs),
            );

            tokio::select! {
                _ = poller.run() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                }
                _ = async {
                    let mut sigterm = tokio::signal::unix::signal(
                        tokio::signal::unix::SignalKind::terminate()
                    ).expect("Failed to register SIGTERM handler");
                    sigterm.recv().await;
                } => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }
        Err(e) => {
            error!("Failed to open BACnet transport: {}", e);
        }
    }

    publisher.disconnect().await;
    info!("bacnet-to-mqtt bridge stopped");
}
