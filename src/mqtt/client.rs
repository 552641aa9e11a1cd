use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::MqttConfig;
use crate::poll::{PublishError, Publisher, ReadingSet};

/// Owns the one broker connection for the process lifetime: the rumqttc
/// client plus the task driving its event loop.
pub struct MqttPublisher {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

impl MqttPublisher {
    /// Open the broker connection and start the event-loop driver. The
    /// connection is established asynchronously; an unreachable broker never
    /// blocks the poll loop, publishes just fail per call.
    pub fn connect(config: &MqttConfig) -> Self {
        let mut mqttopts = MqttOptions::new(
            &config.client_id,
            &config.broker_host,
            config.broker_port,
        );
        mqttopts.set_keep_alive(std::time::Duration::from_secs(30));

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            mqttopts.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttopts, 100);

        let broker = format!("{}:{}", config.broker_host, config.broker_port);
        let reconnect = config.reconnect;
        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        info!("Connected to MQTT broker {}", broker);
                    }
                    Ok(_) => {}
                    Err(e) => match reconnect {
                        Some(delay) => {
                            error!("MQTT connection error: {}. Reconnecting in {:?}", e, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!("MQTT connection error: {}", e);
                            break;
                        }
                    },
                }
            }
        });

        Self { client, driver }
    }

    /// Tear down the broker connection. Called exactly once, on every exit
    /// path.
    pub async fn disconnect(self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect: {}", e);
        }
        self.driver.abort();
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&mut self, topic: &str, readings: &ReadingSet) -> Result<(), PublishError> {
        let payload = serde_json::to_string(readings)?;
        info!("Publishing to {}: {}", topic, payload);

        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}
