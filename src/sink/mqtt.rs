//! MQTT batch sink backed by `rumqttc`.

use super::BatchSink;
use crate::config::MqttConfig;
use crate::report::Batch;
use log::{debug, error, info};
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Publishes rendered batches as JSON to a single telemetry topic.
///
/// Connection management, reconnects and keepalives are rumqttc's problem;
/// this type only queues publishes and reports whether queueing succeeded.
/// The returned [`EventLoop`] must be driven (see [`MqttSink::drive`]) for
/// any traffic to flow.
pub struct MqttSink {
    client: AsyncClient,
    topic: String,
}

impl MqttSink {
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.host.clone(),
            config.port,
        );
        options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 10);
        (
            MqttSink {
                client,
                topic: config.topic.clone(),
            },
            eventloop,
        )
    }

    /// Drive the rumqttc event loop forever. Poll errors are logged and the
    /// loop backs off briefly; rumqttc reconnects on the next poll.
    pub async fn drive(mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(notification) => {
                    debug!("mqtt event: {notification:?}");
                }
                Err(e) => {
                    error!("mqtt event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("disconnecting mqtt client");
        self.client.disconnect().await
    }
}

impl BatchSink for MqttSink {
    fn publish_batch<'a>(
        &'a self,
        batch: &'a Batch,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let payload = match serde_json::to_vec(batch) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("failed to serialize batch: {e}");
                    return false;
                }
            };
            let size = payload.len();
            match self
                .client
                .publish(self.topic.clone(), QoS::AtMostOnce, false, payload)
                .await
            {
                Ok(()) => {
                    debug!(
                        "published batch of {} devices ({size} bytes) to {}",
                        batch.len(),
                        self.topic
                    );
                    true
                }
                Err(e) => {
                    error!("failed to publish batch to {}: {e}", self.topic);
                    false
                }
            }
        })
    }
}
