//! MQTT transport backed by `rumqttc`.
//!
//! [`connect`] splits the client into a [`MqttSink`] used by the poll loop and a
//! [`Connection`] that drives the rumqttc event loop on its own task. The
//! connection publishes its up/down state over a watch channel so the sink can
//! refuse messages while the broker is unreachable instead of queueing stale
//! readings.

use crate::BoxFuture;
use crate::config::MqttConfig;
use crate::logger::Logger;
use crate::publisher::{MessageSink, TransportError};
use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause after a connection error before the event loop reconnects.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Upper bound for flushing the DISCONNECT packet on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

impl From<ClientError> for TransportError {
    fn from(err: ClientError) -> Self {
        TransportError::Rejected(err.to_string())
    }
}

/// Map a validated QoS level to rumqttc's enum.
pub fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Client options for `config`.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    options
}

/// Create the client. Nothing touches the network until [`Connection::run`].
pub fn connect(config: &MqttConfig) -> (MqttSink, Connection) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), config.capacity);
    let (state_tx, state_rx) = watch::channel(false);

    let sink = MqttSink {
        client: client.clone(),
        qos: qos(config.qos),
        retain: config.retain,
        connected: state_rx,
    };
    let connection = Connection {
        client,
        eventloop,
        state: state_tx,
        reconnect_delay: RECONNECT_DELAY,
    };

    (sink, connection)
}

/// [`MessageSink`] publishing through an `AsyncClient`.
#[derive(Clone)]
pub struct MqttSink {
    client: AsyncClient,
    qos: QoS,
    retain: bool,
    connected: watch::Receiver<bool>,
}

impl MqttSink {
    /// Whether the broker acknowledged the current connection.
    ///
    /// Always false once the [`Connection`] driving the client is gone.
    pub fn is_connected(&self) -> bool {
        self.connected.has_changed().is_ok() && *self.connected.borrow()
    }

    /// Wait for the broker to acknowledge a connection.
    ///
    /// Returns false if `cancel` fires first or the [`Connection`] is gone.
    pub async fn wait_connected(&self, cancel: &CancellationToken) -> bool {
        let mut state = self.connected.clone();
        let acknowledged = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            connected = state.wait_for(|connected| *connected) => connected.is_ok(),
        };
        // wait_for still reports the last value after the sender is dropped.
        acknowledged && self.is_connected()
    }
}

impl MessageSink for MqttSink {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            // Also covers a closed request channel: the state sender lives
            // in the same Connection as the event loop.
            if !self.is_connected() {
                return Err(TransportError::NotConnected);
            }
            // Never wait on a full request queue: the poll loop must keep its
            // cadence through broker outages.
            self.client
                .try_publish(topic, self.qos, self.retain, payload)
                .map_err(TransportError::from)
        })
    }
}

/// Owner of the rumqttc event loop.
pub struct Connection {
    client: AsyncClient,
    eventloop: EventLoop,
    state: watch::Sender<bool>,
    reconnect_delay: Duration,
}

impl Connection {
    /// Poll the event loop until `cancel` fires, then disconnect.
    ///
    /// Connection errors are logged and retried after a short pause; rumqttc
    /// reconnects on the next poll.
    pub async fn run(mut self, cancel: CancellationToken, logger: Arc<dyn Logger>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    self.state.send_replace(true);
                    logger.info(&format!("MQTT client connected ({:?})", ack.code));
                }
                Ok(_) => {}
                Err(error) => {
                    if self.state.send_replace(false) {
                        logger.warn(&format!("MQTT connection lost: {error}"));
                    } else {
                        logger.warn(&format!("MQTT connection failed: {error}"));
                    }
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
            }
        }

        self.shutdown(logger.as_ref()).await;
    }

    async fn shutdown(&mut self, logger: &dyn Logger) {
        if !self.state.send_replace(false) {
            return;
        }
        if self.client.try_disconnect().is_err() {
            return;
        }

        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, flush).await.is_ok() {
            logger.info("MQTT client disconnected");
        }
    }
}
