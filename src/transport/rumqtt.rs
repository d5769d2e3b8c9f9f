// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`Transport`] backed by `rumqttc`.
//!
//! Every connect attempt builds a fresh [`AsyncClient`] and spawns a task
//! that drives its [`EventLoop`]. The task waits for the broker's `ConnAck`
//! within the configured timeout, then forwards publishes, subscription
//! acknowledgements and connection failures as [`TransportEvent`]s. It never
//! reconnects on its own: after a failure it stops and leaves the decision
//! to the supervisor.

use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubAck, SubscribeFilter,
    SubscribeReasonCode,
};
use tokio::task::JoinHandle;

use super::{
    EventReceiver, EventSender, Generation, QosLevel, Transport, TransportEvent, event_channel,
};
use crate::config::WatcherConfig;
use crate::error::TransportError;

/// Minimum capacity of the request queue between client and event loop.
const REQUEST_CAPACITY: usize = 10;

/// Queue capacity for `topics` topics.
///
/// Teardown queues one UNSUBSCRIBE per topic plus a DISCONNECT without
/// yielding, on top of the SUBSCRIBE that may still be pending.
fn request_capacity(topics: usize) -> usize {
    REQUEST_CAPACITY.max(topics.saturating_add(2))
}

#[derive(Debug, Clone)]
struct ConnectOptions {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: String,
    keep_alive: Duration,
    connect_timeout: Duration,
    request_capacity: usize,
}

impl ConnectOptions {
    fn to_mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

/// MQTT transport using `rumqttc`.
///
/// Must be used from within a Tokio runtime.
pub struct RumqttTransport {
    options: ConnectOptions,
    events: EventSender,
    client: Option<(Generation, AsyncClient)>,
    driver: Option<JoinHandle<()>>,
}

impl RumqttTransport {
    /// Creates a transport for the broker in `config`.
    ///
    /// Returns the transport and the receiver its events arrive on.
    #[must_use]
    pub fn new(config: &WatcherConfig) -> (Self, EventReceiver) {
        let (events, rx) = event_channel();
        let options = ConnectOptions {
            host: config.host().to_string(),
            port: config.port(),
            credentials: config
                .credentials()
                .map(|(u, p)| (u.to_string(), p.to_string())),
            client_id: config.client_id().to_string(),
            keep_alive: config.keep_alive(),
            connect_timeout: config.connect_timeout(),
            request_capacity: request_capacity(config.devices().len()),
        };

        let transport = Self {
            options,
            events,
            client: None,
            driver: None,
        };
        (transport, rx)
    }

    fn client_for(&self, generation: Generation) -> Result<&AsyncClient, TransportError> {
        match &self.client {
            Some((current, client)) if *current == generation => Ok(client),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn abort_driver(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl Transport for RumqttTransport {
    fn connect(&mut self, generation: Generation) -> Result<(), TransportError> {
        self.abort_driver();

        tracing::info!(
            host = %self.options.host,
            port = self.options.port,
            client_id = %self.options.client_id,
            generation,
            "Connecting to MQTT broker"
        );

        let (client, event_loop) =
            AsyncClient::new(self.options.to_mqtt_options(), self.options.request_capacity);
        self.client = Some((generation, client));

        let events = self.events.clone();
        let timeout = self.options.connect_timeout;
        self.driver = Some(tokio::spawn(async move {
            drive_connection(event_loop, generation, timeout, events).await;
        }));

        Ok(())
    }

    fn subscribe(
        &mut self,
        generation: Generation,
        topics: &[String],
        qos: QosLevel,
    ) -> Result<(), TransportError> {
        let client = self.client_for(generation)?;
        let qos = to_qos(qos);
        client.try_subscribe_many(
            topics
                .iter()
                .map(|topic| SubscribeFilter::new(topic.clone(), qos)),
        )?;

        tracing::debug!(generation, topics = topics.len(), "Subscribe requested");
        Ok(())
    }

    fn unsubscribe(&mut self, topics: &[String]) -> Result<(), TransportError> {
        let Some((_, client)) = &self.client else {
            return Err(TransportError::NotConnected);
        };

        // Keep going so one full queue does not skip the remaining topics
        let mut first_err = None;
        for topic in topics {
            if let Err(e) = client.try_unsubscribe(topic.as_str()) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some((generation, client)) = self.client.take() else {
            return Ok(());
        };

        tracing::info!(
            host = %self.options.host,
            port = self.options.port,
            generation,
            "Disconnecting from MQTT broker"
        );

        // The driver exits by itself once the disconnect has been sent
        self.driver = None;
        client.try_disconnect()?;
        Ok(())
    }
}

impl Drop for RumqttTransport {
    fn drop(&mut self) {
        self.abort_driver();
    }
}

impl std::fmt::Debug for RumqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RumqttTransport")
            .field("host", &self.options.host)
            .field("port", &self.options.port)
            .field("generation", &self.client.as_ref().map(|(g, _)| *g))
            .finish_non_exhaustive()
    }
}

fn to_qos(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}

/// Drives one connection until it ends.
async fn drive_connection(
    mut event_loop: EventLoop,
    generation: Generation,
    connect_timeout: Duration,
    events: EventSender,
) {
    match tokio::time::timeout(connect_timeout, wait_for_connack(&mut event_loop)).await {
        Ok(Ok(())) => {
            tracing::debug!(generation, "MQTT broker accepted connection");
            let _ = events.send(TransportEvent::ConnectSucceeded { generation });
        }
        Ok(Err(cause)) => {
            let _ = events.send(TransportEvent::ConnectFailed { generation, cause });
            return;
        }
        Err(_) => {
            let cause = format!(
                "MQTT connection timeout after {}s",
                connect_timeout.as_secs()
            );
            let _ = events.send(TransportEvent::ConnectFailed { generation, cause });
            return;
        }
    }

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                let _ = events.send(TransportEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                });
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
                let _ = events.send(suback_event(generation, &suback));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                let _ = events.send(TransportEvent::ConnectionLost {
                    generation,
                    cause: "broker closed the connection".to_string(),
                });
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!(generation, "MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(TransportEvent::ConnectionLost {
                    generation,
                    cause: e.to_string(),
                });
                break;
            }
        }
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), String> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => return Err(e.to_string()),
        }
    }
}

fn suback_event(generation: Generation, suback: &SubAck) -> TransportEvent {
    let refused = suback
        .return_codes
        .iter()
        .filter(|code| matches!(code, SubscribeReasonCode::Failure))
        .count();

    if refused == 0 {
        TransportEvent::SubscribeSucceeded { generation }
    } else {
        TransportEvent::SubscribeFailed {
            generation,
            cause: format!(
                "broker refused {refused} of {} subscriptions",
                suback.return_codes.len()
            ),
        }
    }
}
