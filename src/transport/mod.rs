// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport boundary between the supervisor and an MQTT client.
//!
//! Requests on a [`Transport`] return immediately. Their outcome, like every
//! incoming message and every connection loss, is reported later as a
//! [`TransportEvent`] on the channel created by [`event_channel`].
//!
//! Each connect request carries a [`Generation`]. Events about that
//! connection carry the same generation, which lets the supervisor discard
//! late events from superseded attempts.
//!
//! # Implementations
//!
//! - [`RumqttTransport`]: `rumqttc`-based client (feature `mqtt`)

#[cfg(feature = "mqtt")]
mod rumqtt;

#[cfg(feature = "mqtt")]
pub use rumqtt::RumqttTransport;

use std::fmt;

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Identifies one connect attempt.
pub type Generation = u64;

/// Sending half of the transport event channel.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiving half of the transport event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Creates the channel a transport reports its events on.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Notifications delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    ConnectSucceeded {
        /// The attempt that succeeded.
        generation: Generation,
    },
    /// The connection could not be established.
    ConnectFailed {
        /// The attempt that failed.
        generation: Generation,
        /// Description of the failure.
        cause: String,
    },
    /// The broker granted every requested subscription.
    SubscribeSucceeded {
        /// The connection the subscription belongs to.
        generation: Generation,
    },
    /// The broker refused at least one subscription.
    SubscribeFailed {
        /// The connection the subscription belongs to.
        generation: Generation,
        /// Description of the failure.
        cause: String,
    },
    /// An established connection dropped.
    ConnectionLost {
        /// The connection that dropped.
        generation: Generation,
        /// Description of the failure.
        cause: String,
    },
    /// A message arrived on a subscribed topic.
    Message {
        /// The topic the message was published on.
        topic: String,
        /// The raw payload.
        payload: Vec<u8>,
    },
}

/// MQTT quality of service level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum QosLevel {
    /// QoS 0.
    AtMostOnce,
    /// QoS 1.
    #[default]
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
}

impl QosLevel {
    /// Returns the numeric level (0, 1 or 2).
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(format!("invalid QoS level {other}, expected 0, 1 or 2")),
        }
    }
}

impl fmt::Display for QosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QoS {}", self.level())
    }
}

/// A pub/sub client driven by the supervisor.
///
/// All methods must return without waiting for the broker. Outcomes of
/// `connect` and `subscribe` are reported as [`TransportEvent`]s. An `Err`
/// means the request could not even be issued.
pub trait Transport: Send + 'static {
    /// Starts a new connection attempt, superseding any previous one.
    ///
    /// # Errors
    ///
    /// Returns error if the attempt cannot be started.
    fn connect(&mut self, generation: Generation) -> Result<(), TransportError>;

    /// Requests a subscription to all `topics` at `qos`.
    ///
    /// # Errors
    ///
    /// Returns error if there is no connection for `generation` or the
    /// request cannot be queued.
    fn subscribe(
        &mut self,
        generation: Generation,
        topics: &[String],
        qos: QosLevel,
    ) -> Result<(), TransportError>;

    /// Requests removal of the subscriptions to `topics`.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn unsubscribe(&mut self, topics: &[String]) -> Result<(), TransportError>;

    /// Closes the current connection.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be queued.
    fn disconnect(&mut self) -> Result<(), TransportError>;
}
