// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Routing of uplink messages into the state store.
//!
//! ```text
//! MQTT message: v3/office@ttn/devices/window-2/up → {...}
//!                     ↓
//!             UplinkRouter.route()
//!                     ↓
//!         uplink::decode() → ("window-2", 0)
//!                     ↓
//!      DeviceRegistry.resolve_slot("window-2") → #1
//!                     ↓
//!        StateStore.apply_reading(#1, 0) → Open
//!                     ↓
//!        EventBus.publish(ReadingUpdated)
//! ```
//!
//! Messages that cannot be used are dropped without touching the store.

use std::fmt;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::event::{EventBus, WatchEvent};
use crate::registry::{DeviceRegistry, DeviceSlot};
use crate::state::{AggregateState, StateStore};
use crate::uplink;

/// Why an uplink message was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The payload could not be decoded.
    Malformed(String),
    /// The uplink has no `digital` field.
    NoDigitalField {
        /// The device that sent the uplink.
        device_id: String,
    },
    /// The device is not in the registry.
    UnknownDevice {
        /// The device that sent the uplink.
        device_id: String,
    },
}

impl From<DecodeError> for DropReason {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::MalformedPayload(message) => Self::Malformed(message),
            DecodeError::NoDigitalField { device_id } => Self::NoDigitalField { device_id },
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(message) => write!(f, "malformed payload: {message}"),
            Self::NoDigitalField { device_id } => write!(f, "no digital field from {device_id}"),
            Self::UnknownDevice { device_id } => write!(f, "unknown device {device_id}"),
        }
    }
}

/// Result of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The reading was applied.
    Applied {
        /// The slot that was written.
        slot: DeviceSlot,
        /// The state right after the update.
        state: AggregateState,
    },
    /// The message was ignored.
    Dropped(DropReason),
}

/// Decodes uplinks and applies them to the [`StateStore`].
#[derive(Debug, Clone)]
pub struct UplinkRouter {
    registry: Arc<DeviceRegistry>,
    store: StateStore,
    events: EventBus,
}

impl UplinkRouter {
    /// Creates a router over a registry and store.
    #[must_use]
    pub fn new(registry: Arc<DeviceRegistry>, store: StateStore, events: EventBus) -> Self {
        Self {
            registry,
            store,
            events,
        }
    }

    /// Routes one raw MQTT message.
    ///
    /// The device named in the payload is authoritative; the topic is only
    /// used for logging.
    pub fn route(&self, topic: &str, payload: &[u8]) -> RouteOutcome {
        let uplink = match uplink::decode(payload) {
            Ok(uplink) => uplink,
            Err(err) => {
                tracing::warn!(topic = %topic, error = %err, "Ignoring uplink");
                return self.drop_message(topic, err.into());
            }
        };

        if let Some(parsed) = ParsedTopic::parse(topic)
            && parsed.device_id != uplink.device_id
        {
            tracing::debug!(
                topic = %topic,
                device = %uplink.device_id,
                "Uplink device differs from topic device"
            );
        }

        let Some(slot) = self.registry.resolve_slot(&uplink.device_id) else {
            tracing::info!(
                topic = %topic,
                device = %uplink.device_id,
                "Ignoring uplink from unregistered device"
            );
            return self.drop_message(
                topic,
                DropReason::UnknownDevice {
                    device_id: uplink.device_id,
                },
            );
        };

        let state = match self.store.apply_reading(slot, uplink.digital) {
            Ok(state) => state,
            Err(err) => {
                // Registry and store are sized from the same device list
                tracing::error!(slot = %slot, error = %err, "Registry slot rejected by store");
                return self.drop_message(
                    topic,
                    DropReason::UnknownDevice {
                        device_id: uplink.device_id,
                    },
                );
            }
        };

        let reading = state.reading(slot).unwrap_or_default();
        tracing::info!(
            device = %uplink.device_id,
            slot = %slot,
            digital = uplink.digital,
            reading = %reading,
            message_count = state.message_count(),
            "Uplink applied"
        );

        self.events.publish(WatchEvent::ReadingUpdated {
            slot,
            device_id: uplink.device_id,
            state: reading,
            message_count: state.message_count(),
        });

        RouteOutcome::Applied { slot, state }
    }

    fn drop_message(&self, topic: &str, reason: DropReason) -> RouteOutcome {
        self.events.publish(WatchEvent::MessageDropped {
            topic: topic.to_string(),
            reason: reason.clone(),
        });
        RouteOutcome::Dropped(reason)
    }
}

/// Parsed uplink topic: `v3/<application>/devices/<device>/up`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTopic<'a> {
    /// Application id, including the tenant suffix (e.g. `office@ttn`).
    pub application: &'a str,
    /// End device id.
    pub device_id: &'a str,
}

impl<'a> ParsedTopic<'a> {
    /// Parses a TTN v3 uplink topic.
    #[must_use]
    pub fn parse(topic: &'a str) -> Option<Self> {
        let mut parts = topic.split('/');
        match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some("v3"), Some(application), Some("devices"), Some(device_id), Some("up"), None)
                if !application.is_empty() && !device_id.is_empty() =>
            {
                Some(Self {
                    application,
                    device_id,
                })
            }
            _ => None,
        }
    }
}
