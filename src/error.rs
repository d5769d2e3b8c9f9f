// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the window watcher.
//!
//! None of these errors is fatal to a running watcher: payload errors cause
//! the message to be dropped, transport errors are retried by the
//! [`Supervisor`](crate::supervisor::Supervisor). They surface to users only
//! through the status message of a [`StatusSnapshot`](crate::StatusSnapshot).

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An uplink payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The transport failed to carry out a request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A slot index outside the configured device range was used.
    #[error("slot {slot} is out of range (device count {len})")]
    InvalidSlot {
        /// The offending slot index.
        slot: usize,
        /// Number of configured devices.
        len: usize,
    },

    /// The supervisor task is no longer running.
    #[error("supervisor is not running")]
    SupervisorStopped,
}

/// Errors produced by the uplink payload decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not UTF-8 JSON of the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The decoded payload carries no `digital` field.
    ///
    /// This is the normal case for uplinks that do not report a contact
    /// state and must be ignored rather than treated as a failure.
    #[error("uplink from {device_id} has no digital field")]
    NoDigitalField {
        /// The device that sent the uplink.
        device_id: String,
    },
}

/// Errors related to the MQTT transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The MQTT client rejected a request.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// A connect attempt could not be started.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// No connection exists to carry the request.
    #[error("not connected")]
    NotConnected,
}

/// Errors related to loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No broker host was given.
    #[error("broker host is required")]
    MissingBrokerHost,

    /// The device list is empty.
    #[error("at least one device id is required")]
    NoDevices,

    /// Neither an application id nor a username was given, so the uplink
    /// topics cannot be derived.
    #[error("application id is required when no username is set")]
    MissingApplicationId,

    /// A device id is empty or contains MQTT topic wildcards or separators.
    #[error("invalid device id: {0:?}")]
    InvalidDeviceId(String),

    /// The keep-alive interval is neither zero nor at least one second.
    #[error("keep-alive must be 0 or at least 1s, got {0:?}")]
    InvalidKeepAlive(std::time::Duration),

    /// A failed connect would be retried without any delay.
    #[error("retry delay must be greater than zero")]
    ZeroRetryDelay,

    /// The broker URL could not be parsed.
    #[error("invalid broker address: {0}")]
    InvalidAddress(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON.
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
