// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watcher configuration.
//!
//! A [`WatcherConfig`] is built once at startup, either with
//! [`WatcherConfig::builder`] or from a JSON file, and handed to the
//! watcher. The values for a TTN application are found in the MQTT
//! integration page of the TTN console.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use window_watcher::config::WatcherConfig;
//!
//! # fn main() -> Result<(), window_watcher::error::ConfigError> {
//! let config = WatcherConfig::builder()
//!     .broker_url("tcp://eu1.cloud.thethings.network:1883")
//!     .credentials("office@ttn", "NNSXS.secret")
//!     .devices(["window-1", "window-2"])
//!     .connect_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! assert_eq!(config.port(), 1883);
//! assert_eq!(config.topics()[1], "v3/office@ttn/devices/window-2/up");
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```json
//! {
//!   "broker_url": "tcp://eu1.cloud.thethings.network:1883",
//!   "username": "office@ttn",
//!   "password": "NNSXS.secret",
//!   "devices": ["window-1", "window-2", "window-3", "window-4"],
//!   "retry_delay_secs": 10
//! }
//! ```

mod reconnection;

pub use reconnection::ReconnectionPolicy;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::transport::QosLevel;

/// Default MQTT port.
const DEFAULT_PORT: u16 = 1883;

/// Complete configuration of a watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    client_id: String,
    application_id: String,
    devices: Vec<String>,
    connect_timeout: Duration,
    keep_alive: Duration,
    qos: QosLevel,
    reconnection: ReconnectionPolicy,
    resubscribe_delay: Option<Duration>,
}

impl WatcherConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> WatcherConfigBuilder {
        WatcherConfigBuilder::default()
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is invalid or the configuration does not
    /// validate.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json)?;
        file.into_builder().build()
    }

    /// Loads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or does
    /// not validate.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        tracing::info!(path = %path.display(), devices = config.devices.len(), "Loaded configuration");
        Ok(config)
    }

    /// Returns the broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the (username, password) pair, if configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// Returns the MQTT client identifier.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the TTN application id used in topics.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Returns the device ids in slot order.
    #[must_use]
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Returns the uplink topic of every device, in slot order.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.devices
            .iter()
            .map(|device| uplink_topic(&self.application_id, device))
            .collect()
    }

    /// Returns how long to wait for the broker to accept a connection.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Returns the QoS requested for every topic.
    #[must_use]
    pub fn qos(&self) -> QosLevel {
        self.qos
    }

    /// Returns the delay policy for failed connect attempts.
    #[must_use]
    pub fn reconnection(&self) -> &ReconnectionPolicy {
        &self.reconnection
    }

    /// Returns the delay before retrying a refused subscription, if enabled.
    #[must_use]
    pub fn resubscribe_delay(&self) -> Option<Duration> {
        self.resubscribe_delay
    }
}

/// Builds the uplink topic of a device.
#[must_use]
pub fn uplink_topic(application_id: &str, device_id: &str) -> String {
    format!("v3/{application_id}/devices/{device_id}/up")
}

/// Builder for [`WatcherConfig`].
#[derive(Debug, Clone)]
pub struct WatcherConfigBuilder {
    broker_url: String,
    credentials: Option<(String, String)>,
    client_id: Option<String>,
    application_id: Option<String>,
    devices: Vec<String>,
    connect_timeout: Duration,
    keep_alive: Duration,
    qos: QosLevel,
    reconnection: ReconnectionPolicy,
    resubscribe_delay: Option<Duration>,
}

impl Default for WatcherConfigBuilder {
    fn default() -> Self {
        Self {
            broker_url: String::new(),
            credentials: None,
            client_id: None,
            application_id: None,
            devices: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(30),
            qos: QosLevel::AtLeastOnce,
            reconnection: ReconnectionPolicy::default(),
            resubscribe_delay: None,
        }
    }
}

impl WatcherConfigBuilder {
    /// Sets the broker URL (`tcp://host:port`, `mqtt://host:port` or
    /// `host[:port]`).
    #[must_use]
    pub fn broker_url(mut self, url: impl Into<String>) -> Self {
        self.broker_url = url.into();
        self
    }

    /// Sets the broker credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the MQTT client id (default: `window-watcher-<random>`).
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the application id used in topics (default: the username).
    #[must_use]
    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Sets the monitored devices, in slot order.
    #[must_use]
    pub fn devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.devices = devices.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one monitored device.
    #[must_use]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.devices.push(device.into());
        self
    }

    /// Sets the connect timeout (default: 10 seconds).
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the QoS for every topic (default: 1).
    #[must_use]
    pub fn qos(mut self, qos: QosLevel) -> Self {
        self.qos = qos;
        self
    }

    /// Sets the reconnection policy (default: fixed 10 seconds).
    #[must_use]
    pub fn reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Retries a refused subscription after `delay` (default: never).
    #[must_use]
    pub fn resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = Some(delay);
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the broker URL is missing or invalid
    /// - no device is configured, or a device id cannot be used in a topic
    /// - no application id can be derived
    /// - the keep-alive is below one second but not zero
    /// - the reconnection policy can yield a zero delay
    pub fn build(self) -> Result<WatcherConfig, ConfigError> {
        let (host, port) = parse_broker_url(&self.broker_url)?;

        // The MQTT client panics on a sub-second keep-alive
        if !self.keep_alive.is_zero() && self.keep_alive < Duration::from_secs(1) {
            return Err(ConfigError::InvalidKeepAlive(self.keep_alive));
        }
        if self.reconnection.initial_delay.is_zero() || self.reconnection.max_delay.is_zero() {
            return Err(ConfigError::ZeroRetryDelay);
        }

        if self.devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        if let Some(bad) = self.devices.iter().find(|d| !is_topic_level(d)) {
            return Err(ConfigError::InvalidDeviceId(bad.clone()));
        }

        let application_id = self
            .application_id
            .or_else(|| self.credentials.as_ref().map(|(user, _)| user.clone()))
            .filter(|id| is_topic_level(id))
            .ok_or(ConfigError::MissingApplicationId)?;

        let client_id = self
            .client_id
            .unwrap_or_else(|| format!("window-watcher-{}", uuid::Uuid::new_v4().simple()));

        Ok(WatcherConfig {
            host,
            port,
            credentials: self.credentials,
            client_id,
            application_id,
            devices: self.devices,
            connect_timeout: self.connect_timeout,
            keep_alive: self.keep_alive,
            qos: self.qos,
            reconnection: self.reconnection,
            resubscribe_delay: self.resubscribe_delay,
        })
    }
}

/// Returns `true` if `s` can be used as a single MQTT topic level.
fn is_topic_level(s: &str) -> bool {
    !s.is_empty() && !s.contains(['/', '+', '#'])
}

/// Parses a broker URL into host and port.
fn parse_broker_url(url: &str) -> Result<(String, u16), ConfigError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    if rest.contains("://") {
        return Err(ConfigError::InvalidAddress(format!(
            "unsupported scheme in {url}"
        )));
    }

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("invalid port: {p}")))?;
        (h, port)
    } else {
        (rest, DEFAULT_PORT)
    };

    if host.is_empty() {
        return Err(ConfigError::MissingBrokerHost);
    }

    Ok((host.to_string(), port))
}

/// On-disk representation of the configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    broker_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    application_id: Option<String>,
    devices: Vec<String>,
    #[serde(default)]
    connect_timeout_secs: Option<u64>,
    #[serde(default)]
    keep_alive_secs: Option<u64>,
    #[serde(default)]
    qos: Option<QosLevel>,
    #[serde(default)]
    retry_delay_secs: Option<u64>,
    #[serde(default)]
    max_retry_delay_secs: Option<u64>,
    #[serde(default)]
    retry_backoff_multiplier: Option<f32>,
    #[serde(default)]
    resubscribe_delay_secs: Option<u64>,
}

impl ConfigFile {
    fn into_builder(self) -> WatcherConfigBuilder {
        let mut builder = WatcherConfig::builder()
            .broker_url(self.broker_url)
            .devices(self.devices);

        if let Some(username) = self.username {
            builder = builder.credentials(username, self.password.unwrap_or_default());
        }
        if let Some(client_id) = self.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(application_id) = self.application_id {
            builder = builder.application_id(application_id);
        }
        if let Some(secs) = self.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.keep_alive_secs {
            builder = builder.keep_alive(Duration::from_secs(secs));
        }
        if let Some(qos) = self.qos {
            builder = builder.qos(qos);
        }

        let mut policy = ReconnectionPolicy::default();
        if let Some(secs) = self.retry_delay_secs {
            policy = ReconnectionPolicy::fixed(Duration::from_secs(secs));
        }
        if let Some(secs) = self.max_retry_delay_secs {
            policy = policy.with_max_delay(Duration::from_secs(secs));
        }
        if let Some(multiplier) = self.retry_backoff_multiplier {
            policy = policy.with_backoff_multiplier(multiplier);
        }
        builder = builder.reconnection(policy);

        if let Some(secs) = self.resubscribe_delay_secs {
            builder = builder.resubscribe_delay(Duration::from_secs(secs));
        }
        builder
    }
}
