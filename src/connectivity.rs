// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker connectivity as seen by the supervisor.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle state of the broker connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Not started, or shut down.
    #[default]
    Disconnected,
    /// A connect request is outstanding or a retry is pending.
    Connecting,
    /// Connected to the broker, not subscribed.
    Connected,
    /// Connected, subscribe request outstanding.
    Subscribing,
    /// Connected and subscribed to all uplink topics.
    Subscribed,
    /// The connection dropped; a reconnect follows immediately.
    Lost,
}

impl ConnectivityState {
    /// Returns `true` while a broker connection is up.
    ///
    /// A connection whose subscription failed still counts as live.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::Subscribing | Self::Subscribed)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Connectivity state plus the human readable status line shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connectivity {
    /// Current state.
    pub state: ConnectivityState,
    /// Last status description, e.g. `"subscribe failed"`.
    pub description: String,
}

impl Connectivity {
    /// Creates a connectivity value.
    #[must_use]
    pub fn new(state: ConnectivityState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }

    /// Returns `true` while a broker connection is up.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(ConnectivityState::Disconnected, "initial")
    }
}

/// Shared, observable connectivity.
///
/// The supervisor is the only writer; readers clone the current value or
/// wait for changes through [`ConnectivityCell::watch`].
#[derive(Debug, Clone)]
pub struct ConnectivityCell {
    sender: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivityCell {
    /// Creates a cell holding [`Connectivity::default`].
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Connectivity::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns the current connectivity.
    #[must_use]
    pub fn get(&self) -> Connectivity {
        self.sender.borrow().clone()
    }

    /// Replaces the current connectivity and notifies watchers.
    pub fn set(&self, connectivity: Connectivity) {
        self.sender.send_replace(connectivity);
    }

    /// Returns a receiver that observes every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.sender.subscribe()
    }
}

impl Default for ConnectivityCell {
    fn default() -> Self {
        Self::new()
    }
}
