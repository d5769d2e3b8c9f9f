// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watcher facade.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::config::WatcherConfig;
use crate::connectivity::{Connectivity, ConnectivityCell};
use crate::error::Result;
use crate::event::{EventBus, WatchEvent};
use crate::registry::DeviceRegistry;
use crate::router::UplinkRouter;
use crate::state::{AggregateState, StateStore, WindowState};
use crate::status::{DisplayStatus, compute_display_status};
use crate::supervisor::{Supervisor, SupervisorHandle};
use crate::transport::{EventReceiver, Transport};

/// Watches a fixed set of window sensors through a TTN MQTT broker.
///
/// Creating a watcher starts the connection supervisor right away; it keeps
/// reconnecting until [`WindowWatcher::shutdown`] is called. All accessors
/// are cheap and never wait on the network.
///
/// # Examples
///
/// ```no_run
/// use window_watcher::{WatcherConfig, WindowWatcher};
///
/// #[tokio::main]
/// async fn main() -> window_watcher::Result<()> {
///     let config = WatcherConfig::from_json_file("window-watcher.json")?;
///     let watcher = WindowWatcher::start(config);
///
///     let mut events = watcher.subscribe();
///     while events.recv().await.is_ok() {
///         let status = watcher.status();
///         println!("{}: {}", status.display_status, status.status_message);
///     }
///
///     watcher.shutdown().await
/// }
/// ```
#[derive(Debug)]
pub struct WindowWatcher {
    config: WatcherConfig,
    registry: Arc<DeviceRegistry>,
    store: StateStore,
    connectivity: ConnectivityCell,
    events: EventBus,
    supervisor: SupervisorHandle,
}

impl WindowWatcher {
    /// Starts a watcher on the `rumqttc` transport.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn start(config: WatcherConfig) -> Self {
        let (transport, transport_rx) = crate::transport::RumqttTransport::new(&config);
        Self::with_transport(config, transport, transport_rx)
    }

    /// Starts a watcher on a custom transport.
    ///
    /// `transport_rx` must receive the events `transport` reports.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_transport<T: Transport>(
        config: WatcherConfig,
        transport: T,
        transport_rx: EventReceiver,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(config.devices().iter().cloned()));
        let store = StateStore::new(registry.len());
        let connectivity = ConnectivityCell::new();
        let events = EventBus::new();

        let router = UplinkRouter::new(Arc::clone(&registry), store.clone(), events.clone());
        let supervisor = Supervisor::new(
            &config,
            transport,
            transport_rx,
            router,
            connectivity.clone(),
            events.clone(),
        )
        .spawn();

        tracing::info!(
            application = %config.application_id(),
            devices = registry.len(),
            "Window watcher started"
        );

        Self {
            config,
            registry,
            store,
            connectivity,
            events,
            supervisor,
        }
    }

    /// Returns a fresh view of the watcher for presentation.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let connectivity = self.connectivity.get();
        let state = self.store.snapshot();
        StatusSnapshot::new(&self.registry, &state, connectivity)
    }

    /// Returns the current connectivity.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.get()
    }

    /// Returns a consistent copy of the aggregate state.
    #[must_use]
    pub fn state(&self) -> AggregateState {
        self.store.snapshot()
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    /// Returns a receiver that observes every connectivity change.
    #[must_use]
    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.watch()
    }

    /// Returns a receiver that observes every applied reading.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<AggregateState> {
        self.store.watch()
    }

    /// Returns the device registry.
    #[must_use]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Returns the configuration the watcher was started with.
    #[must_use]
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Unsubscribes, disconnects and stops the supervisor.
    ///
    /// Readings are kept; a final [`WindowWatcher::status`] is no longer
    /// available after this call, so read it first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorStopped`](crate::Error::SupervisorStopped)
    /// if the supervisor task had already failed.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Window watcher shutting down");
        self.supervisor.shutdown().await
    }
}

/// One monitored window in a [`StatusSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSnapshot {
    /// Configured device id.
    pub device_id: String,
    /// Last reported state.
    pub state: WindowState,
}

/// Everything a display needs, captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Overall verdict.
    pub display_status: DisplayStatus,
    /// Connectivity description, e.g. `"subscribed"` or `"connection lost"`.
    pub status_message: String,
    /// Number of applied uplinks.
    pub message_count: u64,
    /// Broker connectivity.
    pub connectivity: Connectivity,
    /// Windows in slot order.
    pub windows: Vec<WindowSnapshot>,
    /// Time of the last applied uplink.
    pub last_update: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    fn new(registry: &DeviceRegistry, state: &AggregateState, connectivity: Connectivity) -> Self {
        let windows = registry
            .iter()
            .map(|(slot, device_id)| WindowSnapshot {
                device_id: device_id.to_string(),
                state: state.reading(slot).unwrap_or_default(),
            })
            .collect();

        Self {
            display_status: compute_display_status(state, connectivity.state),
            status_message: connectivity.description.clone(),
            message_count: state.message_count(),
            connectivity,
            windows,
            last_update: state.last_update(),
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {} messages]",
            self.display_status.headline(),
            self.status_message,
            self.message_count
        )?;
        for window in &self.windows {
            write!(f, " {}={}", window.device_id, window.state)?;
        }
        Ok(())
    }
}
