// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Window Watcher - one status line for a set of LoRaWAN window sensors.
//!
//! Door/window contact sensors registered on The Things Network (TTN) send
//! their readings as uplink messages. This crate subscribes to the uplinks
//! of a configured set of devices over MQTT, keeps the last reading of each
//! device, and condenses them into a single [`DisplayStatus`]:
//!
//! 1. the broker connection is down: **not connected**
//! 2. any window reported open: **windows open**
//! 3. some window never reported: **incomplete data**
//! 4. otherwise: **all clear**
//!
//! The connection is supervised: failed connects are retried after a delay,
//! a dropped connection is re-established immediately, and readings survive
//! reconnects.
//!
//! # Quick Start
//!
//! ```no_run
//! use window_watcher::{WatcherConfig, WindowWatcher};
//!
//! #[tokio::main]
//! async fn main() -> window_watcher::Result<()> {
//!     let config = WatcherConfig::builder()
//!         .broker_url("tcp://eu1.cloud.thethings.network:1883")
//!         .credentials("office@ttn", "NNSXS.secret")
//!         .devices(["window-1", "window-2", "window-3", "window-4"])
//!         .build()?;
//!
//!     let watcher = WindowWatcher::start(config);
//!     let mut connectivity = watcher.watch_connectivity();
//!
//!     while connectivity.changed().await.is_ok() {
//!         println!("{}", watcher.status());
//!     }
//!
//!     watcher.shutdown().await
//! }
//! ```
//!
//! # Custom transports
//!
//! The supervisor talks to the broker through the [`Transport`] trait. The
//! default implementation is [`RumqttTransport`](transport::RumqttTransport)
//! (feature `mqtt`); any other client can be plugged in with
//! [`WindowWatcher::with_transport`].

pub mod config;
pub mod connectivity;
pub mod error;
pub mod event;
pub mod registry;
pub mod router;
pub mod state;
pub mod status;
pub mod supervisor;
pub mod transport;
pub mod uplink;
mod watcher;

pub use config::{ReconnectionPolicy, WatcherConfig, WatcherConfigBuilder};
pub use connectivity::{Connectivity, ConnectivityState};
pub use error::{ConfigError, DecodeError, Error, Result, TransportError};
pub use event::{EventBus, WatchEvent};
pub use registry::{DeviceRegistry, DeviceSlot};
pub use router::{DropReason, RouteOutcome, UplinkRouter};
pub use state::{AggregateState, StateStore, WindowState};
pub use status::{DisplayStatus, compute_display_status};
pub use transport::{QosLevel, Transport, TransportEvent};
pub use uplink::Uplink;
pub use watcher::{StatusSnapshot, WindowSnapshot, WindowWatcher};
