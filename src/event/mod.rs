// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Change notifications for the presentation layer.
//!
//! The [`EventBus`] broadcasts a [`WatchEvent`] whenever a reading is
//! applied, a message is dropped, or the connectivity changes. Subscribers
//! typically re-read the [`StatusSnapshot`](crate::StatusSnapshot) on each
//! event.
//!
//! # Examples
//!
//! ```
//! use window_watcher::connectivity::Connectivity;
//! use window_watcher::event::{EventBus, WatchEvent};
//!
//! let bus = EventBus::new();
//!
//! // Subscribe to events
//! let mut rx = bus.subscribe();
//!
//! // Publish an event
//! bus.publish(WatchEvent::ConnectivityChanged(Connectivity::default()));
//! ```

mod event_bus;
mod watch_event;

pub use event_bus::EventBus;
pub use watch_event::WatchEvent;
