// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device contact state.
//!
//! The [`StateStore`] owns the single [`AggregateState`] of the watcher: one
//! [`WindowState`] per configured device plus a counter of accepted
//! messages. Readers get immutable snapshots.
//!
//! # Examples
//!
//! ```
//! use window_watcher::registry::DeviceSlot;
//! use window_watcher::state::{StateStore, WindowState};
//!
//! let store = StateStore::new(2);
//!
//! // The sensor reports 0 when the contact is open
//! let snapshot = store.apply_reading(DeviceSlot::new(0), 0).unwrap();
//!
//! assert_eq!(snapshot.reading(DeviceSlot::new(0)), Some(WindowState::Open));
//! assert_eq!(snapshot.reading(DeviceSlot::new(1)), Some(WindowState::Unknown));
//! assert_eq!(snapshot.message_count(), 1);
//! ```

mod aggregate;
mod reading;
mod store;

pub use aggregate::AggregateState;
pub use reading::{SensorReading, WindowState};
pub use store::StateStore;
