// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Watcher event types.

use crate::connectivity::Connectivity;
use crate::registry::DeviceSlot;
use crate::router::DropReason;
use crate::state::WindowState;

/// Events emitted by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An uplink was accepted and applied to a slot.
    ReadingUpdated {
        /// The slot that was written.
        slot: DeviceSlot,
        /// The device that sent the uplink.
        device_id: String,
        /// The new reading of the slot.
        state: WindowState,
        /// The accepted message count after this update.
        message_count: u64,
    },

    /// An uplink was ignored.
    MessageDropped {
        /// The topic the message arrived on.
        topic: String,
        /// Why the message was ignored.
        reason: DropReason,
    },

    /// The broker connectivity changed.
    ConnectivityChanged(Connectivity),
}

impl WatchEvent {
    /// Returns `true` if this event changed the aggregate state.
    #[must_use]
    pub fn is_reading(&self) -> bool {
        matches!(self, Self::ReadingUpdated { .. })
    }

    /// Returns `true` if this is a connectivity event.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::ConnectivityChanged(_))
    }
}
