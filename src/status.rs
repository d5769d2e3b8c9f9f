// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Derivation of the display status.

use std::fmt;

use serde::Serialize;

use crate::connectivity::ConnectivityState;
use crate::state::AggregateState;

/// Consolidated status shown to users.
///
/// Always derived from the current state, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    /// No live broker connection; readings may be stale.
    NotConnected,
    /// At least one window is reported open.
    WindowsOpen,
    /// No window is open, but some device has not reported yet.
    IncompleteData,
    /// Every window is reported closed.
    AllClear,
}

impl DisplayStatus {
    /// Returns the overlay text for this status.
    #[must_use]
    pub fn headline(self) -> &'static str {
        match self {
            Self::NotConnected => "MQTT not connected",
            Self::WindowsOpen => "Windows are open",
            Self::IncompleteData => "Incomplete sensor data",
            Self::AllClear => "Windows are closed. Have a nice day",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.headline())
    }
}

/// Computes the display status.
///
/// Rules are checked in order and the first match wins:
///
/// 1. connection not live: [`DisplayStatus::NotConnected`]
/// 2. any window open: [`DisplayStatus::WindowsOpen`]
/// 3. any reading unknown: [`DisplayStatus::IncompleteData`]
/// 4. otherwise: [`DisplayStatus::AllClear`]
///
/// An open window is never hidden behind missing data from another sensor.
///
/// # Examples
///
/// ```
/// use window_watcher::connectivity::ConnectivityState;
/// use window_watcher::registry::DeviceSlot;
/// use window_watcher::state::StateStore;
/// use window_watcher::status::{compute_display_status, DisplayStatus};
///
/// let store = StateStore::new(2);
/// let state = store.apply_reading(DeviceSlot::new(0), 0).unwrap();
///
/// assert_eq!(
///     compute_display_status(&state, ConnectivityState::Subscribed),
///     DisplayStatus::WindowsOpen
/// );
/// ```
#[must_use]
pub fn compute_display_status(
    state: &AggregateState,
    connectivity: ConnectivityState,
) -> DisplayStatus {
    if !connectivity.is_live() {
        DisplayStatus::NotConnected
    } else if state.any_open() {
        DisplayStatus::WindowsOpen
    } else if state.any_unknown() {
        DisplayStatus::IncompleteData
    } else {
        DisplayStatus::AllClear
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceSlot;
    use crate::state::StateStore;

    fn state_with(digitals: &[Option<i64>]) -> AggregateState {
        let store = StateStore::new(digitals.len());
        for (i, digital) in digitals.iter().enumerate() {
            if let Some(d) = digital {
                store.apply_reading(DeviceSlot::new(i), *d).unwrap();
            }
        }
        store.snapshot()
    }

    #[test]
    fn open_beats_incomplete() {
        let state = state_with(&[Some(0), None, Some(1), Some(1)]);
        assert_eq!(
            compute_display_status(&state, ConnectivityState::Subscribed),
            DisplayStatus::WindowsOpen
        );
    }

    #[test]
    fn not_connected_beats_everything() {
        let closed = state_with(&[Some(1), Some(1)]);
        let open = state_with(&[Some(0), None]);
        for connectivity in [
            ConnectivityState::Disconnected,
            ConnectivityState::Connecting,
            ConnectivityState::Lost,
        ] {
            assert_eq!(
                compute_display_status(&closed, connectivity),
                DisplayStatus::NotConnected
            );
            assert_eq!(
                compute_display_status(&open, connectivity),
                DisplayStatus::NotConnected
            );
        }
    }

    #[test]
    fn missing_reading_is_incomplete() {
        let state = state_with(&[Some(1), None]);
        assert_eq!(
            compute_display_status(&state, ConnectivityState::Subscribed),
            DisplayStatus::IncompleteData
        );
    }

    #[test]
    fn all_closed_is_all_clear() {
        let state = state_with(&[Some(1), Some(3)]);
        assert_eq!(
            compute_display_status(&state, ConnectivityState::Subscribed),
            DisplayStatus::AllClear
        );
    }

    #[test]
    fn connected_without_subscription_is_live() {
        let state = state_with(&[Some(1)]);
        assert_eq!(
            compute_display_status(&state, ConnectivityState::Connected),
            DisplayStatus::AllClear
        );
    }

    #[test]
    fn headlines() {
        assert_eq!(DisplayStatus::NotConnected.headline(), "MQTT not connected");
        assert_eq!(
            DisplayStatus::AllClear.to_string(),
            "Windows are closed. Have a nice day"
        );
    }
}
