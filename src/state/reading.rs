// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contact readings.

use std::fmt;

use serde::Serialize;

use crate::registry::DeviceSlot;

/// Last known state of a monitored window.
///
/// `Unknown` means no reading has been received yet. It is deliberately a
/// separate state and never treated as closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    /// The contact is open.
    Open,
    /// The contact is closed.
    Closed,
    /// No reading received yet.
    #[default]
    Unknown,
}

impl WindowState {
    /// Maps a `digital` field value to a window state.
    ///
    /// The sensors report `0` when the monitored contact is open; every
    /// other value means closed.
    ///
    /// # Examples
    ///
    /// ```
    /// use window_watcher::state::WindowState;
    ///
    /// assert_eq!(WindowState::from_digital(0), WindowState::Open);
    /// assert_eq!(WindowState::from_digital(1), WindowState::Closed);
    /// ```
    #[must_use]
    pub fn from_digital(digital: i64) -> Self {
        if digital == 0 { Self::Open } else { Self::Closed }
    }

    /// Returns `Some(true)` when open, `Some(false)` when closed and `None`
    /// when unknown.
    #[must_use]
    pub fn is_open(self) -> Option<bool> {
        match self {
            Self::Open => Some(true),
            Self::Closed => Some(false),
            Self::Unknown => None,
        }
    }

    /// Returns `true` if no reading has been received.
    #[must_use]
    pub fn is_unknown(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The reading held by one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    /// The slot of the device.
    pub slot: DeviceSlot,
    /// The current state of the window.
    pub state: WindowState,
}
