// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Aggregate state of all monitored windows.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::registry::DeviceSlot;

use super::{SensorReading, WindowState};

/// Readings of every configured device plus the accepted message count.
///
/// The number of readings equals the number of configured devices for the
/// whole lifetime of the watcher; slots are overwritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateState {
    readings: Vec<WindowState>,
    message_count: u64,
    last_update: Option<DateTime<Utc>>,
}

impl AggregateState {
    /// Creates a state with `slots` unknown readings and a zero counter.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        Self {
            readings: vec![WindowState::Unknown; slots],
            message_count: 0,
            last_update: None,
        }
    }

    /// Returns the reading of a slot, or `None` if the slot is out of range.
    #[must_use]
    pub fn reading(&self, slot: DeviceSlot) -> Option<WindowState> {
        self.readings.get(slot.index()).copied()
    }

    /// Returns all readings in slot order.
    #[must_use]
    pub fn readings(&self) -> &[WindowState] {
        &self.readings
    }

    /// Iterates over the readings as [`SensorReading`]s.
    pub fn sensor_readings(&self) -> impl Iterator<Item = SensorReading> + '_ {
        self.readings
            .iter()
            .enumerate()
            .map(|(i, &state)| SensorReading {
                slot: DeviceSlot::new(i),
                state,
            })
    }

    /// Returns the number of accepted messages.
    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Returns when the last accepted message was applied.
    #[must_use]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Returns `true` if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Returns `true` if any window is reported open.
    #[must_use]
    pub fn any_open(&self) -> bool {
        self.readings.iter().any(|s| matches!(s, WindowState::Open))
    }

    /// Returns `true` if any slot has not reported yet.
    #[must_use]
    pub fn any_unknown(&self) -> bool {
        self.readings.iter().any(|s| s.is_unknown())
    }

    /// Overwrites a slot and counts the message.
    ///
    /// Returns `false` without counting if the slot is out of range.
    pub(crate) fn record(&mut self, slot: DeviceSlot, state: WindowState, at: DateTime<Utc>) -> bool {
        let Some(entry) = self.readings.get_mut(slot.index()) else {
            return false;
        };
        *entry = state;
        self.message_count += 1;
        self.last_update = Some(at);
        true
    }
}
