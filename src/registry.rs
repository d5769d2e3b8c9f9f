// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed registry of monitored devices.

use std::collections::HashMap;
use std::fmt;

/// Index of a monitored device in the configured device list.
///
/// Slots are assigned in configuration order and never change while the
/// watcher runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceSlot(usize);

impl DeviceSlot {
    /// Creates a slot from a raw index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered set of device identifiers mapped to [`DeviceSlot`]s.
///
/// Identifiers not in the registry resolve to `None`; uplinks from such
/// devices (sensors not yet onboarded) are ignored by the router.
///
/// If the same identifier is configured twice, the first occurrence owns
/// the identifier and the later slot never receives readings.
///
/// # Examples
///
/// ```
/// use window_watcher::registry::DeviceRegistry;
///
/// let registry = DeviceRegistry::new(["window-1", "window-2"]);
/// assert_eq!(registry.resolve_slot("window-2").map(|s| s.index()), Some(1));
/// assert!(registry.resolve_slot("door-9").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    ids: Vec<String>,
    index: HashMap<String, DeviceSlot>,
}

impl DeviceRegistry {
    /// Builds the registry from the configured device identifiers.
    pub fn new<I, S>(device_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = device_ids.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(ids.len());

        for (i, id) in ids.iter().enumerate() {
            if let Some(first) = index.get(id) {
                tracing::warn!(
                    device = %id,
                    first_slot = %first,
                    duplicate_slot = i,
                    "Duplicate device id in configuration, first occurrence wins"
                );
                continue;
            }
            index.insert(id.clone(), DeviceSlot(i));
        }

        Self { ids, index }
    }

    /// Resolves a device identifier to its slot.
    #[must_use]
    pub fn resolve_slot(&self, device_id: &str) -> Option<DeviceSlot> {
        self.index.get(device_id).copied()
    }

    /// Returns the identifier configured for a slot.
    #[must_use]
    pub fn device_id(&self, slot: DeviceSlot) -> Option<&str> {
        self.ids.get(slot.0).map(String::as_str)
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no device is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates over `(slot, device_id)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceSlot, &str)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| (DeviceSlot(i), id.as_str()))
    }
}
