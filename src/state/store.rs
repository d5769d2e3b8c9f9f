// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared store for the aggregate state.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::registry::DeviceSlot;

use super::{AggregateState, WindowState};

/// Thread-safe owner of the [`AggregateState`].
///
/// Every update and every snapshot runs inside one short critical section,
/// so readers never observe a half-applied update. The store is cheaply
/// cloneable; clones share the same state.
///
/// After each update the new snapshot is also published on a `watch`
/// channel, see [`StateStore::watch`].
#[derive(Debug, Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    state: Mutex<AggregateState>,
    publisher: watch::Sender<AggregateState>,
}

impl StateStore {
    /// Creates a store for `slots` devices, all unknown.
    #[must_use]
    pub fn new(slots: usize) -> Self {
        let state = AggregateState::new(slots);
        let (publisher, _) = watch::channel(state.clone());
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(state),
                publisher,
            }),
        }
    }

    /// Applies a `digital` value to a slot and returns the new snapshot.
    ///
    /// The slot is overwritten unconditionally (last writer wins) and the
    /// message counter grows by one, even if the reading did not change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSlot`] if the slot is out of range. The state
    /// is left untouched in that case.
    pub fn apply_reading(&self, slot: DeviceSlot, digital: i64) -> Result<AggregateState> {
        let reading = WindowState::from_digital(digital);

        let mut state = self.inner.state.lock();
        if !state.record(slot, reading, Utc::now()) {
            return Err(Error::InvalidSlot {
                slot: slot.index(),
                len: state.len(),
            });
        }
        let snapshot = state.clone();
        // Published under the lock so watchers see updates in order
        self.inner.publisher.send_replace(snapshot.clone());
        drop(state);

        Ok(snapshot)
    }

    /// Returns a consistent copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> AggregateState {
        self.inner.state.lock().clone()
    }

    /// Returns a receiver that observes every new snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AggregateState> {
        self.inner.publisher.subscribe()
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().len()
    }

    /// Returns `true` if the store has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
