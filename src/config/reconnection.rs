// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delay policy for reconnect attempts.

use std::time::Duration;

/// Delay between a failed connect attempt and the next one.
///
/// The supervisor retries forever; this policy only decides how long to
/// wait. The default waits a fixed 10 seconds after every failure. Setting
/// a multiplier above 1.0 turns on exponential backoff, capped at
/// `max_delay`.
///
/// A dropped connection is always retried immediately, without consulting
/// this policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use window_watcher::config::ReconnectionPolicy;
///
/// // Fixed 10 s delay
/// let policy = ReconnectionPolicy::default();
/// assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(10));
///
/// // Exponential backoff
/// let policy = ReconnectionPolicy::new()
///     .with_initial_delay(Duration::from_secs(1))
///     .with_backoff_multiplier(2.0)
///     .with_max_delay(Duration::from_secs(30));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for the delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub backoff_multiplier: f32,
}

impl ReconnectionPolicy {
    /// Creates a new reconnection policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy with a fixed delay.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the delay after the first failure.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay after `attempt` previous consecutive failures.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.backoff_multiplier <= 1.0 {
            return self.initial_delay;
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // Safe: initial_delay is typically seconds/minutes, not near u128 max
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // Safe: delay_ms is positive; saturates on overflow
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(10))
    }
}
