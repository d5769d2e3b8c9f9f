// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection supervisor.
//!
//! The supervisor is a single task that owns the [`Transport`] and keeps the
//! watcher connected and subscribed for as long as it runs:
//!
//! ```text
//! Disconnected ──start──▶ Connecting ──ok──▶ Connected ──▶ Subscribing ──ok──▶ Subscribed
//!                          ▲      │                           │
//!                          │      └─failed, retry after delay │ failed ──▶ Connected
//!                          │                                  │
//!                          └──────── Lost ◀── connection lost (any live state)
//! ```
//!
//! Retries never block the task: a delay is a spawned one-shot timer that
//! posts back into the same loop. Every connect attempt gets a new
//! [`Generation`], and any event or timer from an older attempt is ignored.
//!
//! Messages are routed whatever the connectivity state.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{ReconnectionPolicy, WatcherConfig};
use crate::connectivity::{Connectivity, ConnectivityCell, ConnectivityState};
use crate::error::{Error, Result};
use crate::event::{EventBus, WatchEvent};
use crate::router::UplinkRouter;
use crate::transport::{EventReceiver, Generation, QosLevel, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Reconnect,
    Resubscribe,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    generation: Generation,
    kind: TimerKind,
}

/// State machine that drives a [`Transport`].
pub struct Supervisor<T: Transport> {
    transport: T,
    transport_rx: EventReceiver,
    topics: Vec<String>,
    qos: QosLevel,
    reconnection: ReconnectionPolicy,
    resubscribe_delay: Option<Duration>,
    router: UplinkRouter,
    connectivity: ConnectivityCell,
    events: EventBus,
    timer_tx: mpsc::UnboundedSender<Timer>,
    timer_rx: mpsc::UnboundedReceiver<Timer>,
    pending_timer: Option<JoinHandle<()>>,
    state: ConnectivityState,
    generation: Generation,
    failed_attempts: u32,
}

impl<T: Transport> Supervisor<T> {
    /// Creates a supervisor. Nothing happens until [`Supervisor::spawn`].
    #[must_use]
    pub fn new(
        config: &WatcherConfig,
        transport: T,
        transport_rx: EventReceiver,
        router: UplinkRouter,
        connectivity: ConnectivityCell,
        events: EventBus,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            transport_rx,
            topics: config.topics(),
            qos: config.qos(),
            reconnection: config.reconnection().clone(),
            resubscribe_delay: config.resubscribe_delay(),
            router,
            connectivity,
            events,
            timer_tx,
            timer_rx,
            pending_timer: None,
            state: ConnectivityState::Disconnected,
            generation: 0,
            failed_attempts: 0,
        }
    }

    /// Starts the supervisor task. The first connect is issued immediately.
    #[must_use]
    pub fn spawn(self) -> SupervisorHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(shutdown_rx));
        SupervisorHandle {
            shutdown_tx,
            task,
        }
    }

    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        tracing::info!(topics = self.topics.len(), "Connection supervisor started");
        self.start_attempt();

        loop {
            tokio::select! {
                biased;

                // A dropped handle stops the supervisor too
                _ = &mut shutdown_rx => break,
                Some(event) = self.transport_rx.recv() => self.on_transport_event(event),
                Some(timer) = self.timer_rx.recv() => self.on_timer(timer),
                else => break,
            }
        }

        self.teardown();
    }

    fn start_attempt(&mut self) {
        self.generation += 1;
        self.set_state(ConnectivityState::Connecting, "connecting");

        if let Err(e) = self.transport.connect(self.generation) {
            self.on_connect_failed(&e.to_string());
        }
    }

    fn on_connect_failed(&mut self, cause: &str) {
        let delay = self.reconnection.delay_for_attempt(self.failed_attempts);
        self.failed_attempts = self.failed_attempts.saturating_add(1);

        tracing::error!(
            generation = self.generation,
            error = %cause,
            attempt = self.failed_attempts,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "MQTT connection failed"
        );

        self.set_state(ConnectivityState::Connecting, "connection failed");
        self.schedule(TimerKind::Reconnect, delay);
    }

    fn request_subscribe(&mut self) {
        self.set_state(ConnectivityState::Subscribing, "subscribing");

        if let Err(e) = self
            .transport
            .subscribe(self.generation, &self.topics, self.qos)
        {
            self.on_subscribe_failed(&e.to_string());
        }
    }

    fn on_subscribe_failed(&mut self, cause: &str) {
        tracing::error!(generation = self.generation, error = %cause, "MQTT subscribe failed");
        self.set_state(ConnectivityState::Connected, "subscribe failed");

        if let Some(delay) = self.resubscribe_delay {
            self.schedule(TimerKind::Resubscribe, delay);
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        use ConnectivityState::{Connecting, Subscribing};

        match event {
            TransportEvent::Message { topic, payload } => {
                self.router.route(&topic, &payload);
            }
            TransportEvent::ConnectSucceeded { generation }
                if self.is_current(generation, Connecting) =>
            {
                self.failed_attempts = 0;
                self.cancel_timer();
                self.set_state(ConnectivityState::Connected, "connected");
                self.request_subscribe();
            }
            TransportEvent::ConnectFailed { generation, cause }
                if self.is_current(generation, Connecting) =>
            {
                self.on_connect_failed(&cause);
            }
            TransportEvent::SubscribeSucceeded { generation }
                if self.is_current(generation, Subscribing) =>
            {
                self.set_state(ConnectivityState::Subscribed, "subscribed");
            }
            TransportEvent::SubscribeFailed { generation, cause }
                if self.is_current(generation, Subscribing) =>
            {
                self.on_subscribe_failed(&cause);
            }
            TransportEvent::ConnectionLost { generation, cause }
                if generation == self.generation && self.state.is_live() =>
            {
                tracing::error!(generation, error = %cause, "MQTT connection lost");
                self.cancel_timer();
                self.set_state(ConnectivityState::Lost, "connection lost");
                self.start_attempt();
            }
            other => {
                tracing::debug!(
                    event = ?other,
                    state = %self.state,
                    generation = self.generation,
                    "Ignoring stale transport event"
                );
            }
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        if timer.generation != self.generation {
            tracing::debug!(?timer, generation = self.generation, "Ignoring stale timer");
            return;
        }

        match (timer.kind, self.state) {
            (TimerKind::Reconnect, ConnectivityState::Connecting) => {
                tracing::info!(generation = self.generation, "Retrying MQTT connection");
                self.start_attempt();
            }
            (TimerKind::Resubscribe, ConnectivityState::Connected) => {
                tracing::info!(generation = self.generation, "Retrying MQTT subscribe");
                self.request_subscribe();
            }
            _ => {
                tracing::debug!(?timer, state = %self.state, "Ignoring timer");
            }
        }
    }

    fn is_current(&self, generation: Generation, expected: ConnectivityState) -> bool {
        generation == self.generation && self.state == expected
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel_timer();

        let timer = Timer {
            generation: self.generation,
            kind,
        };
        let timer_tx = self.timer_tx.clone();
        self.pending_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = timer_tx.send(timer);
        }));
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
    }

    fn teardown(&mut self) {
        tracing::info!(generation = self.generation, "Connection supervisor shutting down");
        self.cancel_timer();

        if let Err(e) = self.transport.unsubscribe(&self.topics) {
            tracing::warn!(error = %e, "Failed to unsubscribe during shutdown");
        }
        if let Err(e) = self.transport.disconnect() {
            tracing::warn!(error = %e, "Failed to disconnect during shutdown");
        }

        self.set_state(ConnectivityState::Disconnected, "disconnected");
    }

    fn set_state(&mut self, state: ConnectivityState, description: &str) {
        self.state = state;
        let connectivity = Connectivity::new(state, description);

        tracing::info!(
            state = %state,
            description,
            generation = self.generation,
            "Connectivity changed"
        );

        self.connectivity.set(connectivity.clone());
        self.events
            .publish(WatchEvent::ConnectivityChanged(connectivity));
    }
}

impl<T: Transport> std::fmt::Debug for Supervisor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("failed_attempts", &self.failed_attempts)
            .finish_non_exhaustive()
    }
}

/// Handle to a running [`Supervisor`].
///
/// Dropping the handle also stops the supervisor, but only
/// [`SupervisorHandle::shutdown`] waits for the teardown to finish.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Unsubscribes, disconnects and waits for the supervisor to stop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorStopped`] if the task had panicked or was
    /// cancelled.
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone; the join below reports that
        let _ = self.shutdown_tx.send(());
        self.task.await.map_err(|e| {
            tracing::error!(error = %e, "Supervisor task failed");
            Error::SupervisorStopped
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::broadcast;

    use super::*;
    use crate::error::TransportError;
    use crate::registry::DeviceRegistry;
    use crate::state::StateStore;
    use crate::transport::{EventSender, event_channel};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(Generation),
        Subscribe(Generation, Vec<String>, QosLevel),
        Unsubscribe(Vec<String>),
        Disconnect,
    }

    #[derive(Debug, Default)]
    struct MockLog {
        calls: Vec<Call>,
        refuse_connect: bool,
    }

    struct MockTransport {
        log: Arc<Mutex<MockLog>>,
    }

    impl Transport for MockTransport {
        fn connect(&mut self, generation: Generation) -> std::result::Result<(), TransportError> {
            let mut log = self.log.lock();
            log.calls.push(Call::Connect(generation));
            if log.refuse_connect {
                return Err(TransportError::ConnectFailed("refused".to_string()));
            }
            Ok(())
        }

        fn subscribe(
            &mut self,
            generation: Generation,
            topics: &[String],
            qos: QosLevel,
        ) -> std::result::Result<(), TransportError> {
            self.log
                .lock()
                .calls
                .push(Call::Subscribe(generation, topics.to_vec(), qos));
            Ok(())
        }

        fn unsubscribe(&mut self, topics: &[String]) -> std::result::Result<(), TransportError> {
            self.log.lock().calls.push(Call::Unsubscribe(topics.to_vec()));
            Ok(())
        }

        fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
            self.log.lock().calls.push(Call::Disconnect);
            Err(TransportError::NotConnected)
        }
    }

    struct Harness {
        log: Arc<Mutex<MockLog>>,
        transport_tx: EventSender,
        connectivity: ConnectivityCell,
        store: StateStore,
        events: broadcast::Receiver<WatchEvent>,
        handle: SupervisorHandle,
    }

    impl Harness {
        fn calls(&self) -> Vec<Call> {
            self.log.lock().calls.clone()
        }

        fn connects(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Connect(_)))
                .count()
        }

        fn subscribes(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, Call::Subscribe(..)))
                .count()
        }

        fn state(&self) -> ConnectivityState {
            self.connectivity.get().state
        }

        async fn send(&self, event: TransportEvent) {
            self.transport_tx.send(event).unwrap();
            settle().await;
        }

        async fn subscribed(&self) {
            self.send(TransportEvent::ConnectSucceeded { generation: 1 })
                .await;
            self.send(TransportEvent::SubscribeSucceeded { generation: 1 })
                .await;
            assert_eq!(self.state(), ConnectivityState::Subscribed);
        }

        fn drain_states(&mut self) -> Vec<ConnectivityState> {
            let mut states = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if let WatchEvent::ConnectivityChanged(c) = event {
                    states.push(c.state);
                }
            }
            states
        }
    }

    /// Lets spawned tasks run without advancing the paused clock.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(duration: Duration) {
        tokio::time::advance(duration).await;
        settle().await;
    }

    fn config() -> crate::config::WatcherConfigBuilder {
        WatcherConfig::builder()
            .broker_url("tcp://eu1.cloud.thethings.network:1883")
            .credentials("office@ttn", "secret")
            .devices(["window-1", "window-2", "window-3", "window-4"])
    }

    async fn start(config: WatcherConfig) -> Harness {
        start_with(config, MockLog::default()).await
    }

    async fn start_with(config: WatcherConfig, log: MockLog) -> Harness {
        let log = Arc::new(Mutex::new(log));
        let (transport_tx, transport_rx) = event_channel();
        let registry = Arc::new(DeviceRegistry::new(config.devices().iter().cloned()));
        let store = StateStore::new(registry.len());
        let bus = EventBus::new();
        let events = bus.subscribe();
        let connectivity = ConnectivityCell::new();
        let router = UplinkRouter::new(registry, store.clone(), bus.clone());

        let supervisor = Supervisor::new(
            &config,
            MockTransport {
                log: Arc::clone(&log),
            },
            transport_rx,
            router,
            connectivity.clone(),
            bus,
        );
        let handle = supervisor.spawn();
        settle().await;

        Harness {
            log,
            transport_tx,
            connectivity,
            store,
            events,
            handle,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_then_subscribes_all_topics() {
        let config = config().build().unwrap();
        let topics = config.topics();
        let h = start(config).await;

        assert_eq!(h.calls(), vec![Call::Connect(1)]);
        assert_eq!(h.connectivity.get().description, "connecting");

        h.send(TransportEvent::ConnectSucceeded { generation: 1 })
            .await;
        assert_eq!(
            h.calls(),
            vec![
                Call::Connect(1),
                Call::Subscribe(1, topics, QosLevel::AtLeastOnce)
            ]
        );
        assert_eq!(h.state(), ConnectivityState::Subscribing);

        h.send(TransportEvent::SubscribeSucceeded { generation: 1 })
            .await;
        assert_eq!(
            h.connectivity.get(),
            Connectivity::new(ConnectivityState::Subscribed, "subscribed")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_reconnects_immediately_then_retries_once() {
        let mut h = start(config().build().unwrap()).await;
        h.subscribed().await;
        h.drain_states();

        h.send(TransportEvent::ConnectionLost {
            generation: 1,
            cause: "keep-alive timeout".to_string(),
        })
        .await;

        // No time has passed
        assert_eq!(h.calls().last(), Some(&Call::Connect(2)));
        assert_eq!(
            h.drain_states(),
            vec![ConnectivityState::Lost, ConnectivityState::Connecting]
        );

        h.send(TransportEvent::ConnectFailed {
            generation: 2,
            cause: "connection refused".to_string(),
        })
        .await;
        assert_eq!(h.connectivity.get().description, "connection failed");
        assert_eq!(h.connects(), 2);

        advance(Duration::from_secs(9)).await;
        assert_eq!(h.connects(), 2);

        advance(Duration::from_secs(1)).await;
        assert_eq!(h.connects(), 3);
        assert_eq!(h.calls().last(), Some(&Call::Connect(3)));

        advance(Duration::from_secs(60)).await;
        assert_eq!(h.connects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_ignored() {
        let h = start(config().build().unwrap()).await;
        h.subscribed().await;
        h.send(TransportEvent::ConnectionLost {
            generation: 1,
            cause: "reset".to_string(),
        })
        .await;

        h.send(TransportEvent::ConnectSucceeded { generation: 1 })
            .await;
        h.send(TransportEvent::ConnectionLost {
            generation: 1,
            cause: "late".to_string(),
        })
        .await;

        assert_eq!(h.state(), ConnectivityState::Connecting);
        assert_eq!(h.connects(), 2);
        assert_eq!(h.subscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_retry_stops_retrying() {
        let h = start(config().build().unwrap()).await;
        h.send(TransportEvent::ConnectFailed {
            generation: 1,
            cause: "refused".to_string(),
        })
        .await;

        advance(Duration::from_secs(10)).await;
        assert_eq!(h.calls().last(), Some(&Call::Connect(2)));

        h.send(TransportEvent::ConnectSucceeded { generation: 2 })
            .await;
        advance(Duration::from_secs(60)).await;

        assert_eq!(h.connects(), 2);
        assert_eq!(h.state(), ConnectivityState::Subscribing);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_in_wrong_state_is_ignored() {
        let h = start(config().build().unwrap()).await;

        h.send(TransportEvent::SubscribeSucceeded { generation: 1 })
            .await;
        h.send(TransportEvent::ConnectionLost {
            generation: 1,
            cause: "not yet connected".to_string(),
        })
        .await;

        assert_eq!(h.state(), ConnectivityState::Connecting);
        assert_eq!(h.calls(), vec![Call::Connect(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_stays_connected() {
        let h = start(config().build().unwrap()).await;
        h.send(TransportEvent::ConnectSucceeded { generation: 1 })
            .await;
        h.send(TransportEvent::SubscribeFailed {
            generation: 1,
            cause: "not authorized".to_string(),
        })
        .await;

        assert_eq!(
            h.connectivity.get(),
            Connectivity::new(ConnectivityState::Connected, "subscribe failed")
        );

        advance(Duration::from_secs(3600)).await;
        assert_eq!(h.subscribes(), 1);
        assert!(h.connectivity.get().is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_failure_retries_when_configured() {
        let config = config()
            .resubscribe_delay(Duration::from_secs(30))
            .build()
            .unwrap();
        let h = start(config).await;
        h.send(TransportEvent::ConnectSucceeded { generation: 1 })
            .await;
        h.send(TransportEvent::SubscribeFailed {
            generation: 1,
            cause: "not authorized".to_string(),
        })
        .await;

        advance(Duration::from_secs(29)).await;
        assert_eq!(h.subscribes(), 1);

        advance(Duration::from_secs(1)).await;
        assert_eq!(h.subscribes(), 2);
        assert_eq!(h.state(), ConnectivityState::Subscribing);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_connect_request_schedules_retry() {
        let log = MockLog {
            refuse_connect: true,
            ..MockLog::default()
        };
        let h = start_with(config().build().unwrap(), log).await;

        assert_eq!(h.connectivity.get().description, "connection failed");
        assert_eq!(h.connects(), 1);

        advance(Duration::from_secs(10)).await;
        assert_eq!(h.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_and_resets() {
        let policy = ReconnectionPolicy::new()
            .with_initial_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_secs(60));
        let h = start(config().reconnection(policy).build().unwrap()).await;

        let fail = |generation| TransportEvent::ConnectFailed {
            generation,
            cause: "refused".to_string(),
        };

        h.send(fail(1)).await;
        advance(Duration::from_secs(1)).await;
        assert_eq!(h.connects(), 2);

        h.send(fail(2)).await;
        advance(Duration::from_secs(1)).await;
        assert_eq!(h.connects(), 2);
        advance(Duration::from_secs(1)).await;
        assert_eq!(h.connects(), 3);

        h.send(TransportEvent::ConnectSucceeded { generation: 3 })
            .await;
        h.send(TransportEvent::SubscribeSucceeded { generation: 3 })
            .await;
        h.send(TransportEvent::ConnectionLost {
            generation: 3,
            cause: "reset".to_string(),
        })
        .await;
        assert_eq!(h.connects(), 4);

        h.send(fail(4)).await;
        advance(Duration::from_secs(1)).await;
        assert_eq!(h.connects(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_are_routed_in_any_state() {
        let h = start(config().build().unwrap()).await;

        h.send(TransportEvent::Message {
            topic: "v3/office@ttn/devices/window-2/up".to_string(),
            payload: br#"{"end_device_ids":{"device_id":"window-2"},"uplink_message":{"decoded_payload":{"digital":0}}}"#.to_vec(),
        })
        .await;

        assert_eq!(h.state(), ConnectivityState::Connecting);
        assert_eq!(h.store.snapshot().message_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unsubscribes_then_disconnects() {
        let config = config().build().unwrap();
        let topics = config.topics();
        let h = start(config).await;
        h.subscribed().await;

        let log = Arc::clone(&h.log);
        let connectivity = h.connectivity.clone();
        h.handle.shutdown().await.unwrap();

        let calls = log.lock().calls.clone();
        assert_eq!(
            calls[calls.len() - 2..],
            [Call::Unsubscribe(topics), Call::Disconnect]
        );
        // Disconnect errors are only logged
        assert_eq!(
            connectivity.get(),
            Connectivity::new(ConnectivityState::Disconnected, "disconnected")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_retry() {
        let h = start(config().build().unwrap()).await;
        h.send(TransportEvent::ConnectFailed {
            generation: 1,
            cause: "refused".to_string(),
        })
        .await;

        let log = Arc::clone(&h.log);
        h.handle.shutdown().await.unwrap();
        advance(Duration::from_secs(60)).await;

        let connects = log
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Connect(_)))
            .count();
        assert_eq!(connects, 1);
    }
}
