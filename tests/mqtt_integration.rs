// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the rumqttc transport using mockforge-mqtt.

#![cfg(feature = "mqtt")]

use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use window_watcher::{
    Connectivity, ConnectivityState, DisplayStatus, WatcherConfig, WindowWatcher,
};

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18950);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    // Give the broker time to bind
    sleep(Duration::from_millis(500)).await;
}

fn config(broker_url: &str) -> WatcherConfig {
    WatcherConfig::builder()
        .broker_url(broker_url)
        .application_id("office@ttn")
        .devices(["window-1", "window-2", "window-3", "window-4"])
        .connect_timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

async fn wait_for(
    rx: &mut watch::Receiver<Connectivity>,
    predicate: impl FnMut(&Connectivity) -> bool,
) -> Connectivity {
    timeout(Duration::from_secs(10), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for connectivity")
        .expect("connectivity channel closed")
        .clone()
}

mod live_broker {
    use super::*;

    #[tokio::test]
    async fn reaches_live_connection() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let watcher = WindowWatcher::start(config(&format!("mqtt://127.0.0.1:{port}")));
        let mut rx = watcher.watch_connectivity();

        let connectivity = wait_for(&mut rx, Connectivity::is_live).await;
        assert!(connectivity.is_live());

        // No uplinks yet
        assert_eq!(watcher.status().display_status, DisplayStatus::IncompleteData);
        assert_eq!(watcher.status().message_count, 0);

        watcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_ends_disconnected() {
        let port = get_test_port();
        start_mock_broker(port).await;

        let watcher = WindowWatcher::start(config(&format!("tcp://127.0.0.1:{port}")));
        let mut rx = watcher.watch_connectivity();
        wait_for(&mut rx, Connectivity::is_live).await;

        watcher.shutdown().await.unwrap();

        let last = rx.borrow().clone();
        assert_eq!(
            last,
            Connectivity::new(ConnectivityState::Disconnected, "disconnected")
        );
    }
}

mod unreachable_broker {
    use super::*;

    #[tokio::test]
    async fn stays_not_connected() {
        // Nothing listens on this port
        let port = get_test_port();
        let watcher = WindowWatcher::start(config(&format!("127.0.0.1:{port}")));
        let mut rx = watcher.watch_connectivity();

        let connectivity = wait_for(&mut rx, |c| c.description == "connection failed").await;
        assert_eq!(connectivity.state, ConnectivityState::Connecting);

        let status = watcher.status();
        assert_eq!(status.display_status, DisplayStatus::NotConnected);
        assert_eq!(status.status_message, "connection failed");

        watcher.shutdown().await.unwrap();
    }
}
