// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headless window watcher.
//!
//! Usage: `window-watcher [--json] <config.json>`
//!
//! Prints the status line every time a reading or the connectivity changes,
//! until interrupted with Ctrl-C. Logs go to stderr, filtered by `RUST_LOG`
//! (default `info`).

use std::process::ExitCode;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use window_watcher::{StatusSnapshot, WatcherConfig, WindowWatcher};

const USAGE: &str = "usage: window-watcher [--json] <config.json>";

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn print_status(status: &StatusSnapshot, json: bool) {
    if json {
        match serde_json::to_string(status) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!(error = %e, "Failed to serialize status"),
        }
    } else {
        println!("{status}");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let mut json = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else if arg == "-h" || arg == "--help" {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        } else if path.is_none() {
            path = Some(arg);
        } else {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    }
    let Some(path) = path else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let config = match WatcherConfig::from_json_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %path, error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let watcher = WindowWatcher::start(config);
    let mut events = watcher.subscribe();
    print_status(&watcher.status(), json);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) if event.is_reading() || event.is_connectivity() => {
                    print_status(&watcher.status(), json);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Status display lagged");
                    print_status(&watcher.status(), json);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    match watcher.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Shutdown failed");
            ExitCode::FAILURE
        }
    }
}
