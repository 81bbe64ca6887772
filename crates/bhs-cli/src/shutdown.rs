// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Stop signal for long-running commands.
//!
//! `watch` runs until Ctrl+C (or SIGTERM on Unix). [`StopSignal`] is the
//! latch the printing loop and the plant driver both wait on.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A one-way latch: once stopped, every waiter is released.
#[derive(Debug, Clone)]
pub struct StopSignal {
    latch: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    /// Creates an unset signal.
    pub fn new() -> Self {
        let (latch, _) = watch::channel(false);
        Self {
            latch: Arc::new(latch),
        }
    }

    /// Sets the signal. Setting it again has no effect.
    pub fn stop(&self) {
        if self.latch.send_if_modified(|stopped| !std::mem::replace(stopped, true)) {
            info!("Stopping");
        }
    }

    /// Resolves once the signal is set, immediately if it already is.
    pub async fn stopped(&self) {
        let mut waiter = self.latch.subscribe();
        let _ = waiter.wait_for(|stopped| *stopped).await;
    }

    /// Sets the signal when the process receives Ctrl+C or SIGTERM.
    pub fn stop_on_os_signal(&self) -> JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            os_signal().await;
            signal.stop();
        })
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix. A handler that cannot be
/// registered is logged and never fires.
async fn os_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Interrupted"),
        _ = terminate => info!("Terminated"),
    }
}
