//! Graceful-shutdown coordination.
//!
//! A single boolean flag is set by the signal listener and polled by every
//! blocking wait in the scheduler at one-second granularity, which bounds
//! shutdown latency to one second. The listener does nothing beyond setting
//! the flag; all cleanup happens in the main control flow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Cloneable handle to the shutdown flag.
///
/// Written once by the signal listener, read by the scheduler loop. The
/// write is monotone (false to true) and carries no other state, so the
/// interaction is race-free by construction.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    inner: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a flag in the not-requested state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent; returns true only for the first call.
    pub fn request(&self) -> bool {
        !self.inner.swap(true, Ordering::SeqCst)
    }

    /// Check whether shutdown has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Installs signal handlers that request shutdown on SIGINT or SIGTERM.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    flag: ShutdownFlag,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the flag this coordinator sets.
    pub fn flag(&self) -> ShutdownFlag {
        self.flag.clone()
    }

    /// Spawn a task that sets the flag on SIGINT or SIGTERM.
    ///
    /// On non-unix platforms only ctrl-c is handled. Fails if the SIGTERM
    /// stream cannot be registered with the runtime.
    pub fn install(&self) -> std::io::Result<()> {
        let flag = self.flag.clone();

        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
            tokio::spawn(async move {
                let signal = tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT",
                    _ = terminate.recv() => "SIGTERM",
                };
                if flag.request() {
                    info!(signal, "shutdown signal received, stopping after current wait");
                }
            });
        }

        #[cfg(not(unix))]
        {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() && flag.request() {
                    info!(signal = "SIGINT", "shutdown signal received, stopping after current wait");
                }
            });
        }

        Ok(())
    }
}
