//! Process-wide runtime flags
//!
//! Every loop in homehub is gated by two flags: `main active`, cleared once
//! at shutdown, and `system ready`, set once startup has finished. Loops poll
//! them cooperatively; nothing is ever preempted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shared `main active` / `system ready` flags
#[derive(Debug)]
pub struct SystemFlags {
    main_active: watch::Sender<bool>,
    system_ready: AtomicBool,
}

impl SystemFlags {
    /// Create flags with `main active` set and `system ready` cleared
    pub fn new() -> Self {
        let (main_active, _) = watch::channel(true);
        Self {
            main_active,
            system_ready: AtomicBool::new(false),
        }
    }

    /// Whether the process is still running
    pub fn is_active(&self) -> bool {
        *self.main_active.borrow()
    }

    /// Whether the system has finished preparing
    pub fn is_ready(&self) -> bool {
        self.system_ready.load(Ordering::SeqCst)
    }

    /// Mark the system ready (or not ready)
    pub fn set_ready(&self, ready: bool) {
        self.system_ready.store(ready, Ordering::SeqCst);
    }

    /// Clear `main active`; every loop exits after its current unit of work
    pub fn shutdown(&self) {
        self.main_active.send_replace(false);
    }

    /// Resolves once `main active` has been cleared
    pub async fn stopped(&self) {
        let mut rx = self.main_active.subscribe();
        // The sender lives as long as self, so this only errors if it is dropped
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Sleep for at most `duration`, waking early on shutdown
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.stopped() => {}
        }
    }
}

impl Default for SystemFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for SystemFlags
pub type SharedFlags = Arc<SystemFlags>;
