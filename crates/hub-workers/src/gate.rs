//! Availability gate
//!
//! The gate is the single point of truth for whether a physical resource may
//! be driven. The listen loop clears and re-enables it; the work loop checks
//! it once per unit of work and is the only one allowed to clear
//! `pending_reset`, after it has cleaned up.

use chrono::{DateTime, Local};
use std::sync::{Mutex, MutexGuard};

/// Snapshot of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateState {
    /// Whether the resource may be driven
    pub available: bool,
    /// Whether the artifact produced while clearing must be discarded
    pub pending_reset: bool,
    /// When the work loop next intends to produce a unit
    pub next_scheduled_time: Option<DateTime<Local>>,
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            available: true,
            pending_reset: false,
            next_scheduled_time: None,
        }
    }
}

/// Shared availability gate
#[derive(Debug, Default)]
pub struct AvailabilityGate {
    state: Mutex<GateState>,
}

impl AvailabilityGate {
    /// Create an open gate
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> GateState {
        *self.lock()
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    pub fn pending_reset(&self) -> bool {
        self.lock().pending_reset
    }

    pub fn next_scheduled_time(&self) -> Option<DateTime<Local>> {
        self.lock().next_scheduled_time
    }

    /// Remote reset signal: close the gate and mark the in-flight unit for cleanup
    pub fn request_reset(&self) {
        let mut state = self.lock();
        state.available = false;
        state.pending_reset = true;
    }

    /// Open the gate again
    pub fn reenable(&self) {
        self.lock().available = true;
    }

    /// The work loop finished cleaning up after a reset
    pub fn complete_reset(&self) {
        self.lock().pending_reset = false;
    }

    /// Record the next scheduled unit of work
    pub fn schedule(&self, at: DateTime<Local>) {
        self.lock().next_scheduled_time = Some(at);
    }
}
