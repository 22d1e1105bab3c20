//! Worker resource coordination
//!
//! A worker owns one physical resource and drives it on a schedule while a
//! companion listen loop handles remote reset signals. Both loops share an
//! [`AvailabilityGate`].
//!
//! # Key Types
//!
//! - [`CameraWorker`] - Scheduled capture with remote reset
//! - [`AvailabilityGate`] - Availability, pending reset and next scheduled time
//! - [`CaptureDevice`] - Seam for the physical capture device

pub mod camera;
pub mod capture;
pub mod gate;
pub mod schedule;

pub use camera::{CameraConfig, CameraWorker};
pub use capture::{CaptureDevice, CaptureError, CaptureResult, CommandCapture};
pub use gate::{AvailabilityGate, GateState};
pub use schedule::{next_scheduled_time, top_of_next_hour, DelayConfig, Resolution};

use thiserror::Error;

/// Worker errors
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker '{0}' has no capture device configured")]
    NoCaptureDevice(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Result type for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Worker configuration, tagged by `type`
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerConfig {
    Camera(CameraConfig),
}

impl WorkerConfig {
    pub fn key(&self) -> &str {
        match self {
            WorkerConfig::Camera(config) => &config.key,
        }
    }
}
