//! Camera worker
//!
//! Two loops share one [`AvailabilityGate`]: the work loop drives the capture
//! device on a schedule, the listen loop reacts to `Timelapse` reset signals
//! on the worker topic and re-enables the gate once the scheduled capture
//! plus a grace period has passed.

use chrono::Local;
use hub_core::{topics, BusPayload, Envelope, EventTag, SharedFlags};
use hub_event_bus::{SharedEventBus, Subscription};
use hub_state_store::SharedStateStore;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::capture::{CaptureDevice, CommandCapture};
use crate::gate::AvailabilityGate;
use crate::schedule::{duration_until, lenient, next_scheduled_time, DelayConfig, Resolution};
use crate::{WorkerError, WorkerResult};

/// Idle sleep while unavailable or not ready
pub const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between work loop iterations
pub const LOOP_PAUSE: Duration = Duration::from_millis(100);

/// Poll interval of the listen loop
pub const LISTEN_INTERVAL: Duration = Duration::from_secs(1);

/// Listen loop back-off while the system is not ready
pub const NOT_READY_INTERVAL: Duration = Duration::from_secs(2);

/// Grace period after the next scheduled capture before re-enabling
pub const REENABLE_GRACE: Duration = Duration::from_secs(15);

/// File name prefix of captured frames
pub const FRAME_PREFIX: &str = "homehub";

/// Camera worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directory frames are written to
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Topic for state changes and reset signals, `homehub/camera/{key}` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, deserialize_with = "lenient_resolution")]
    pub resolution: Resolution,

    /// Delay between captures, top of the next hour when absent or malformed
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub delay: Option<DelayConfig>,

    /// External capture command, see [`CommandCapture`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capture_command: Vec<String>,
}

fn lenient_resolution<'de, D>(deserializer: D) -> Result<Resolution, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

fn default_path() -> PathBuf {
    PathBuf::from("/etc/homehub/img/")
}

impl CameraConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            path: default_path(),
            topic: None,
            resolution: Resolution::default(),
            delay: None,
            capture_command: Vec::new(),
        }
    }

    /// Topic the worker publishes to and listens on
    pub fn topic(&self) -> String {
        self.topic
            .clone()
            .unwrap_or_else(|| format!("{}/{}", topics::CAMERA_PREFIX, self.key))
    }

    /// Build the command capture device for this camera
    pub fn command_device(&self) -> WorkerResult<CommandCapture> {
        if self.capture_command.is_empty() {
            return Err(WorkerError::NoCaptureDevice(self.key.clone()));
        }
        Ok(CommandCapture::new(&self.capture_command, self.resolution)?)
    }
}

/// Camera worker
pub struct CameraWorker {
    config: CameraConfig,
    topic: String,
    gate: Arc<AvailabilityGate>,
    bus: SharedEventBus,
    states: SharedStateStore,
    flags: SharedFlags,
}

impl CameraWorker {
    pub fn new(
        config: CameraConfig,
        bus: SharedEventBus,
        states: SharedStateStore,
        flags: SharedFlags,
    ) -> Self {
        let topic = config.topic();
        Self {
            config,
            topic,
            gate: Arc::new(AvailabilityGate::new()),
            bus,
            states,
            flags,
        }
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// The worker's availability gate
    pub fn gate(&self) -> Arc<AvailabilityGate> {
        self.gate.clone()
    }

    /// Path of the `counter`-th frame
    pub fn frame_path(&self, counter: u32) -> PathBuf {
        self.config
            .path
            .join(format!("{}-{:05}.jpg", FRAME_PREFIX, counter))
    }

    /// Subscribe to the worker topic and spawn both loops
    ///
    /// The returned handle completes once the worker has fully shut down.
    pub fn run(self, device: Box<dyn CaptureDevice>) -> JoinHandle<()> {
        let worker = Arc::new(self);
        let subscription = worker.bus.subscribe(worker.topic.clone());
        info!(worker = %worker.key(), topic = %worker.topic, "Camera worker online");

        let listener = tokio::spawn(worker.clone().listen(subscription));
        tokio::spawn(worker.work(device, listener))
    }

    async fn work(self: Arc<Self>, mut device: Box<dyn CaptureDevice>, listener: JoinHandle<()>) {
        let flags = self.flags.clone();
        let mut counter: u32 = 0;
        let mut elapsed_since = Instant::now();

        while flags.is_active() {
            if flags.is_ready() && self.gate.is_available() {
                counter = counter.wrapping_add(1);
                let target = self.frame_path(counter);

                match device.capture_unit(&target).await {
                    Ok(artifact) => {
                        if self.gate.is_available() {
                            self.publish_frame(&artifact, elapsed_since.elapsed());
                            self.wait_for_schedule().await;
                        } else {
                            self.discard(&artifact);
                        }
                    }
                    Err(e) => {
                        error!(worker = %self.key(), error = %e, "Capture failed");
                        self.wait_for_schedule().await;
                    }
                }
            } else {
                self.settle_reset();
                flags.sleep(IDLE_INTERVAL).await;
                elapsed_since = Instant::now();
            }
            flags.sleep(LOOP_PAUSE).await;
        }

        info!(worker = %self.key(), "Stopping camera");
        if let Err(e) = listener.await {
            error!(worker = %self.key(), error = %e, "Listen loop failed");
        }
        device.close().await;
        info!(worker = %self.key(), "Camera worker shut down");
    }

    async fn listen(self: Arc<Self>, mut subscription: Subscription) {
        let flags = self.flags.clone();

        while flags.is_active() {
            if !flags.is_ready() {
                flags.sleep(NOT_READY_INTERVAL).await;
                continue;
            }

            if self.gate.is_available() {
                if let Some(payload) = subscription.poll(LISTEN_INTERVAL).await {
                    self.handle_payload(payload);
                }
            } else {
                let delay = self.reenable_delay();
                debug!(worker = %self.key(), ?delay, "Camera unavailable, waiting to re-enable");
                flags.sleep(delay).await;
                if flags.is_active() {
                    self.gate.reenable();
                    info!(worker = %self.key(), "Camera re-enabled");
                }
            }
        }

        drop(subscription);
        debug!(worker = %self.key(), topic = %self.topic, "Released subscription");
    }

    /// Handle one message from the worker topic
    pub fn handle_payload(&self, payload: BusPayload) {
        let envelope = match payload.decode() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(worker = %self.key(), error = %e, "Error handling event for camera");
                return;
            }
        };

        if envelope.event == EventTag::Timelapse {
            info!(worker = %self.key(), "Camera signaled for reset");
            self.gate.request_reset();
        }
    }

    fn reenable_delay(&self) -> Duration {
        let until = self
            .gate
            .next_scheduled_time()
            .map(|at| duration_until(&at, &Local::now()))
            .unwrap_or_default();
        until + REENABLE_GRACE
    }

    fn publish_frame(&self, artifact: &Path, elapsed: Duration) {
        let path = artifact.to_string_lossy().to_string();
        match serde_json::to_string(&path) {
            Ok(stored) => {
                self.states.set(topics::LAST_CAMERA_IMAGE, stored);
            }
            Err(e) => error!(worker = %self.key(), error = %e, "Failed to encode frame path"),
        }
        let receivers = self
            .bus
            .publish(&self.topic, &Envelope::new(EventTag::StateChanged, path.clone().into()));
        debug!(worker = %self.key(), %path, ?elapsed, receivers, "Published frame");
    }

    fn discard(&self, artifact: &Path) {
        if !self.gate.pending_reset() {
            return;
        }
        match std::fs::remove_file(artifact) {
            Ok(()) => {
                self.gate.complete_reset();
                info!(worker = %self.key(), path = %artifact.display(), "Discarded frame captured during reset");
            }
            Err(e) => {
                error!(worker = %self.key(), path = %artifact.display(), error = %e, "Error during camera reset cleanup");
            }
        }
    }

    /// Finish a reset that arrived while no unit was in flight
    fn settle_reset(&self) {
        if self.gate.pending_reset() {
            self.gate.complete_reset();
            debug!(worker = %self.key(), "Reset arrived between captures, nothing to discard");
        }
    }

    async fn wait_for_schedule(&self) {
        let now = Local::now();
        let next = next_scheduled_time(now, self.config.delay.as_ref());
        self.gate.schedule(next);
        let delay = duration_until(&next, &now);
        debug!(worker = %self.key(), next = %next, ?delay, "Waiting for next capture");
        self.flags.sleep(delay).await;
    }
}

impl std::fmt::Debug for CameraWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraWorker")
            .field("key", &self.config.key)
            .field("topic", &self.topic)
            .field("gate", &self.gate.snapshot())
            .finish()
    }
}
