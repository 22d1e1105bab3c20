//! The homehub instance
//!
//! Builds every component from the configuration document and spawns their
//! loops. Display actions are registered before triggers are loaded so that
//! triggers can reference them by key.

use anyhow::{Context, Result};
use hub_config::{load_section, Value};
use hub_core::{SharedAction, SharedFlags, SystemFlags};
use hub_display::{CharDisplay, DisplayAction, DisplayConfig, LogDriver};
use hub_event_bus::{EventBus, SharedEventBus};
use hub_state_store::{SharedStateStore, StateStore};
use hub_triggers::{ActionConfig, ActionRegistry, TriggerConfig, TriggerEngine, TriggerGroupConfig};
use hub_workers::{CameraWorker, WorkerConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// The central homehub instance
pub struct HomeHub {
    /// Event bus for pub/sub communication
    pub bus: SharedEventBus,
    /// Shared key/value state
    pub states: SharedStateStore,
    /// Process-wide lifecycle flags
    pub flags: SharedFlags,
    /// Actions by key
    pub actions: ActionRegistry,
    pub triggers: TriggerEngine,
    pub displays: Vec<Arc<CharDisplay>>,
    pub cameras: Vec<CameraWorker>,
}

impl HomeHub {
    /// Create an instance with no components
    pub fn new() -> Self {
        let bus = Arc::new(EventBus::new());
        Self {
            triggers: TriggerEngine::new(bus.clone()),
            bus,
            states: Arc::new(StateStore::new()),
            flags: Arc::new(SystemFlags::new()),
            actions: ActionRegistry::new(),
            displays: Vec::new(),
            cameras: Vec::new(),
        }
    }

    /// Build all components from a loaded configuration document
    pub fn load(config: &Value) -> Result<Self> {
        let mut hub = Self::new();

        let actions: Vec<ActionConfig> = load_section(config, "actions")?;
        hub.actions = ActionRegistry::from_configs(actions, hub.bus.clone());

        for display in load_section::<DisplayConfig>(config, "char_display")? {
            hub.add_display(display)?;
        }

        let groups: Vec<TriggerGroupConfig> = load_section(config, "trigger_groups")?;
        let triggers: Vec<TriggerConfig> = load_section(config, "triggers")?;
        hub.triggers
            .load(groups, triggers, &hub.actions)
            .context("loading triggers")?;

        for worker in load_section::<WorkerConfig>(config, "workers")? {
            match worker {
                WorkerConfig::Camera(camera) => hub.cameras.push(CameraWorker::new(
                    camera,
                    hub.bus.clone(),
                    hub.states.clone(),
                    hub.flags.clone(),
                )),
            }
        }

        info!(
            actions = hub.actions.len(),
            triggers = hub.triggers.triggers().len(),
            displays = hub.displays.len(),
            cameras = hub.cameras.len(),
            "Configuration loaded"
        );
        Ok(hub)
    }

    /// Add a display driven by the log and register its actions
    pub fn add_display(&mut self, config: DisplayConfig) -> Result<Arc<CharDisplay>> {
        let driver = Arc::new(LogDriver::new(config.key.clone()));
        let display = Arc::new(
            CharDisplay::new(
                config,
                driver,
                self.bus.clone(),
                self.states.clone(),
                self.flags.clone(),
            )
            .context("creating display")?,
        );
        for action in DisplayAction::all_for(&display) {
            self.actions.register(Arc::new(action) as SharedAction);
        }
        self.displays.push(display.clone());
        Ok(display)
    }

    /// Spawn every component loop and mark the system ready
    pub fn start(self) -> Vec<JoinHandle<()>> {
        let mut handles = self.triggers.spawn(self.flags.clone());

        for display in &self.displays {
            handles.push(display.clone().run());
        }

        for camera in self.cameras {
            match camera.config().command_device() {
                Ok(device) => handles.push(camera.run(Box::new(device))),
                Err(e) => warn!(worker = %camera.key(), error = %e, "Skipping camera"),
            }
        }

        self.flags.set_ready(true);
        info!(tasks = handles.len(), "System ready");
        handles
    }
}

impl Default for HomeHub {
    fn default() -> Self {
        Self::new()
    }
}
