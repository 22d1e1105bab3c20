//! Built-in actions and the action registry
//!
//! Actions are configured once and referenced by key from triggers and
//! trigger groups. Two kinds are built in: `event` publishes an envelope on
//! the bus and `command` spawns a shell command. Components register their
//! own actions (for example display commands) in the same registry.

use dashmap::DashMap;
use hub_core::{Action, ActionError, ActionResult, Envelope, Fired, SharedAction};
use hub_event_bus::SharedEventBus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::trigger::{TriggerError, TriggerResult};

/// Action configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Publish an envelope on a topic
    Event {
        key: String,
        topic: String,
        event: String,
        /// Payload; the firing value is sent when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    /// Spawn a shell command
    Command { key: String, command: String },
}

impl ActionConfig {
    pub fn key(&self) -> &str {
        match self {
            ActionConfig::Event { key, .. } | ActionConfig::Command { key, .. } => key,
        }
    }
}

/// Publishes an envelope on the bus when fired
pub struct EventAction {
    key: String,
    topic: String,
    event: String,
    data: Option<serde_json::Value>,
    bus: SharedEventBus,
}

impl EventAction {
    pub fn new(
        key: impl Into<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        data: Option<serde_json::Value>,
        bus: SharedEventBus,
    ) -> Self {
        Self {
            key: key.into(),
            topic: topic.into(),
            event: event.into(),
            data,
            bus,
        }
    }
}

impl Action for EventAction {
    fn key(&self) -> &str {
        &self.key
    }

    fn trigger(&self, fired: &Fired) -> ActionResult<()> {
        let data = self
            .data
            .clone()
            .or_else(|| fired.value.clone())
            .unwrap_or_default();
        let envelope = Envelope::new(self.event.as_str(), data);
        let receivers = self.bus.publish(&self.topic, &envelope);
        debug!(action = %self.key, topic = %self.topic, receivers, "Published event action");
        Ok(())
    }
}

/// Spawns a shell command when fired, without waiting for it
///
/// The command sees `HOMEHUB_SOURCE`, `HOMEHUB_EVENT` and `HOMEHUB_VALUE` in
/// its environment. Must be fired from within a tokio runtime.
pub struct CommandAction {
    key: String,
    command: String,
}

impl CommandAction {
    pub fn new(key: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            command: command.into(),
        }
    }
}

impl Action for CommandAction {
    fn key(&self) -> &str {
        &self.key
    }

    fn trigger(&self, fired: &Fired) -> ActionResult<()> {
        let value = fired
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("HOMEHUB_SOURCE", &fired.source)
            .env("HOMEHUB_EVENT", fired.event.as_str())
            .env("HOMEHUB_VALUE", value)
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| ActionError::Spawn {
                key: self.key.clone(),
                source: e,
            })?;

        debug!(action = %self.key, pid = ?child.id(), "Spawned command action");
        Ok(())
    }
}

/// Registry of actions by key
#[derive(Default)]
pub struct ActionRegistry {
    actions: DashMap<String, SharedAction>,
}

impl ActionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in actions from configuration
    pub fn from_configs(configs: Vec<ActionConfig>, bus: SharedEventBus) -> Self {
        let registry = Self::new();
        for config in configs {
            let action: SharedAction = match config {
                ActionConfig::Event {
                    key,
                    topic,
                    event,
                    data,
                } => Arc::new(EventAction::new(key, topic, event, data, bus.clone())),
                ActionConfig::Command { key, command } => Arc::new(CommandAction::new(key, command)),
            };
            registry.register(action);
        }
        info!("Loaded {} actions", registry.len());
        registry
    }

    /// Register an action, replacing any action with the same key
    pub fn register(&self, action: SharedAction) {
        self.actions.insert(action.key().to_string(), action);
    }

    /// Look up an action by key
    pub fn get(&self, key: &str) -> Option<SharedAction> {
        self.actions.get(key).map(|a| a.clone())
    }

    /// Resolve a list of action keys for a trigger
    pub fn resolve(&self, owner: &str, keys: &[String]) -> TriggerResult<Vec<SharedAction>> {
        keys.iter()
            .map(|key| {
                self.get(key).ok_or_else(|| TriggerError::UnknownAction {
                    trigger: owner.to_string(),
                    action: key.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
