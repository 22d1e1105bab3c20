//! Trigger engine
//!
//! The engine owns every configured trigger and group, wires their actions
//! from the registry and spawns one check loop per trigger.

use dashmap::DashMap;
use hub_core::SharedFlags;
use hub_event_bus::SharedEventBus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::action::ActionRegistry;
use crate::group::{TriggerGroup, TriggerGroupConfig};
use crate::trigger::{ControlTrigger, TriggerConfig, TriggerError, TriggerResult};

/// Owns and runs all control triggers
pub struct TriggerEngine {
    bus: SharedEventBus,
    triggers: Vec<Arc<ControlTrigger>>,
    groups: DashMap<String, Arc<TriggerGroup>>,
}

impl TriggerEngine {
    /// Create an empty engine
    pub fn new(bus: SharedEventBus) -> Self {
        Self {
            bus,
            triggers: Vec::new(),
            groups: DashMap::new(),
        }
    }

    /// Build groups and triggers from configuration
    ///
    /// Groups are built first so triggers can join them. Unknown action or
    /// group keys and duplicate trigger keys are rejected.
    pub fn load(
        &mut self,
        groups: Vec<TriggerGroupConfig>,
        triggers: Vec<TriggerConfig>,
        registry: &ActionRegistry,
    ) -> TriggerResult<()> {
        for config in groups {
            let actions = registry.resolve(&config.key, &config.actions)?;
            let group = TriggerGroup::new(config).with_actions(actions);
            debug!(group = %group.key(), "Loaded trigger group");
            self.groups.insert(group.key().to_string(), Arc::new(group));
        }

        for config in triggers {
            let actions = registry.resolve(&config.key, &config.actions)?;
            let sequences = registry.resolve(&config.key, &config.sequences)?;
            let group = match &config.group {
                Some(key) => Some(self.group(key).ok_or_else(|| TriggerError::UnknownGroup {
                    trigger: config.key.clone(),
                    group: key.clone(),
                })?),
                None => None,
            };

            let mut trigger = ControlTrigger::new(config)
                .with_actions(actions)
                .with_sequences(sequences);
            if let Some(group) = group {
                trigger = trigger.with_group(group);
            }
            self.add(trigger)?;
        }

        info!(
            "Loaded {} triggers in {} groups",
            self.triggers.len(),
            self.groups.len()
        );
        Ok(())
    }

    /// Add a trigger
    pub fn add(&mut self, trigger: ControlTrigger) -> TriggerResult<Arc<ControlTrigger>> {
        if self.get(trigger.key()).is_some() {
            return Err(TriggerError::DuplicateKey(trigger.key().to_string()));
        }
        let trigger = Arc::new(trigger);
        self.triggers.push(trigger.clone());
        Ok(trigger)
    }

    /// Get a trigger by key
    pub fn get(&self, key: &str) -> Option<Arc<ControlTrigger>> {
        self.triggers.iter().find(|t| t.key() == key).cloned()
    }

    /// Get a group by key
    pub fn group(&self, key: &str) -> Option<Arc<TriggerGroup>> {
        self.groups.get(key).map(|g| g.clone())
    }

    /// All triggers
    pub fn triggers(&self) -> &[Arc<ControlTrigger>] {
        &self.triggers
    }

    /// Subscribe every trigger to its topic and spawn its check loop
    pub fn spawn(&self, flags: SharedFlags) -> Vec<JoinHandle<()>> {
        self.triggers
            .iter()
            .map(|trigger| {
                let subscription = self.bus.subscribe(trigger.topic());
                tokio::spawn(trigger.clone().check(flags.clone(), subscription))
            })
            .collect()
    }
}
