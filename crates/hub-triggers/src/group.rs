//! Trigger groups
//!
//! A group ties several triggers together: its actions fire only while every
//! member trigger is active. Members hand control to the group on each of
//! their cycles, so the group sees both rising and falling members.

use hub_core::{Fired, SharedAction};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

use crate::trigger::{EdgeState, Frequency};

/// Trigger group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerGroupConfig {
    /// Unique key
    pub key: String,

    /// Friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Frequency policy for the group as a whole
    #[serde(default)]
    pub frequency: Frequency,

    /// Keys of the actions to fire
    #[serde(default)]
    pub actions: Vec<String>,
}

/// A group of triggers that fires when all members are active
pub struct TriggerGroup {
    config: TriggerGroupConfig,
    actions: Vec<SharedAction>,
    members: Mutex<Vec<Arc<AtomicBool>>>,
    state: Mutex<EdgeState>,
}

impl TriggerGroup {
    /// Create a group with no actions and no members
    pub fn new(config: TriggerGroupConfig) -> Self {
        Self {
            config,
            actions: Vec::new(),
            members: Mutex::new(Vec::new()),
            state: Mutex::new(EdgeState::default()),
        }
    }

    /// Set the actions fired by this group
    pub fn with_actions(mut self, actions: Vec<SharedAction>) -> Self {
        self.actions = actions;
        self
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    /// Register a member's active flag
    pub fn add_member(&self, active: Arc<AtomicBool>) {
        lock(&self.members).push(active);
    }

    /// Number of member triggers
    pub fn member_count(&self) -> usize {
        lock(&self.members).len()
    }

    /// Whether every member is active (false for an empty group)
    pub fn all_active(&self) -> bool {
        let members = lock(&self.members);
        !members.is_empty() && members.iter().all(|m| m.load(Ordering::SeqCst))
    }

    /// Snapshot of the group's edge state
    pub fn edge_state(&self) -> EdgeState {
        *lock(&self.state)
    }

    /// Re-evaluate the group after a member cycle
    ///
    /// `member_fired` is whether the member's own policy decided to fire.
    /// Returns whether the group fired.
    pub fn evaluate(&self, member_fired: bool, fired: &Fired) -> bool {
        let current = self.all_active();
        let mut state = lock(&self.state);

        state.trigger_active = current;
        let rising = current && !state.previous_state;
        let fire = rising || (current && member_fired && self.config.frequency == Frequency::Many);
        state.end_cycle();

        if fire {
            let group_fired = Fired {
                source: self.key().to_string(),
                ..fired.clone()
            };
            debug!(group = %self.key(), member = %fired.source, "Trigger group fired");
            for action in &self.actions {
                if let Err(e) = action.trigger(&group_fired) {
                    error!(group = %self.key(), action = %action.key(), error = %e, "Action failed");
                }
            }
        }
        fire
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
