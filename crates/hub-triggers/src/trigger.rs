//! Control triggers
//!
//! A control trigger watches `ControlUpdate` envelopes on a topic, reads one
//! field of the payload and fires its actions when the field satisfies the
//! configured thresholds.
//!
//! Edge detection relies only on comparing `trigger_active` with
//! `previous_state`, the value `trigger_active` had at the end of the prior
//! cycle. One evaluation cycle (decide, fire, update `previous_state`) runs
//! under the trigger's mutex so concurrent deliveries cannot reorder it.

use hub_core::{BusPayload, Envelope, EventTag, Fired, SharedAction, SharedFlags};
use hub_event_bus::{normalize_topic, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::group::TriggerGroup;
use crate::threshold::{evaluate_thresholds, Threshold};

/// Interval between check ticks while the system is ready
pub const TRIGGER_INTERVAL: Duration = Duration::from_millis(500);

/// Back-off while the system is not ready
pub const NOT_READY_INTERVAL: Duration = Duration::from_secs(2);

/// Trigger errors
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Trigger '{trigger}' references unknown action '{action}'")]
    UnknownAction { trigger: String, action: String },

    #[error("Trigger '{trigger}' references unknown group '{group}'")]
    UnknownGroup { trigger: String, group: String },

    #[error("Duplicate trigger key: {0}")]
    DuplicateKey(String),
}

/// Result type for trigger operations
pub type TriggerResult<T> = Result<T, TriggerError>;

/// Frequency policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// Edge-triggered: fire once per contiguous run of satisfying values
    #[default]
    Once,
    /// Level-triggered: fire on every satisfying value
    Many,
}

/// Edge state of a trigger or trigger group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeState {
    /// Whether the thresholds are currently satisfied
    pub trigger_active: bool,
    /// `trigger_active` as of the end of the previous cycle
    pub previous_state: bool,
}

impl EdgeState {
    /// Record the current measurement and decide whether to fire
    ///
    /// Does not touch `previous_state`; call [`EdgeState::end_cycle`] once
    /// every firing decision for the cycle has been made.
    pub fn decide(&mut self, current: bool, frequency: Frequency) -> bool {
        self.trigger_active = current;
        current && (self.trigger_active != self.previous_state || frequency == Frequency::Many)
    }

    /// Close the cycle
    pub fn end_cycle(&mut self) {
        self.previous_state = self.trigger_active;
    }
}

/// Control trigger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Unique key
    pub key: String,

    /// Friendly name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Payload field to read
    pub source: String,

    /// Thresholds the value must satisfy
    #[serde(default)]
    pub thresholds: Vec<Threshold>,

    /// Frequency policy
    #[serde(default)]
    pub frequency: Frequency,

    /// Topic to listen on
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Keys of the actions to fire
    #[serde(default)]
    pub actions: Vec<String>,

    /// Keys of the sequences to fire after the actions
    #[serde(default)]
    pub sequences: Vec<String>,

    /// Key of the trigger group this trigger belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

fn default_topic() -> String {
    hub_core::topics::CONTROLS.to_string()
}

/// A threshold trigger over control updates
pub struct ControlTrigger {
    config: TriggerConfig,
    topic: String,
    actions: Vec<SharedAction>,
    sequences: Vec<SharedAction>,
    group: Option<Arc<TriggerGroup>>,
    state: Mutex<EdgeState>,
    /// Mirror of `trigger_active`, readable by the group without the lock
    active: Arc<AtomicBool>,
}

impl ControlTrigger {
    /// Create a trigger with no actions
    pub fn new(config: TriggerConfig) -> Self {
        let topic = normalize_topic(&config.topic);
        Self {
            config,
            topic,
            actions: Vec::new(),
            sequences: Vec::new(),
            group: None,
            state: Mutex::new(EdgeState::default()),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the actions fired by this trigger
    pub fn with_actions(mut self, actions: Vec<SharedAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Set the sequences fired after the actions
    pub fn with_sequences(mut self, sequences: Vec<SharedAction>) -> Self {
        self.sequences = sequences;
        self
    }

    /// Join a trigger group; the group fires instead of this trigger's actions
    pub fn with_group(mut self, group: Arc<TriggerGroup>) -> Self {
        group.add_member(self.active.clone());
        self.group = Some(group);
        self
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn frequency(&self) -> Frequency {
        self.config.frequency
    }

    /// Snapshot of the edge state
    pub fn edge_state(&self) -> EdgeState {
        *self.lock_state()
    }

    /// Whether the trigger is currently active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, EdgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read the configured source field from a control payload
    ///
    /// Returns `None` when the field is absent or the payload is not an object.
    pub fn parse_control_data<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        data.as_object()?.get(&self.config.source)
    }

    /// Test the thresholds against a control payload
    pub fn evaluate(&self, data: &Value) -> bool {
        evaluate_thresholds(&self.config.thresholds, self.parse_control_data(data))
    }

    /// Handle one payload delivered on the trigger's topic
    ///
    /// Returns whether the trigger fired. Undecodable payloads are logged and
    /// dropped.
    pub fn handle_payload(&self, payload: BusPayload) -> bool {
        let mut state = self.lock_state();

        let fired = match payload.decode() {
            Ok(envelope) if envelope.event == EventTag::ControlUpdate => {
                let current = self.evaluate(&envelope.data);
                self.decide_and_fire(&mut state, current, &envelope)
            }
            Ok(envelope) => {
                trace!(trigger = %self.key(), event = %envelope.event, "Ignoring event");
                false
            }
            Err(e) => {
                error!(trigger = %self.key(), error = %e, "Error during trigger actions");
                false
            }
        };

        state.end_cycle();
        fired
    }

    /// Apply the frequency policy to the current measurement and fire
    fn decide_and_fire(&self, state: &mut EdgeState, current: bool, envelope: &Envelope) -> bool {
        let fire = state.decide(current, self.config.frequency);
        self.active.store(state.trigger_active, Ordering::SeqCst);

        let mut fired = Fired::new(self.key(), envelope.event.clone());
        if let Some(value) = self.parse_control_data(&envelope.data) {
            fired = fired.with_value(value.clone());
        }

        if let Some(group) = &self.group {
            group.evaluate(fire, &fired);
            return fire;
        }

        if fire {
            debug!(trigger = %self.key(), value = ?fired.value, "Trigger fired");
            self.trigger(&fired);
        }
        fire
    }

    /// Fire every action, then every sequence
    fn trigger(&self, fired: &Fired) {
        for action in self.actions.iter().chain(self.sequences.iter()) {
            if let Err(e) = action.trigger(fired) {
                error!(trigger = %self.key(), action = %action.key(), error = %e, "Action failed");
            }
        }
    }

    /// Run the check loop until shutdown
    ///
    /// Drains at most one buffered message per tick while the system is
    /// ready, and backs off while it is not.
    pub async fn check(self: Arc<Self>, flags: SharedFlags, mut subscription: Subscription) {
        info!(trigger = %self.key(), topic = %subscription.topic(), "Control trigger online");

        while flags.is_active() {
            if flags.is_ready() {
                if let Some(payload) = subscription.poll(TRIGGER_INTERVAL).await {
                    self.handle_payload(payload);
                }
            } else {
                flags.sleep(NOT_READY_INTERVAL).await;
            }
        }

        self.shutdown(subscription);
    }

    fn shutdown(&self, subscription: Subscription) {
        drop(subscription);
        if self.is_active() {
            warn!(trigger = %self.key(), "Shutting down while active");
        }
        info!(trigger = %self.key(), "Control trigger shut down");
    }
}

impl std::fmt::Debug for ControlTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlTrigger")
            .field("key", &self.config.key)
            .field("topic", &self.topic)
            .field("actions", &self.actions.len())
            .field("state", &self.edge_state())
            .finish()
    }
}
