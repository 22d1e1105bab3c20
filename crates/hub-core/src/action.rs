//! Action seam
//!
//! Actions are the side effects a trigger (or trigger group) causes when it
//! fires. Components expose their own operations as actions so triggers can
//! drive them without knowing their concrete types.

use std::sync::Arc;
use thiserror::Error;

use crate::EventTag;

/// Action errors
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action '{key}' failed: {reason}")]
    Failed { key: String, reason: String },

    #[error("Failed to spawn command for action '{key}': {source}")]
    Spawn {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for action execution
pub type ActionResult<T> = Result<T, ActionError>;

/// What fired an action
#[derive(Debug, Clone, PartialEq)]
pub struct Fired {
    /// Key of the trigger or trigger group that fired
    pub source: String,

    /// Tag of the envelope that caused the firing
    pub event: EventTag,

    /// The value that satisfied the thresholds, if any
    pub value: Option<serde_json::Value>,
}

impl Fired {
    /// Create a new firing record
    pub fn new(source: impl Into<String>, event: EventTag) -> Self {
        Self {
            source: source.into(),
            event,
            value: None,
        }
    }

    /// Attach the satisfying value
    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// A side effect that can be fired by a trigger
pub trait Action: Send + Sync {
    /// Unique key used to reference the action from configuration
    fn key(&self) -> &str;

    /// Run the action
    fn trigger(&self, fired: &Fired) -> ActionResult<()>;
}

/// Thread-safe handle to an action
pub type SharedAction = Arc<dyn Action>;
