//! Control trigger engine
//!
//! Triggers evaluate incoming `ControlUpdate` envelopes against thresholds
//! and fire actions according to a frequency policy.
//!
//! # Architecture
//!
//! ```text
//! bus topic → ControlTrigger::check → handle_payload → thresholds → frequency policy → actions
//!                                                                              ↘ TriggerGroup → actions
//! ```
//!
//! # Key Types
//!
//! - [`ControlTrigger`] - Threshold trigger with edge detection
//! - [`TriggerGroup`] - Fires when all member triggers are active
//! - [`ActionRegistry`] - Actions referenced by key from configuration
//! - [`TriggerEngine`] - Builds and runs all triggers

pub mod action;
pub mod engine;
pub mod group;
pub mod threshold;
pub mod trigger;

pub use action::{ActionConfig, ActionRegistry, CommandAction, EventAction};
pub use engine::TriggerEngine;
pub use group::{TriggerGroup, TriggerGroupConfig};
pub use threshold::{evaluate_thresholds, Comparison, Threshold};
pub use trigger::{
    ControlTrigger, EdgeState, Frequency, TriggerConfig, TriggerError, TriggerResult,
    NOT_READY_INTERVAL, TRIGGER_INTERVAL,
};
