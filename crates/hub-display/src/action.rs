//! Display actions for the trigger engine

use hub_core::{Action, ActionError, ActionResult, Fired};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::display::CharDisplay;

/// What a display action does when fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayCommand {
    /// Queue the firing value as a message
    Show,
    Clear,
    ClearQueue,
    NextMessage,
    BacklightOn,
    BacklightOff,
}

impl DisplayCommand {
    pub const ALL: [DisplayCommand; 6] = [
        DisplayCommand::Show,
        DisplayCommand::Clear,
        DisplayCommand::ClearQueue,
        DisplayCommand::NextMessage,
        DisplayCommand::BacklightOn,
        DisplayCommand::BacklightOff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayCommand::Show => "show",
            DisplayCommand::Clear => "clear",
            DisplayCommand::ClearQueue => "clear_queue",
            DisplayCommand::NextMessage => "next_message",
            DisplayCommand::BacklightOn => "turn_on_backlight",
            DisplayCommand::BacklightOff => "turn_off_backlight",
        }
    }
}

/// Runs a [`DisplayCommand`] on one display, keyed `{display}.{command}`
pub struct DisplayAction {
    key: String,
    command: DisplayCommand,
    display: Arc<CharDisplay>,
}

impl DisplayAction {
    pub fn new(display: Arc<CharDisplay>, command: DisplayCommand) -> Self {
        Self {
            key: format!("{}.{}", display.key(), command.as_str()),
            command,
            display,
        }
    }

    /// One action per command for a display
    pub fn all_for(display: &Arc<CharDisplay>) -> Vec<DisplayAction> {
        DisplayCommand::ALL
            .iter()
            .map(|command| DisplayAction::new(display.clone(), *command))
            .collect()
    }

    pub fn command(&self) -> DisplayCommand {
        self.command
    }
}

impl Action for DisplayAction {
    fn key(&self) -> &str {
        &self.key
    }

    fn trigger(&self, fired: &Fired) -> ActionResult<()> {
        debug!(action = %self.key, source = %fired.source, "Display action fired");
        let result = match self.command {
            DisplayCommand::Show => {
                let text = match &fired.value {
                    Some(Value::String(text)) => text.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(value) => value.to_string(),
                };
                self.display.add_message(&text, None);
                Ok(())
            }
            DisplayCommand::Clear => self.display.clear(),
            DisplayCommand::ClearQueue => {
                self.display.clear_queue();
                Ok(())
            }
            DisplayCommand::NextMessage => {
                self.display.next_message();
                Ok(())
            }
            DisplayCommand::BacklightOn => self.display.turn_on_backlight(),
            DisplayCommand::BacklightOff => self.display.turn_off_backlight(),
        };
        result.map_err(|e| ActionError::Failed {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }
}
