//! Display driver seam

use std::sync::Arc;
use tracing::info;

use crate::message::Message;
use crate::DisplayResult;

/// Physical character display
pub trait DisplayDriver: Send + Sync {
    fn render(&self, message: &Message) -> DisplayResult<()>;

    fn clear_display(&self) -> DisplayResult<()>;

    fn backlight(&self, on: bool) -> DisplayResult<()>;
}

pub type SharedDisplayDriver = Arc<dyn DisplayDriver>;

/// Driver that writes to the log, for headless hosts
#[derive(Debug, Clone)]
pub struct LogDriver {
    key: String,
}

impl LogDriver {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl DisplayDriver for LogDriver {
    fn render(&self, message: &Message) -> DisplayResult<()> {
        info!(display = %self.key, duration = message.duration, "{}", message.message);
        Ok(())
    }

    fn clear_display(&self) -> DisplayResult<()> {
        info!(display = %self.key, "Display cleared");
        Ok(())
    }

    fn backlight(&self, on: bool) -> DisplayResult<()> {
        info!(display = %self.key, on, "Backlight");
        Ok(())
    }
}
