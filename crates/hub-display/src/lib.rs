//! Character display scheduling
//!
//! A [`CharDisplay`] owns a bounded FIFO of [`Message`]s and rotates what is
//! shown on its [`DisplayDriver`] by per-message duration. Messages may carry
//! `[name]` short codes that are resolved against the state store when they
//! are queued.
//!
//! # Key Types
//!
//! - [`CharDisplay`] - Queue, tick loop and bus handler
//! - [`MessageQueue`] - FIFO that evicts its oldest entry when full
//! - [`DisplayAction`] - Lets triggers drive a display

pub mod action;
pub mod display;
pub mod driver;
pub mod message;

pub use action::{DisplayAction, DisplayCommand};
pub use display::{CharDisplay, DisplayConfig, CLEAR_SETTLE, EXPIRY_TOLERANCE};
pub use driver::{DisplayDriver, LogDriver, SharedDisplayDriver};
pub use message::{Message, MessageQueue};

use thiserror::Error;

/// Display errors
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("Invalid short code pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid message payload: {0}")]
    InvalidPayload(String),

    #[error("Display driver error: {0}")]
    Driver(String),
}

/// Result type for display operations
pub type DisplayResult<T> = Result<T, DisplayError>;
