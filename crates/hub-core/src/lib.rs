//! Core types for homehub
//!
//! This crate provides the fundamental types shared by every component:
//! the bus [`Envelope`] and its wire form [`BusPayload`], the recognized
//! [`EventTag`]s, the process-wide [`SystemFlags`], and the [`Action`] seam
//! that triggers use to cause side effects.

mod action;
mod envelope;
mod flags;

pub use action::{Action, ActionError, ActionResult, Fired, SharedAction};
pub use envelope::{BusPayload, DecodeError, DecodeResult, Envelope, EventTag};
pub use flags::{SharedFlags, SystemFlags};

/// Standard topics and state keys used across components
pub mod topics {
    /// Default topic control triggers listen on
    pub const CONTROLS: &str = "controls";

    /// Namespace topic for character display announcements
    pub const CHAR_DISPLAY: &str = "char_display";

    /// Default topic prefix for camera workers
    pub const CAMERA_PREFIX: &str = "homehub/camera";

    /// State store key holding the path of the last captured image
    pub const LAST_CAMERA_IMAGE: &str = "last_camera_image";
}
