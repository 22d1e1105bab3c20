//! Character display scheduler
//!
//! Bus handlers only mutate the queue or clear the screen. The tick loop is
//! the only place that renders, and it advances the queue once the cached
//! message has been shown for its duration (plus [`EXPIRY_TOLERANCE`]) or a
//! "show next" request marked it expired.

use hub_core::{topics, BusPayload, Envelope, EventTag, SharedFlags};
use hub_event_bus::SharedEventBus;
use hub_state_store::SharedStateStore;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

use crate::driver::SharedDisplayDriver;
use crate::message::{Message, MessageQueue};
use crate::{DisplayError, DisplayResult};

/// Extra time a message stays up past its duration
pub const EXPIRY_TOLERANCE: Duration = Duration::from_secs(1);

/// Pause between clearing the screen and rendering
pub const CLEAR_SETTLE: Duration = Duration::from_millis(4);

/// Default interval between ticks
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// `[name]` placeholders, trailing spaces inside the brackets allowed
const SHORT_CODE_PATTERN: &str = r"\[(.*?) *\]";

/// Character display configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Topic to listen on, `char_display/{key}` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Seconds a message is shown when none is given
    #[serde(default = "default_duration")]
    pub default_duration: u64,

    /// Upper bound on any message's duration
    #[serde(default = "default_max_duration")]
    pub max_duration: u64,

    /// Maximum number of queued messages
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,

    /// Seconds between ticks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<f64>,
}

fn default_duration() -> u64 {
    5
}

fn default_max_duration() -> u64 {
    60
}

fn default_message_limit() -> usize {
    20
}

impl DisplayConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: None,
            topic: None,
            default_duration: default_duration(),
            max_duration: default_max_duration(),
            message_limit: default_message_limit(),
            update_interval: None,
        }
    }

    pub fn topic(&self) -> String {
        self.topic
            .clone()
            .unwrap_or_else(|| format!("{}/{}", topics::CHAR_DISPLAY, self.key))
    }

    /// Tick interval; unusable values fall back to the default
    pub fn update_interval(&self) -> Duration {
        self.update_interval
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_UPDATE_INTERVAL)
    }
}

#[derive(Debug)]
struct DisplayState {
    queue: MessageQueue,
    /// Message selected for display
    cached: Message,
    /// Text currently on the screen
    current: String,
    expired: bool,
    duration_start: Instant,
}

/// A character display fed from a bounded message queue
pub struct CharDisplay {
    config: DisplayConfig,
    topic: String,
    short_codes: Regex,
    driver: SharedDisplayDriver,
    bus: SharedEventBus,
    states: SharedStateStore,
    flags: SharedFlags,
    state: Mutex<DisplayState>,
}

impl CharDisplay {
    pub fn new(
        config: DisplayConfig,
        driver: SharedDisplayDriver,
        bus: SharedEventBus,
        states: SharedStateStore,
        flags: SharedFlags,
    ) -> DisplayResult<Self> {
        let state = DisplayState {
            queue: MessageQueue::new(config.message_limit),
            cached: Message::new("", 3),
            current: String::new(),
            expired: true,
            duration_start: Instant::now(),
        };
        Ok(Self {
            topic: config.topic(),
            short_codes: Regex::new(SHORT_CODE_PATTERN)?,
            config,
            driver,
            bus,
            states,
            flags,
            state: Mutex::new(state),
        })
    }

    pub fn key(&self) -> &str {
        &self.config.key
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the queued messages, oldest first
    pub fn queued(&self) -> Vec<Message> {
        self.lock().queue.iter().cloned().collect()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Text currently on the screen
    pub fn current_message(&self) -> String {
        self.lock().current.clone()
    }

    /// Message selected for display
    pub fn cached_message(&self) -> Message {
        self.lock().cached.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.lock().expired
    }

    /// Replace `[name]` placeholders with values from the state store
    ///
    /// Stored values are JSON; strings are substituted without quotes. Missing
    /// or unparseable values become an empty string.
    pub fn resolve_short_codes(&self, text: &str) -> String {
        self.short_codes
            .replace_all(text, |caps: &Captures| self.short_code_value(&caps[1]))
            .into_owned()
    }

    fn short_code_value(&self, code: &str) -> String {
        let Some(raw) = self.states.get(code) else {
            return String::new();
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::String(s)) => s,
            Ok(value) => value.to_string(),
            Err(e) => {
                debug!(display = %self.key(), code, error = %e, "Unparseable short code value");
                String::new()
            }
        }
    }

    /// Queue a message
    ///
    /// Short codes are resolved, literal `\n` becomes a line break and the
    /// duration is clamped into `[0, max_duration]`. The oldest message is
    /// evicted when the queue is full. Returns the stored message.
    pub fn add_message(&self, message: &str, duration: Option<i64>) -> Message {
        let max = self.config.max_duration;
        let duration = match duration {
            Some(secs) => u64::try_from(secs).unwrap_or(0).min(max),
            None => self.config.default_duration.min(max),
        };
        let text = self.resolve_short_codes(message).replace("\\n", "\n");
        let stored = Message::new(text, duration);

        if let Some(evicted) = self.lock().queue.push(stored.clone()) {
            debug!(display = %self.key(), evicted = %evicted.message, "Queue full, dropped oldest message");
        }

        let envelope = Envelope::new(
            EventTag::MessageQueued,
            json!({"message": stored.message, "duration": stored.duration}),
        );
        self.bus.publish(topics::CHAR_DISPLAY, &envelope);
        stored
    }

    /// Pop the next queued message, or an empty one when the queue is empty
    pub fn dequeue_next(&self) -> Message {
        let mut state = self.lock();
        self.take_next(&mut state)
    }

    fn take_next(&self, state: &mut DisplayState) -> Message {
        match state.queue.pop_front() {
            Some(message) => {
                state.expired = false;
                state.duration_start = Instant::now();
                message
            }
            None => Message::new("", self.config.default_duration),
        }
    }

    /// Advance to the next message on the following tick
    pub fn next_message(&self) {
        self.lock().expired = true;
    }

    /// Clear the screen; the queue is untouched
    pub fn clear(&self) -> DisplayResult<()> {
        self.driver.clear_display().map_err(|e| {
            error!(display = %self.key(), error = %e, "Failed to clear display");
            e
        })
    }

    pub fn clear_queue(&self) {
        self.lock().queue.clear();
        debug!(display = %self.key(), "Cleared the message queue");
    }

    pub fn turn_on_backlight(&self) -> DisplayResult<()> {
        self.set_backlight(true)
    }

    pub fn turn_off_backlight(&self) -> DisplayResult<()> {
        self.set_backlight(false)
    }

    fn set_backlight(&self, on: bool) -> DisplayResult<()> {
        self.driver.backlight(on).map_err(|e| {
            error!(display = %self.key(), on, error = %e, "Failed to set backlight");
            e
        })
    }

    /// Run one scheduling step
    ///
    /// The state lock is released while the screen settles after a clear.
    pub async fn tick(&self) {
        let pending = {
            let mut state = self.lock();
            if !self.flags.is_ready() {
                state.duration_start = Instant::now();
                return;
            }

            let shown_for =
                Duration::from_secs(state.cached.duration).saturating_add(EXPIRY_TOLERANCE);
            if state.duration_start.elapsed() > shown_for {
                state.expired = true;
            }
            if state.expired {
                state.cached = self.take_next(&mut state);
            }

            (state.current != state.cached.message).then(|| state.cached.clone())
        };

        let Some(message) = pending else {
            return;
        };

        // Render even if the clear failed; the error is already logged
        let _ = self.clear();
        tokio::time::sleep(CLEAR_SETTLE).await;
        if let Err(e) = self.driver.render(&message) {
            error!(display = %self.key(), error = %e, "Failed to render message");
        }

        let mut state = self.lock();
        state.duration_start = Instant::now();
        state.current = message.message;
    }

    /// Handle one message from the display topic
    pub fn handle_payload(&self, payload: BusPayload) {
        let envelope = match payload.decode() {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(display = %self.key(), error = %e, "Error handling event for display");
                return;
            }
        };

        match envelope.event {
            EventTag::Message => {
                if let Err(e) = self.handle_message(&envelope.data) {
                    error!(display = %self.key(), error = %e, "Error handling event for display");
                }
            }
            EventTag::Clear => {
                let _ = self.clear();
            }
            EventTag::ClearQueue => self.clear_queue(),
            other => trace!(display = %self.key(), event = %other, "Ignoring event"),
        }
    }

    fn handle_message(&self, data: &Value) -> DisplayResult<Message> {
        if data.is_null() {
            return Err(DisplayError::InvalidPayload("missing message data".to_string()));
        }
        let text = match data.get("message") {
            None | Some(Value::Null) => "",
            Some(Value::String(text)) => text.as_str(),
            Some(other) => {
                return Err(DisplayError::InvalidPayload(format!(
                    "message is not a string: {}",
                    other
                )))
            }
        };
        let duration = match data.get("duration") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_duration(value)?),
        };
        Ok(self.add_message(text, duration))
    }

    /// Subscribe to the display topic and spawn the tick loop
    pub fn run(self: Arc<Self>) -> JoinHandle<()> {
        let display = self.clone();
        let subscription = self
            .bus
            .subscribe_with(self.topic.clone(), move |payload| display.handle_payload(payload));

        tokio::spawn(async move {
            let interval = self.config.update_interval();
            info!(display = %self.key(), topic = %self.topic, "Character display online");

            while self.flags.is_active() {
                self.tick().await;
                self.flags.sleep(interval).await;
            }

            subscription.unsubscribe();
            info!(display = %self.key(), "Character display shut down");
        })
    }
}

/// Durations arrive as numbers or numeric strings
fn parse_duration(value: &Value) -> DisplayResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DisplayError::InvalidPayload(format!("invalid duration: {}", value)))
}

impl std::fmt::Debug for CharDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharDisplay")
            .field("key", &self.config.key)
            .field("topic", &self.topic)
            .field("state", &*self.lock())
            .finish()
    }
}
