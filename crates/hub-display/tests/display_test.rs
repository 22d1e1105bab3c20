//! Character display scheduling tests

use hub_core::{topics, Action, ActionError, BusPayload, Envelope, EventTag, Fired, SystemFlags};
use hub_display::{
    CharDisplay, DisplayAction, DisplayCommand, DisplayConfig, DisplayDriver, DisplayError,
    DisplayResult, Message,
};
use hub_event_bus::EventBus;
use hub_state_store::StateStore;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingDriver {
    events: Mutex<Vec<String>>,
}

impl RecordingDriver {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn rendered(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("render:").map(str::to_string))
            .collect()
    }
}

impl DisplayDriver for RecordingDriver {
    fn render(&self, message: &Message) -> DisplayResult<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("render:{}", message.message));
        Ok(())
    }

    fn clear_display(&self) -> DisplayResult<()> {
        self.events.lock().unwrap().push("clear".to_string());
        Ok(())
    }

    fn backlight(&self, on: bool) -> DisplayResult<()> {
        self.events.lock().unwrap().push(format!("backlight:{}", on));
        Ok(())
    }
}

/// A driver whose hardware has gone away
struct UnpluggedDriver;

impl DisplayDriver for UnpluggedDriver {
    fn render(&self, _message: &Message) -> DisplayResult<()> {
        Err(DisplayError::Driver("i2c write failed".to_string()))
    }

    fn clear_display(&self) -> DisplayResult<()> {
        Err(DisplayError::Driver("i2c write failed".to_string()))
    }

    fn backlight(&self, _on: bool) -> DisplayResult<()> {
        Err(DisplayError::Driver("i2c write failed".to_string()))
    }
}

struct Harness {
    bus: Arc<EventBus>,
    states: Arc<StateStore>,
    flags: Arc<SystemFlags>,
    driver: Arc<RecordingDriver>,
    display: Arc<CharDisplay>,
}

fn harness_with(config: DisplayConfig) -> Harness {
    let bus = Arc::new(EventBus::new());
    let states = Arc::new(StateStore::new());
    let flags = Arc::new(SystemFlags::new());
    let driver = Arc::new(RecordingDriver::default());
    let display = Arc::new(
        CharDisplay::new(
            config,
            driver.clone(),
            bus.clone(),
            states.clone(),
            flags.clone(),
        )
        .unwrap(),
    );
    Harness {
        bus,
        states,
        flags,
        driver,
        display,
    }
}

fn harness() -> Harness {
    harness_with(DisplayConfig::new("lcd"))
}

fn texts(display: &CharDisplay) -> Vec<String> {
    display.queued().into_iter().map(|m| m.message).collect()
}

#[test]
fn test_short_code_substitution() {
    let h = harness();
    h.states.set("t", "72");

    h.display.add_message("Temp: [t]", Some(10));
    assert_eq!(h.display.dequeue_next(), Message::new("Temp: 72", 10));
}

#[test]
fn test_short_code_values() {
    let h = harness();
    h.states.set("code", "42");
    h.states.set("name", "\"porch\"");
    h.states.set("raw", "not json");

    let stored = h.display.add_message("[code]|[name]|[missing]|[raw]|[code  ]", None);
    assert_eq!(stored.message, "42|porch|||42");
}

#[test]
fn test_duration_clamped() {
    let h = harness();
    assert_eq!(h.display.add_message("a", Some(9999)).duration, 60);
    assert_eq!(h.display.add_message("b", Some(-3)).duration, 0);
    assert_eq!(h.display.add_message("c", None).duration, 5);
}

#[test]
fn test_literal_newline() {
    let h = harness();
    let stored = h.display.add_message("Line 1\\nLine 2", None);
    assert_eq!(stored.message, "Line 1\nLine 2");
}

#[test]
fn test_queue_evicts_oldest() {
    let mut config = DisplayConfig::new("lcd");
    config.message_limit = 2;
    let h = harness_with(config);

    h.display.add_message("A", None);
    h.display.add_message("B", None);
    h.display.add_message("C", None);
    assert_eq!(texts(&h.display), vec!["B", "C"]);
}

#[tokio::test]
async fn test_message_queued_published() {
    let h = harness();
    let mut sub = h.bus.subscribe(topics::CHAR_DISPLAY);

    h.display.add_message("Hello", Some(3));

    let envelope = sub.try_next().unwrap().decode().unwrap();
    assert_eq!(envelope.event, EventTag::MessageQueued);
    assert_eq!(envelope.data, json!({"message": "Hello", "duration": 3}));
}

#[test]
fn test_empty_queue_yields_empty_message() {
    let h = harness();
    assert_eq!(h.display.dequeue_next(), Message::new("", 5));
}

#[tokio::test(start_paused = true)]
async fn test_tick_rotates_after_duration() {
    let h = harness();
    h.flags.set_ready(true);
    h.display.add_message("Hello", Some(2));

    h.display.tick().await;
    assert_eq!(h.driver.events(), vec!["clear", "render:Hello"]);
    assert_eq!(h.display.current_message(), "Hello");

    // Still within duration plus tolerance: no redraw
    tokio::time::sleep(Duration::from_secs(2)).await;
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["Hello"]);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["Hello", ""]);
    assert_eq!(h.display.cached_message(), Message::new("", 5));
}

#[tokio::test(start_paused = true)]
async fn test_tick_waits_for_ready() {
    let h = harness();
    h.display.add_message("Hello", Some(2));

    h.display.tick().await;
    assert!(h.driver.events().is_empty());
    assert_eq!(h.display.queue_len(), 1);

    h.flags.set_ready(true);
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["Hello"]);
}

#[tokio::test(start_paused = true)]
async fn test_next_message_advances_queue() {
    let h = harness();
    h.flags.set_ready(true);
    h.display.add_message("A", Some(60));
    h.display.add_message("B", Some(60));

    h.display.tick().await;
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["A"]);

    h.display.next_message();
    assert!(h.display.is_expired());
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["A", "B"]);
    assert!(!h.display.is_expired());
}

#[test]
fn test_handle_payload() {
    let h = harness();

    h.display.handle_payload(
        Envelope::new(EventTag::Message, json!({"message": "Hi", "duration": "10"})).into(),
    );
    assert_eq!(h.display.queued(), vec![Message::new("Hi", 10)]);

    h.display
        .handle_payload(BusPayload::from(r#"{"event": "Clear", "data": null}"#));
    assert_eq!(h.driver.events(), vec!["clear"]);
    assert_eq!(h.display.queue_len(), 1);

    h.display
        .handle_payload(Envelope::new(EventTag::ClearQueue, json!(null)).into());
    assert_eq!(h.display.queue_len(), 0);
}

#[test]
fn test_bad_payloads_are_swallowed() {
    let h = harness();
    h.display.handle_payload(BusPayload::Raw(vec![0xff, 0xfe]));
    h.display.handle_payload(BusPayload::from("{not json"));
    h.display
        .handle_payload(Envelope::new(EventTag::Message, json!(null)).into());
    h.display.handle_payload(
        Envelope::new(EventTag::Message, json!({"message": "x", "duration": "soon"})).into(),
    );
    assert_eq!(h.display.queue_len(), 0);
    assert!(h.driver.events().is_empty());
}

#[test]
fn test_display_actions() {
    let h = harness();
    let actions = DisplayAction::all_for(&h.display);
    assert_eq!(actions.len(), 6);
    assert!(actions.iter().any(|a| a.key() == "lcd.next_message"));

    let show = DisplayAction::new(h.display.clone(), DisplayCommand::Show);
    let fired = Fired::new("high_temp", EventTag::ControlUpdate).with_value(json!("Too hot"));
    show.trigger(&fired).unwrap();
    assert_eq!(texts(&h.display), vec!["Too hot"]);

    DisplayAction::new(h.display.clone(), DisplayCommand::BacklightOff)
        .trigger(&fired)
        .unwrap();
    DisplayAction::new(h.display.clone(), DisplayCommand::ClearQueue)
        .trigger(&fired)
        .unwrap();
    assert_eq!(h.driver.events(), vec!["backlight:false"]);
    assert_eq!(h.display.queue_len(), 0);
}

#[test]
fn test_display_action_reports_driver_failure() {
    let display = Arc::new(
        CharDisplay::new(
            DisplayConfig::new("lcd"),
            Arc::new(UnpluggedDriver),
            Arc::new(EventBus::new()),
            Arc::new(StateStore::new()),
            Arc::new(SystemFlags::new()),
        )
        .unwrap(),
    );
    let fired = Fired::new("high_temp", EventTag::ControlUpdate);

    let result = DisplayAction::new(display.clone(), DisplayCommand::Clear).trigger(&fired);
    match result {
        Err(ActionError::Failed { key, reason }) => {
            assert_eq!(key, "lcd.clear");
            assert!(reason.contains("i2c write failed"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        DisplayAction::new(display.clone(), DisplayCommand::BacklightOn).trigger(&fired),
        Err(ActionError::Failed { .. })
    ));

    // Queue operations never touch the driver
    DisplayAction::new(display.clone(), DisplayCommand::Show)
        .trigger(&fired)
        .unwrap();
    assert_eq!(display.queue_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_huge_duration_does_not_overflow_expiry() {
    let mut config = DisplayConfig::new("lcd");
    config.max_duration = u64::MAX;
    let h = harness_with(config);
    h.flags.set_ready(true);

    assert_eq!(h.display.add_message("Forever", Some(i64::MAX)).duration, i64::MAX as u64);
    h.display.tick().await;
    tokio::time::sleep(Duration::from_secs(3600)).await;
    h.display.tick().await;
    assert_eq!(h.driver.rendered(), vec!["Forever"]);
    assert!(!h.display.is_expired());
}

#[tokio::test(start_paused = true)]
async fn test_run_renders_bus_messages() {
    let h = harness();
    h.flags.set_ready(true);
    let handle = h.display.clone().run();

    h.bus.publish(
        h.display.topic(),
        &Envelope::new(EventTag::Message, json!({"message": "From bus"})),
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.driver.rendered(), vec!["From bus"]);

    h.flags.shutdown();
    handle.await.unwrap();
}
