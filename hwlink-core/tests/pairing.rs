//! Integration tests for the discovery/pairing workflow
//!
//! All timing-sensitive tests run on tokio's paused clock, so the 30 second
//! discovery deadline elapses in virtual time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hwlink_core::{DeviceLink, DiscoveryState, SimTransport, StatusSink};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Status(DiscoveryState, String),
    Device { model: String, session: String },
    Trigger(bool),
}

/// Sink that records every emission for later assertions.
#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<Event>>>);

impl RecordingSink {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn states(&self) -> Vec<DiscoveryState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(state, _) => Some(state),
                _ => None,
            })
            .collect()
    }

    fn last_trigger(&self) -> Option<bool> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::Trigger(enabled) => Some(enabled),
            _ => None,
        })
    }

    fn error_message(&self) -> Option<String> {
        self.events().into_iter().find_map(|e| match e {
            Event::Status(DiscoveryState::Error, message) => Some(message),
            _ => None,
        })
    }
}

impl StatusSink for RecordingSink {
    fn status(&self, state: DiscoveryState, message: &str) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Status(state, message.to_string()));
    }

    fn device_connected(&self, model: &str, session: &str) {
        self.0.lock().unwrap().push(Event::Device {
            model: model.to_string(),
            session: session.to_string(),
        });
    }

    fn trigger(&self, enabled: bool) {
        self.0.lock().unwrap().push(Event::Trigger(enabled));
    }
}

/// Let the cycle tasks run; under the paused clock this advances virtual
/// time past any pending timers.
async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_only_first_device_is_connected() {
    let sim = SimTransport::new()
        .with_device("d1", "Nano X", "NanoX", Duration::from_millis(5))
        .with_device("d2", "Stax", "Stax", Duration::from_millis(5));
    let log = sim.connect_log();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;

    let devices = log.devices().await;
    assert_eq!(devices.len(), 1, "exactly one connect per cycle");
    assert_eq!(devices[0].id, "d1");
    assert_eq!(link.state().await, DiscoveryState::Connected);
    assert_eq!(
        sink.states(),
        vec![
            DiscoveryState::Searching,
            DiscoveryState::Found,
            DiscoveryState::Connected
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_cancels_previous_cycle() {
    let sim = SimTransport::new().with_device("d1", "Nano X", "NanoX", Duration::from_secs(10));
    let log = sim.connect_log();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(10).await;
    link.start_discovery().await;
    settle(15_000).await;

    // Only the second cycle's stream was alive to deliver a device
    assert_eq!(log.count().await, 1);
    assert_eq!(link.state().await, DiscoveryState::Connected);
    let searching = sink
        .states()
        .into_iter()
        .filter(|s| *s == DiscoveryState::Searching)
        .count();
    assert_eq!(searching, 2);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_when_no_device_appears_in_time() {
    let sim = SimTransport::new().with_device("d1", "Nano X", "NanoX", Duration::from_secs(60));
    let log = sim.connect_log();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(35_000).await;

    assert_eq!(log.count().await, 0);
    assert_eq!(
        sink.states(),
        vec![DiscoveryState::Searching, DiscoveryState::TimedOut]
    );
    assert_eq!(sink.last_trigger(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_after_stream_completes_empty() {
    let sim = SimTransport::new();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(35_000).await;

    assert_eq!(
        sink.states(),
        vec![DiscoveryState::Searching, DiscoveryState::TimedOut]
    );
    assert_eq!(link.state().await, DiscoveryState::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_session_wins_over_timer_on_empty_rescan() {
    let sim = SimTransport::new()
        .with_device("d1", "Nano X", "NanoX", Duration::from_millis(5))
        .emit_script_once();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;
    assert_eq!(link.state().await, DiscoveryState::Connected);
    assert!(link.session().await.is_some());

    // Rescan finds nothing; the deadline passes while a session is held, so
    // no TimedOut is reported, but the trigger comes back.
    link.start_discovery().await;
    settle(35_000).await;

    assert!(link.session().await.is_some());
    assert!(!sink.states().contains(&DiscoveryState::TimedOut));
    assert_eq!(sink.last_trigger(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_session_even_when_transport_fails() {
    let sim = SimTransport::new()
        .with_device("d1", "Nano X", "NanoX", Duration::from_millis(5))
        .failing_disconnect("usb unplugged");
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;
    assert!(link.session().await.is_some());

    link.disconnect().await;

    assert!(link.session().await.is_none());
    assert_eq!(link.state().await, DiscoveryState::Disconnected);
    // The transport failure is logged, never surfaced
    assert!(!sink.states().contains(&DiscoveryState::Error));
}

#[tokio::test(start_paused = true)]
async fn test_connect_rejection_reports_error_without_session() {
    let sim = SimTransport::new()
        .with_device("d1", "Nano X", "NanoX", Duration::from_millis(5))
        .failing_connect("denied");
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;

    assert_eq!(
        sink.states(),
        vec![
            DiscoveryState::Searching,
            DiscoveryState::Found,
            DiscoveryState::Error
        ]
    );
    let message = sink.error_message().expect("error status emitted");
    assert!(message.starts_with("error // connection_failed"));
    assert!(message.contains("denied"));
    assert!(link.session().await.is_none());
    assert_eq!(sink.last_trigger(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_connected_display_form() {
    let sim = SimTransport::new()
        .with_device("d1", "Nano X", "NanoX", Duration::from_millis(5))
        .with_session_id("abcdef1234567890");
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;

    let display = sink.events().into_iter().find_map(|e| match e {
        Event::Device { model, session } => Some((model, session)),
        _ => None,
    });
    assert_eq!(
        display,
        Some(("nanox".to_string(), "abcdef123456...".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_reports_and_reenables_trigger() {
    let sim = SimTransport::new().failing_stream("hid backend lost", Duration::from_millis(5));
    let log = sim.connect_log();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;
    settle(1_000).await;

    assert_eq!(
        sink.states(),
        vec![DiscoveryState::Searching, DiscoveryState::Error]
    );
    let message = sink.error_message().expect("error status emitted");
    assert!(message.contains("hid backend lost"));
    assert_eq!(log.count().await, 0);
    assert_eq!(sink.last_trigger(), Some(true));
}

#[tokio::test]
async fn test_discover_open_failure_reports_error() {
    let sim = SimTransport::new().failing_discover("webhid unavailable");
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.start_discovery().await;

    assert_eq!(
        sink.states(),
        vec![DiscoveryState::Searching, DiscoveryState::Error]
    );
    let message = sink.error_message().expect("error status emitted");
    assert!(message.contains("webhid unavailable"));
    assert_eq!(sink.last_trigger(), Some(true));
}

#[tokio::test]
async fn test_stop_discovery_is_noop_when_idle() {
    let sim = SimTransport::new();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.stop_discovery().await;

    assert!(sink.events().is_empty());
    assert_eq!(link.state().await, DiscoveryState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_session_still_reports_disconnected() {
    let sim = SimTransport::new();
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim, sink.clone());

    link.disconnect().await;

    assert_eq!(sink.states(), vec![DiscoveryState::Disconnected]);
    assert_eq!(link.state().await, DiscoveryState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_releases_previous_session() {
    let sim = Arc::new(
        SimTransport::new().with_device("d1", "Nano X", "NanoX", Duration::from_millis(5)),
    );
    let sink = RecordingSink::default();
    let link = DeviceLink::new(sim.clone(), sink.clone());

    link.start_discovery().await;
    settle(1_000).await;
    let first = link.session().await.expect("first session");

    link.start_discovery().await;
    settle(1_000).await;
    let second = link.session().await.expect("second session");

    assert_ne!(first, second);
    // The first session was released on the transport side before the new
    // pairing stored its replacement.
    assert!(
        hwlink_core::DeviceTransport::device_info(sim.as_ref(), &first)
            .await
            .is_err()
    );
}
