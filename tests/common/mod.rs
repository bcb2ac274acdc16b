//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use kaliscope_rs::engine::{FrameEvent, FrameSubscription};
use std::time::{Duration, Instant};

/// Upper bound for waiting on the worker thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Receive the next event or fail the test
pub fn next_event(subscription: &FrameSubscription) -> FrameEvent {
    subscription
        .recv_timeout(test_timeout())
        .expect("timed out waiting for a frame event")
}

/// Collect events until a terminal one (included) arrives
pub fn collect_until_terminal(subscription: &FrameSubscription) -> Vec<FrameEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(subscription);
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}

/// Indices of the `FrameReady` events in `events`
pub fn ready_indices(events: &[FrameEvent]) -> Vec<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            FrameEvent::FrameReady { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

/// Assert that nothing arrives within `quiet`
pub fn assert_no_event(subscription: &FrameSubscription, quiet: Duration) {
    if let Ok(event) = subscription.recv_timeout(quiet) {
        panic!("expected no event, got {:?}", event);
    }
}

/// Poll `condition` until it holds or the test timeout expires
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
