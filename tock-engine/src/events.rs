//! Defines the events broadcast by the Tock engine.
//!
//! Shells, daemons and tests subscribe to these to follow what the wall is
//! doing without reaching into its state.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::warn;

/// Lifecycle and activity of the clock wall.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockEvent {
    /// The startup flourish began across `faces` faces.
    PowerOnStarted { faces: usize },
    /// Every face finished its power-on; the shared tick loop is starting.
    PowerOnCompleted,
    /// The wall was rebuilt and snapped after a settings change.
    Rebuilt { faces: usize },
    /// One shared reconciliation tick ran against `now`.
    Tick { now: DateTime<Utc> },
    WeatherUpdated { city: String },
    /// Geocoding or fetching failed; the badge keeps its last value.
    WeatherFailed { city: String, reason: String },
    CityAdded { name: String, tz: String },
    CityRemoved { name: String },
    /// A city add was rejected because its zone did not parse.
    InvalidTimezone { tz: String },
    SettingsChanged { show_seconds: bool, use_celsius: bool },
}

/// Receives the next event, skipping over any the subscriber fell behind on.
///
/// Returns `None` only once the engine is gone.
pub async fn next_event(events: &mut Receiver<ClockEvent>) -> Option<ClockEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event subscriber lagged");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn lagging_subscriber_keeps_receiving() {
        let (sender, mut events) = broadcast::channel(2);
        for faces in 0..5 {
            sender.send(ClockEvent::Rebuilt { faces }).unwrap();
        }

        assert_eq!(next_event(&mut events).await, Some(ClockEvent::Rebuilt { faces: 3 }));
        assert_eq!(next_event(&mut events).await, Some(ClockEvent::Rebuilt { faces: 4 }));

        drop(sender);
        assert_eq!(next_event(&mut events).await, None);
    }
}
