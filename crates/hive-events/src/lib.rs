//! Broadcast fan-out of archive lifecycle and progress events.
//!
//! Front ends subscribe once and receive every [`Envelope`] published after
//! that point; slow subscribers observe `Lagged` and skip ahead.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One published event: its topic, an RFC 3339 timestamp and a JSON payload.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    /// Stamps `payload` with the current UTC time.
    pub fn now(kind: &str, payload: Value) -> Self {
        Self {
            time: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            kind: kind.to_owned(),
            payload,
        }
    }

    /// Decodes the payload into `T`, returning `None` when the shape differs.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<Envelope>,
}

impl Bus {
    /// `capacity` bounds how far a subscriber may fall behind; zero is
    /// raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes `payload` under `kind` and returns how many subscribers
    /// it reached. Events published while nobody listens are dropped.
    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) -> usize {
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::warn!(target: "hive::events", kind, error = %err, "event payload failed to serialize");
            serde_json::json!({ "error": "unserializable payload" })
        });
        let delivered = self.sender.send(Envelope::now(kind, payload)).unwrap_or(0);
        tracing::trace!(target: "hive::events", kind, delivered, "event published");
        delivered
    }
}
