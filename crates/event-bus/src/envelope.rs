use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The unit of delivery: a payload plus the topic it was delivered on and
/// the delivery time in milliseconds since the Unix epoch.
///
/// One envelope is built per delivery attempt, so a redelivered message
/// arrives with the same payload and a newer timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    topic: String,
    payload: T,
    timestamp: i64,
}

impl<T> EventEnvelope<T> {
    /// Wraps a payload, stamping it with the current time.
    pub fn new(topic: impl Into<String>, payload: T) -> Self {
        Self::with_timestamp(topic, payload, Utc::now().timestamp_millis())
    }

    /// Wraps a payload with an explicit timestamp.
    pub fn with_timestamp(topic: impl Into<String>, payload: T, timestamp: i64) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Transforms the payload, keeping topic and timestamp.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EventEnvelope<U> {
        EventEnvelope {
            topic: self.topic,
            payload: f(self.payload),
            timestamp: self.timestamp,
        }
    }
}

impl EventEnvelope<serde_json::Value> {
    /// Decodes a JSON payload into a typed envelope.
    pub fn decode<T: DeserializeOwned>(self) -> Result<EventEnvelope<T>, serde_json::Error> {
        let payload = serde_json::from_value(self.payload)?;
        Ok(EventEnvelope {
            topic: self.topic,
            payload,
            timestamp: self.timestamp,
        })
    }
}
