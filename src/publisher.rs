//! Reading publication.
//!
//! A [`Reading`] is encoded as a flat JSON object (`{"temperature": 21.5,
//! "humidity": 40.0}`) and handed to a [`MessageSink`]. Field names are a wire
//! contract with existing consumers (e.g. Home Assistant value templates such
//! as `{{ value_json.temperature }}`).

use crate::BoxFuture;
use crate::reading::Reading;
use crate::topic::TopicRoute;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors reported by a transport for a single publish call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The client has no usable connection to the broker
    #[error("Not connected to the broker")]
    NotConnected,
    /// The client refused to queue the message
    #[error("Publish rejected: {0}")]
    Rejected(String),
}

/// Transport capability shared by the publisher and the announcer.
pub trait MessageSink: Send + Sync {
    /// Queue `payload` for delivery on `topic`.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), TransportError>>;
}

/// A failed publish on one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicFailure {
    pub topic: String,
    pub error: TransportError,
}

impl fmt::Display for TopicFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.topic, self.error)
    }
}

fn join_failures(failures: &[TopicFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from publishing a set of messages.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    /// Every topic that could not be published, in attempt order
    #[error("Publish failed for {}", join_failures(.0))]
    Transport(Vec<TopicFailure>),
}

impl PublishError {
    /// The topics that failed, empty for encoding errors.
    pub fn failures(&self) -> &[TopicFailure] {
        match self {
            PublishError::Transport(failures) => failures,
            PublishError::Encode(_) => &[],
        }
    }
}

/// Turn per-topic outcomes into one result, keeping every failure.
pub(crate) fn collect_outcomes<'a>(
    outcomes: impl IntoIterator<Item = (&'a str, Result<(), TransportError>)>,
) -> Result<(), PublishError> {
    let failures: Vec<TopicFailure> = outcomes
        .into_iter()
        .filter_map(|(topic, outcome)| {
            outcome.err().map(|error| TopicFailure {
                topic: topic.to_string(),
                error,
            })
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(PublishError::Transport(failures))
    }
}

/// State message body. Absent fields are left out of the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
}

impl StatePayload {
    /// Both values in one message.
    pub fn combined(reading: &Reading) -> Self {
        Self {
            temperature: Some(reading.temperature),
            humidity: Some(reading.humidity),
        }
    }

    pub fn temperature(reading: &Reading) -> Self {
        Self {
            temperature: Some(reading.temperature),
            humidity: None,
        }
    }

    pub fn humidity(reading: &Reading) -> Self {
        Self {
            temperature: None,
            humidity: Some(reading.humidity),
        }
    }

    /// UTF-8 JSON encoding of the payload.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Publish `reading` under `route`.
///
/// With a combined route exactly one message carrying both fields is sent.
/// Otherwise two messages are sent; both are attempted even if one fails and
/// every failure is reported.
pub async fn publish(
    reading: &Reading,
    route: &TopicRoute,
    sink: &dyn MessageSink,
) -> Result<(), PublishError> {
    if route.is_combined() {
        let payload = StatePayload::combined(reading).encode()?;
        let outcome = sink.publish(&route.temperature_topic, payload).await;
        return collect_outcomes([(route.temperature_topic.as_str(), outcome)]);
    }

    let temperature = StatePayload::temperature(reading).encode()?;
    let humidity = StatePayload::humidity(reading).encode()?;

    let (temperature_outcome, humidity_outcome) = tokio::join!(
        sink.publish(&route.temperature_topic, temperature),
        sink.publish(&route.humidity_topic, humidity)
    );

    collect_outcomes([
        (route.temperature_topic.as_str(), temperature_outcome),
        (route.humidity_topic.as_str(), humidity_outcome),
    ])
}
