use crate::BoxFuture;
use crate::logger::Logger;
use crate::publisher::{MessageSink, TransportError};
use crate::reading::Reading;
use crate::sensor::{SensorError, SensorSource};
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;

/// A sensor replaying a fixed list of results.
///
/// Once the script runs out the fallback result is returned forever.
pub struct ScriptedSensor {
    script: VecDeque<Result<Reading, SensorError>>,
    fallback: Result<Reading, SensorError>,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<Reading, SensorError>>) -> Self {
        Self {
            script: script.into(),
            fallback: Err(SensorError::Timeout),
        }
    }

    pub fn always(result: Result<Reading, SensorError>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: result,
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn read(&mut self) -> BoxFuture<'_, Result<Reading, SensorError>> {
        let result = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move { result })
    }
}

/// A message accepted by [`RecordingSink`].
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Tokio clock time of the publish call
    pub at: Instant,
}

impl RecordedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap()
    }
}

/// A sink that records accepted messages and rejects configured topics.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<RecordedMessage>>,
    failing: HashSet<String>,
    attempts: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every publish on `topic` with `TransportError::NotConnected`.
    pub fn failing_on(mut self, topic: &str) -> Self {
        self.failing.insert(topic.to_string());
        self
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Publish calls, accepted or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl MessageSink for RecordingSink {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(topic) {
                return Err(TransportError::NotConnected);
            }
            self.messages.lock().unwrap().push(RecordedMessage {
                topic: topic.to_string(),
                payload,
                at: Instant::now(),
            });
            Ok(())
        })
    }
}

/// A logger keeping every message for assertions.
#[derive(Default)]
pub struct RecordingLogger {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }
}
