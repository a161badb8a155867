//! Periodic discovery announcements.
//!
//! Home Assistant style discovery: each configured topic has a base topic and a
//! flat config payload which is published to `<base_topic>/config`. Publishing
//! it again every N cycles lets a hub that restarted (and lost its retained
//! state) pick the sensor up again without a reconnect hook.

use crate::logger::Logger;
use crate::publisher::{MessageSink, PublishError, collect_outcomes};
use crate::topic::config_topic;
use std::collections::HashMap;
use std::num::NonZeroU64;
use thiserror::Error;

/// Discovery config body, published as a flat JSON object.
pub type ConfigPayload = serde_json::Map<String, serde_json::Value>;

/// When and for which topics discovery config is (re)published.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnnouncePolicy {
    /// Announce every `interval` cycles; `None` disables announcements
    pub interval: Option<NonZeroU64>,
    /// Topic names to announce, in publish order
    pub topics: Vec<String>,
}

impl AnnouncePolicy {
    /// A policy that never announces.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Announce `topics` every `interval` cycles, starting with cycle 0.
    /// An interval of zero disables announcements.
    pub fn every(interval: u64, topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            interval: NonZeroU64::new(interval),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether announcements fire on `cycle`.
    pub fn is_due(&self, cycle: u64) -> bool {
        self.interval
            .is_some_and(|interval| cycle % interval.get() == 0)
    }
}

/// Discovery metadata of one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub base_topic: String,
    pub payload: ConfigPayload,
}

/// Errors building an [`Announcer`].
#[derive(Error, Debug)]
pub enum AnnounceError {
    #[error("No discovery metadata for topic '{0}'")]
    UnknownTopic(String),
    #[error("Failed to encode discovery payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A resolved config topic with its encoded payload.
#[derive(Debug, Clone, PartialEq)]
struct Announcement {
    name: String,
    topic: String,
    payload: Vec<u8>,
}

/// Publishes discovery config according to an [`AnnouncePolicy`].
#[derive(Debug, Clone)]
pub struct Announcer {
    policy: AnnouncePolicy,
    announcements: Vec<Announcement>,
}

impl Announcer {
    /// Resolve config topics and encode payloads for every topic in `policy`.
    ///
    /// Nothing is resolved when the policy is disabled, so missing metadata is
    /// only an error for announcements that can actually fire.
    pub fn new(
        policy: AnnouncePolicy,
        metadata: &HashMap<String, Discovery>,
    ) -> Result<Self, AnnounceError> {
        let announcements = if policy.interval.is_some() {
            policy
                .topics
                .iter()
                .map(|name| -> Result<Announcement, AnnounceError> {
                    let discovery = metadata
                        .get(name)
                        .ok_or_else(|| AnnounceError::UnknownTopic(name.clone()))?;
                    Ok(Announcement {
                        name: name.clone(),
                        topic: config_topic(&discovery.base_topic),
                        payload: serde_json::to_vec(&discovery.payload)?,
                    })
                })
                .collect::<Result<Vec<_>, AnnounceError>>()?
        } else {
            Vec::new()
        };

        Ok(Self {
            policy,
            announcements,
        })
    }

    /// An announcer that never fires.
    pub fn disabled() -> Self {
        Self {
            policy: AnnouncePolicy::disabled(),
            announcements: Vec::new(),
        }
    }

    pub fn policy(&self) -> &AnnouncePolicy {
        &self.policy
    }

    /// Resolved config topics, in publish order.
    pub fn config_topics(&self) -> impl Iterator<Item = &str> {
        self.announcements.iter().map(|a| a.topic.as_str())
    }

    /// Announce if `cycle` is due under the policy.
    ///
    /// Returns `Ok(true)` when an announcement went out, `Ok(false)` when none
    /// was due.
    pub async fn maybe_announce(
        &self,
        cycle: u64,
        sink: &dyn MessageSink,
        logger: &dyn Logger,
    ) -> Result<bool, PublishError> {
        if !self.policy.is_due(cycle) {
            return Ok(false);
        }
        self.announce(sink, logger).await?;
        Ok(true)
    }

    /// Publish every config payload in configured order.
    ///
    /// A failed topic does not stop the remaining ones.
    pub async fn announce(
        &self,
        sink: &dyn MessageSink,
        logger: &dyn Logger,
    ) -> Result<(), PublishError> {
        let mut outcomes = Vec::with_capacity(self.announcements.len());

        for announcement in &self.announcements {
            let outcome = sink
                .publish(&announcement.topic, announcement.payload.clone())
                .await;
            if outcome.is_ok() {
                logger.info(&format!(
                    "Published discovery config {} for {}",
                    announcement.topic, announcement.name
                ));
            }
            outcomes.push((announcement.topic.as_str(), outcome));
        }

        collect_outcomes(outcomes)
    }
}
