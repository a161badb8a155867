//! Configuration file loading and validation.
//!
//! The daemon is configured from a single TOML file (see `config.example.toml`).
//! Structural limits are checked with `validator`; rules spanning several
//! fields are checked afterwards. Every error here is fatal at startup, so the
//! poll loop only ever sees valid values.

use crate::announce::{AnnounceError, AnnouncePolicy, Announcer, ConfigPayload, Discovery};
use crate::reading::TemperatureUnit;
use crate::sensor::SensorType;
use crate::topic::TopicRoute;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Topic names the daemon publishes state for.
pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";

/// Errors loading the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Invalid discovery configuration: {0}")]
    Announce(#[from] AnnounceError),
}

fn default_interval() -> u64 {
    2
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "dht-mqtt".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_capacity() -> usize {
    10
}

fn default_level() -> String {
    "info".to_string()
}

fn default_discovery_topics() -> Vec<String> {
    vec![TEMPERATURE.to_string(), HUMIDITY.to_string()]
}

/// `[sensor]` section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SensorConfig {
    #[serde(rename = "type")]
    pub sensor_type: SensorType,
    /// IIO device directory; discovered when absent
    pub device: Option<PathBuf>,
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    /// Seconds between measurement cycles
    #[serde(default = "default_interval")]
    #[validate(range(min = 1))]
    pub interval: u64,
}

/// `[mqtt]` section.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MqttConfig {
    #[validate(length(min = 1, max = 255))]
    pub host: String,
    #[serde(default = "default_port")]
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default = "default_client_id")]
    #[validate(length(min = 1, max = 36))]
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Keep-alive in seconds
    #[serde(default = "default_keep_alive")]
    #[validate(range(min = 5, max = 3600))]
    pub keep_alive: u64,
    #[serde(default)]
    #[validate(range(max = 2))]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Requests the client may queue before publish calls wait
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1))]
    pub capacity: usize,
}

/// One `[topics.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    pub state_topic: String,
    /// Discovery base topic; config goes to `<base_topic>/config`
    pub base_topic: Option<String>,
    /// Flat discovery payload
    #[serde(default)]
    pub discovery: ConfigPayload,
}

/// `[discovery]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Republish discovery config every N cycles; absent disables it
    pub repeat_every: Option<u64>,
    #[serde(default = "default_discovery_topics")]
    pub topics: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            repeat_every: None,
            topics: default_discovery_topics(),
        }
    }
}

/// Console log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

/// `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter, `tracing` directive syntax
    pub level: String,
    pub format: LogFormat,
    /// Optional log file, appended to
    pub file: Option<PathBuf>,
    pub file_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
            file_level: default_level(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub sensor: SensorConfig,
    #[validate(nested)]
    pub mqtt: MqttConfig,
    pub topics: BTreeMap<String, TopicConfig>,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        config.check()?;
        Ok(config)
    }

    fn topic(&self, name: &str) -> Result<&TopicConfig, ConfigError> {
        self.topics
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("missing [topics.{name}] section")))
    }

    fn check(&self) -> Result<(), ConfigError> {
        for name in [TEMPERATURE, HUMIDITY] {
            if self.topic(name)?.state_topic.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "topics.{name}.state_topic must not be empty"
                )));
            }
        }

        if self.mqtt.username.is_some() != self.mqtt.password.is_some() {
            return Err(ConfigError::Invalid(
                "mqtt.username and mqtt.password must be set together".to_string(),
            ));
        }

        match self.discovery.repeat_every {
            None => {}
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "discovery.repeat_every must be greater than 0".to_string(),
                ));
            }
            Some(_) => {
                for name in &self.discovery.topics {
                    let topic = self.topic(name)?;
                    if topic.base_topic.as_deref().is_none_or(str::is_empty) {
                        return Err(ConfigError::Invalid(format!(
                            "topics.{name}.base_topic is required for discovery"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sensor.interval)
    }

    pub fn topic_route(&self) -> TopicRoute {
        let state_topic = |name: &str| {
            self.topics
                .get(name)
                .map(|topic| topic.state_topic.clone())
                .unwrap_or_default()
        };
        TopicRoute::new(state_topic(TEMPERATURE), state_topic(HUMIDITY))
    }

    pub fn announce_policy(&self) -> AnnouncePolicy {
        AnnouncePolicy::every(
            self.discovery.repeat_every.unwrap_or(0),
            self.discovery.topics.iter().cloned(),
        )
    }

    /// Discovery metadata of every topic with a base topic.
    ///
    /// Payloads without a `state_topic` key get the topic's state topic, which
    /// is what a discovery consumer needs to subscribe to.
    pub fn discovery_metadata(&self) -> HashMap<String, Discovery> {
        self.topics
            .iter()
            .filter_map(|(name, topic)| {
                let base_topic = topic.base_topic.clone()?;
                let mut payload = topic.discovery.clone();
                payload
                    .entry("state_topic")
                    .or_insert_with(|| topic.state_topic.clone().into());
                Some((name.clone(), Discovery { base_topic, payload }))
            })
            .collect()
    }

    pub fn announcer(&self) -> Result<Announcer, ConfigError> {
        Ok(Announcer::new(
            self.announce_policy(),
            &self.discovery_metadata(),
        )?)
    }
}
