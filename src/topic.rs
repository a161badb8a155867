//! MQTT topic routing.

/// Path separator of broker-style topics.
pub const SEPARATOR: char = '/';

/// Last level of a discovery config topic.
pub const CONFIG_SUFFIX: &str = "config";

/// State topics the temperature and humidity values are published to.
///
/// When both topics are the same a single combined message is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRoute {
    pub temperature_topic: String,
    pub humidity_topic: String,
}

impl TopicRoute {
    pub fn new(temperature_topic: impl Into<String>, humidity_topic: impl Into<String>) -> Self {
        Self {
            temperature_topic: temperature_topic.into(),
            humidity_topic: humidity_topic.into(),
        }
    }

    /// A route publishing both values to the same topic.
    pub fn combined(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            temperature_topic: topic.clone(),
            humidity_topic: topic,
        }
    }

    /// True when both values go out in one message.
    pub fn is_combined(&self) -> bool {
        self.temperature_topic == self.humidity_topic
    }
}

/// Resolve the discovery config topic below `base_topic`.
///
/// A trailing separator is added only when missing, so `a/b` and `a/b/` both
/// resolve to `a/b/config`.
///
/// ```
/// use dht_mqtt::topic::config_topic;
///
/// assert_eq!(
///     config_topic("homeassistant/sensor/temp"),
///     "homeassistant/sensor/temp/config"
/// );
/// ```
pub fn config_topic(base_topic: &str) -> String {
    let mut topic = String::with_capacity(base_topic.len() + CONFIG_SUFFIX.len() + 1);
    topic.push_str(base_topic);
    if !topic.ends_with(SEPARATOR) {
        topic.push(SEPARATOR);
    }
    topic.push_str(CONFIG_SUFFIX);
    topic
}
