//! Sensor abstraction for DHT11/DHT22 devices.
//!
//! The poll loop only knows the [`SensorSource`] capability. Hardware access is
//! provided by adapters such as the Linux IIO backend in [`iio`].

pub mod iio;

use crate::BoxFuture;
use crate::reading::Reading;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;
use thiserror::Error;

/// Recoverable errors from a single sensor read.
///
/// None of these are fatal: the poller logs them and tries again next cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    /// The sensor did not answer in time
    #[error("Timed out waiting for the sensor")]
    Timeout,
    /// The sensor frame did not pass the checksum
    #[error("Checksum did not validate")]
    Checksum,
    /// I/O error talking to the driver
    #[error("I/O error: {0}")]
    Io(String),
    /// The driver returned something that is not a number
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Decoded value is outside what the sensor can physically measure
    #[error("{quantity} {value} outside the {sensor} range")]
    OutOfRange {
        sensor: SensorType,
        quantity: &'static str,
        value: f64,
    },
}

/// Supported sensor models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorType {
    #[serde(rename = "DHT11", alias = "dht11")]
    Dht11,
    #[serde(rename = "DHT22", alias = "dht22")]
    Dht22,
}

impl SensorType {
    /// Temperature range in Celsius the sensor is specified for.
    pub fn temperature_range(self) -> RangeInclusive<f64> {
        match self {
            SensorType::Dht11 => 0.0..=50.0,
            SensorType::Dht22 => -40.0..=80.0,
        }
    }

    /// Relative humidity range in percent the sensor is specified for.
    pub fn humidity_range(self) -> RangeInclusive<f64> {
        match self {
            SensorType::Dht11 => 20.0..=90.0,
            SensorType::Dht22 => 0.0..=100.0,
        }
    }

    /// Shortest period between two reads the sensor supports.
    pub fn min_sampling_period(self) -> Duration {
        match self {
            SensorType::Dht11 => Duration::from_secs(1),
            SensorType::Dht22 => Duration::from_secs(2),
        }
    }

    /// Reject a raw Celsius/percent sample the sensor cannot have produced.
    pub fn check_range(self, celsius: f64, humidity: f64) -> Result<(), SensorError> {
        if !self.temperature_range().contains(&celsius) {
            return Err(SensorError::OutOfRange {
                sensor: self,
                quantity: "temperature",
                value: celsius,
            });
        }
        if !self.humidity_range().contains(&humidity) {
            return Err(SensorError::OutOfRange {
                sensor: self,
                quantity: "humidity",
                value: humidity,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorType::Dht11 => write!(f, "DHT11"),
            SensorType::Dht22 => write!(f, "DHT22"),
        }
    }
}

impl std::str::FromStr for SensorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DHT11" => Ok(SensorType::Dht11),
            "DHT22" => Ok(SensorType::Dht22),
            _ => Err("The supported sensors are DHT11 and DHT22".to_string()),
        }
    }
}

/// Capability to take one temperature/humidity reading.
///
/// Implemented by hardware adapters; the poller depends only on this trait so it
/// can be driven by scripted sources in tests.
pub trait SensorSource: Send {
    fn read(&mut self) -> BoxFuture<'_, Result<Reading, SensorError>>;
}
