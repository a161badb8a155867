//! Temperature/humidity reading data structure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unit the temperature of a [`Reading`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    /// Degrees Celsius (what the sensor reports)
    #[default]
    #[serde(rename = "C", alias = "c")]
    Celsius,
    /// Degrees Fahrenheit
    #[serde(rename = "F", alias = "f")]
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a Celsius value into this unit.
    #[inline]
    pub fn from_celsius(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * (9.0 / 5.0) + 32.0,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Celsius => write!(f, "C"),
            TemperatureUnit::Fahrenheit => write!(f, "F"),
        }
    }
}

impl FromStr for TemperatureUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "C" => Ok(TemperatureUnit::Celsius),
            "F" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(format!("Unsupported temperature unit \"{}\"", s)),
        }
    }
}

/// A single temperature + humidity sample.
///
/// Produced once per poll cycle and handed to the publisher by reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Temperature in `unit`
    pub temperature: f64,
    /// Relative humidity in percent (0-100)
    pub humidity: f64,
    /// Unit of `temperature`
    pub unit: TemperatureUnit,
}

impl Reading {
    /// Build a reading from a raw Celsius sample, converting to `unit`.
    pub fn from_celsius(celsius: f64, humidity: f64, unit: TemperatureUnit) -> Self {
        Self {
            temperature: unit.from_celsius(celsius),
            humidity,
            unit,
        }
    }
}
