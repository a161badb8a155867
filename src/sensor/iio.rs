//! Linux IIO backend for DHT11/DHT22 sensors.
//!
//! The kernel `dht11` driver (which also handles the DHT22/AM2302) does the
//! timing-sensitive GPIO protocol and exposes the decoded values through sysfs.
//! Enable it on a Raspberry Pi with `dtoverlay=dht11,gpiopin=4`.

use super::{SensorError, SensorSource, SensorType};
use crate::BoxFuture;
use crate::reading::{Reading, TemperatureUnit};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where the kernel lists IIO devices.
pub const IIO_DEVICES_DIR: &str = "/sys/bus/iio/devices";

/// Name the kernel driver reports for both DHT11 and DHT22.
const DRIVER_NAME: &str = "dht11";

/// Temperature channel, milli-degrees Celsius
const TEMPERATURE_FILE: &str = "in_temp_input";

/// Humidity channel, milli-percent relative humidity
const HUMIDITY_FILE: &str = "in_humidityrelative_input";

/// Linux errno the driver returns for a corrupted frame.
const EIO: i32 = 5;

/// A DHT sensor read through the kernel IIO interface.
#[derive(Debug, Clone)]
pub struct IioSensor {
    device: PathBuf,
    sensor_type: SensorType,
    unit: TemperatureUnit,
}

impl IioSensor {
    /// Use the IIO device directory at `device`.
    pub fn new(device: impl Into<PathBuf>, sensor_type: SensorType, unit: TemperatureUnit) -> Self {
        Self {
            device: device.into(),
            sensor_type,
            unit,
        }
    }

    /// Find the first device under `root` whose driver is `dht11`.
    ///
    /// Devices are tried in path order so the choice is stable across boots
    /// with the same overlay configuration.
    pub fn discover(
        root: &Path,
        sensor_type: SensorType,
        unit: TemperatureUnit,
    ) -> Result<Self, SensorError> {
        let mut devices: Vec<PathBuf> = fs::read_dir(root)
            .map_err(|e| SensorError::Io(format!("{}: {}", root.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        devices.sort();

        devices
            .into_iter()
            .find(|device| {
                fs::read_to_string(device.join("name"))
                    .is_ok_and(|name| name.trim() == DRIVER_NAME)
            })
            .map(|device| Self::new(device, sensor_type, unit))
            .ok_or_else(|| {
                SensorError::Io(format!(
                    "no {} IIO device found under {}",
                    DRIVER_NAME,
                    root.display()
                ))
            })
    }

    /// The IIO device directory in use.
    pub fn device(&self) -> &Path {
        &self.device
    }

    async fn read_reading(&self) -> Result<Reading, SensorError> {
        // Each sysfs read triggers a fresh measurement in the driver; the
        // driver caches the result for about 2 seconds so both channels come
        // from the same frame.
        let celsius = read_milli(&self.device.join(TEMPERATURE_FILE)).await?;
        let humidity = read_milli(&self.device.join(HUMIDITY_FILE)).await?;

        self.sensor_type.check_range(celsius, humidity)?;

        Ok(Reading::from_celsius(celsius, humidity, self.unit))
    }
}

impl SensorSource for IioSensor {
    fn read(&mut self) -> BoxFuture<'_, Result<Reading, SensorError>> {
        Box::pin(self.read_reading())
    }
}

/// Read a sysfs channel holding a value scaled by 1000.
async fn read_milli(path: &Path) -> Result<f64, SensorError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(map_io_error)?;

    let value: i64 = raw.trim().parse().map_err(|_| {
        SensorError::InvalidData(format!("{}: {:?}", path.display(), raw.trim()))
    })?;

    Ok(value as f64 / 1000.0)
}

fn map_io_error(err: io::Error) -> SensorError {
    if err.kind() == io::ErrorKind::TimedOut {
        SensorError::Timeout
    } else if err.raw_os_error() == Some(EIO) {
        SensorError::Checksum
    } else {
        SensorError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_device(root: &Path, name: &str, driver: &str) -> PathBuf {
        let device = root.join(name);
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("name"), format!("{driver}\n")).unwrap();
        device
    }

    fn write_channels(device: &Path, temperature: &str, humidity: &str) {
        fs::write(device.join(TEMPERATURE_FILE), temperature).unwrap();
        fs::write(device.join(HUMIDITY_FILE), humidity).unwrap();
    }

    #[tokio::test]
    async fn test_read_scales_milli_values() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");
        write_channels(&device, "21300\n", "45600\n");

        let mut sensor = IioSensor::new(&device, SensorType::Dht22, TemperatureUnit::Celsius);
        let reading = sensor.read().await.unwrap();

        assert!((reading.temperature - 21.3).abs() < 1e-9);
        assert!((reading.humidity - 45.6).abs() < 1e-9);
        assert_eq!(reading.unit, TemperatureUnit::Celsius);
    }

    #[tokio::test]
    async fn test_read_converts_to_fahrenheit() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");
        write_channels(&device, "20000", "50000");

        let mut sensor = IioSensor::new(&device, SensorType::Dht22, TemperatureUnit::Fahrenheit);
        let reading = sensor.read().await.unwrap();

        assert!((reading.temperature - 68.0).abs() < 1e-9);
        assert!((reading.humidity - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_read_negative_temperature() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");
        write_channels(&device, "-12500", "80000");

        let mut sensor = IioSensor::new(&device, SensorType::Dht22, TemperatureUnit::Celsius);
        let reading = sensor.read().await.unwrap();

        assert!((reading.temperature + 12.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_read_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");
        write_channels(&device, "not-a-number", "50000");

        let mut sensor = IioSensor::new(&device, SensorType::Dht22, TemperatureUnit::Celsius);
        assert!(matches!(
            sensor.read().await,
            Err(SensorError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_read_rejects_out_of_range() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");
        write_channels(&device, "60000", "50000");

        let mut sensor = IioSensor::new(&device, SensorType::Dht11, TemperatureUnit::Celsius);
        assert!(matches!(
            sensor.read().await,
            Err(SensorError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_missing_channel_is_io_error() {
        let dir = TempDir::new().unwrap();
        let device = fake_device(dir.path(), "iio:device0", "dht11");

        let mut sensor = IioSensor::new(&device, SensorType::Dht22, TemperatureUnit::Celsius);
        assert!(matches!(sensor.read().await, Err(SensorError::Io(_))));
    }

    #[test]
    fn test_discover_picks_first_dht_device() {
        let dir = TempDir::new().unwrap();
        fake_device(dir.path(), "iio:device0", "rpi-adc");
        let expected = fake_device(dir.path(), "iio:device1", "dht11");
        fake_device(dir.path(), "iio:device2", "dht11");

        let sensor =
            IioSensor::discover(dir.path(), SensorType::Dht22, TemperatureUnit::Celsius).unwrap();
        assert_eq!(sensor.device(), expected.as_path());
    }

    #[test]
    fn test_discover_without_device_fails() {
        let dir = TempDir::new().unwrap();
        fake_device(dir.path(), "iio:device0", "rpi-adc");

        let err = IioSensor::discover(dir.path(), SensorType::Dht22, TemperatureUnit::Celsius)
            .unwrap_err();
        assert!(err.to_string().contains("no dht11 IIO device"));
    }

    #[test]
    fn test_map_io_error() {
        assert_eq!(
            map_io_error(io::Error::from(io::ErrorKind::TimedOut)),
            SensorError::Timeout
        );
        assert_eq!(
            map_io_error(io::Error::from_raw_os_error(EIO)),
            SensorError::Checksum
        );
        assert!(matches!(
            map_io_error(io::Error::from(io::ErrorKind::NotFound)),
            SensorError::Io(_)
        ));
    }
}
