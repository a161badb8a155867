use clap::Parser;
use dht_mqtt::config::{Config, ConfigError};
use dht_mqtt::logger::{self, Logger, LoggerError, TracingLogger};
use dht_mqtt::mqtt;
use dht_mqtt::poller::Poller;
use dht_mqtt::sensor::iio::{IIO_DEVICES_DIR, IioSensor};
use dht_mqtt::sensor::SensorError;
use std::panic::{self, PanicHookInfo};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;

/// How long startup waits for the first CONNACK before polling anyway.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(author, about, version)]
struct Options {
    /// Path of the TOML configuration file.
    #[arg(short, long, default_value = "/etc/dht-mqtt/config.toml")]
    config: PathBuf,

    /// Console log filter, overrides RUST_LOG and the configured level.
    /// Example: --log-level dht_mqtt=debug
    #[arg(long)]
    log_level: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

/// Fatal errors before the poll loop starts.
#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Logger(#[from] LoggerError),
    #[error("Sensor setup failed: {0}")]
    Sensor(#[from] SensorError),
}

fn open_sensor(config: &Config) -> Result<IioSensor, SensorError> {
    let sensor = &config.sensor;
    match &sensor.device {
        Some(device) => Ok(IioSensor::new(
            device.clone(),
            sensor.sensor_type,
            sensor.temperature_unit,
        )),
        None => IioSensor::discover(
            Path::new(IIO_DEVICES_DIR),
            sensor.sensor_type,
            sensor.temperature_unit,
        ),
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Load configuration, wire the components and poll until a shutdown signal.
///
/// Configuration, logging and sensor setup errors are fatal. Once the loop is
/// running, sensor and broker faults are only logged.
async fn run(options: Options) -> Result<(), StartupError> {
    let config = Config::load(&options.config)?;
    let announcer = config.announcer()?;

    if options.check {
        println!("{}: configuration OK", options.config.display());
        return Ok(());
    }

    logger::init(&config.logging, options.log_level.as_deref())?;
    let logger = Arc::new(TracingLogger);

    let mut sensor = open_sensor(&config)?;
    logger.info(&format!(
        "Using {} sensor at {}",
        config.sensor.sensor_type,
        sensor.device().display()
    ));

    let interval = config.poll_interval();
    let min_period = config.sensor.sensor_type.min_sampling_period();
    if interval < min_period {
        logger.warn(&format!(
            "Poll interval {}s is shorter than the {} minimum of {}s; expect failed reads",
            interval.as_secs(),
            config.sensor.sensor_type,
            min_period.as_secs()
        ));
    }

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    logger.info(&format!(
        "Connecting to MQTT broker {}:{}",
        config.mqtt.host, config.mqtt.port
    ));
    let (sink, connection) = mqtt::connect(&config.mqtt);
    let connection_task = tokio::spawn(connection.run(cancel.clone(), logger.clone()));

    // Hold the first cycle until the broker has acknowledged us, so the first
    // reading and the cycle 0 discovery config are not dropped.
    match tokio::time::timeout(CONNECT_TIMEOUT, sink.wait_connected(&cancel)).await {
        Ok(true) => {}
        Ok(false) if cancel.is_cancelled() => {}
        Ok(false) | Err(_) => logger.warn(&format!(
            "MQTT broker not connected after {}s; starting anyway",
            CONNECT_TIMEOUT.as_secs()
        )),
    }

    logger.info("Starting measurement loop");
    let route = config.topic_route();
    let mut poller = Poller::new(
        &mut sensor,
        &sink,
        &route,
        &announcer,
        logger.as_ref(),
        interval,
    );
    let stats = poller.run(&cancel).await;

    logger.info(&format!(
        "Stopping after {} cycles ({} readings, {} sensor failures, {} publish failures)",
        stats.cycles, stats.readings, stats.sensor_failures, stats.publish_failures
    ));

    cancel.cancel();
    if let Err(error) = connection_task.await {
        logger.warn(&format!("MQTT task ended abnormally: {error}"));
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    match run(options).await {
        Ok(_) => std::process::exit(EXIT_SUCCESS),
        Err(why) => {
            eprintln!("error: {}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
