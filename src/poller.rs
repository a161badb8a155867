//! Core measurement loop.
//!
//! Each cycle reads the sensor, publishes the reading, checks whether discovery
//! config is due, then sleeps for the poll interval. Faults are handled at the
//! cycle boundary: they are logged and the loop carries on, so the daemon keeps
//! running through sensor glitches and broker outages. The loop only stops when
//! its cancellation token fires.

use crate::announce::Announcer;
use crate::logger::Logger;
use crate::publisher::{self, MessageSink};
use crate::sensor::SensorSource;
use crate::topic::TopicRoute;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Counters describing what a [`Poller`] has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Cycles started
    pub cycles: u64,
    /// Successful sensor reads
    pub readings: u64,
    /// Failed sensor reads
    pub sensor_failures: u64,
    /// Readings whose publication failed on at least one topic
    pub publish_failures: u64,
    /// Announcements where at least one config message was accepted
    pub announcements: u64,
}

/// Drives the read → publish → announce → sleep cycle.
pub struct Poller<'a> {
    source: &'a mut dyn SensorSource,
    sink: &'a dyn MessageSink,
    route: &'a TopicRoute,
    announcer: &'a Announcer,
    logger: &'a dyn Logger,
    interval: Duration,
    cycle: u64,
    stats: PollStats,
}

impl<'a> Poller<'a> {
    pub fn new(
        source: &'a mut dyn SensorSource,
        sink: &'a dyn MessageSink,
        route: &'a TopicRoute,
        announcer: &'a Announcer,
        logger: &'a dyn Logger,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            route,
            announcer,
            logger,
            interval,
            cycle: 0,
            stats: PollStats::default(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> PollStats {
        self.stats
    }

    /// Run until `cancel` fires.
    pub async fn run(&mut self, cancel: &CancellationToken) -> PollStats {
        self.run_until(cancel, None).await
    }

    /// Run at most `cycles` cycles, or until `cancel` fires.
    ///
    /// There is no sleep after the last cycle.
    pub async fn run_cycles(&mut self, cycles: u64, cancel: &CancellationToken) -> PollStats {
        self.run_until(cancel, Some(cycles)).await
    }

    async fn run_until(&mut self, cancel: &CancellationToken, limit: Option<u64>) -> PollStats {
        let mut remaining = limit;

        while !cancel.is_cancelled() && remaining != Some(0) {
            self.run_cycle().await;
            remaining = remaining.map(|n| n - 1);

            if remaining == Some(0) {
                break;
            }

            // The interval starts after the cycle's work; drift is not corrected.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.stats
    }

    /// Execute one cycle. Never fails: every fault is logged and counted.
    pub async fn run_cycle(&mut self) {
        let cycle = self.cycle;
        self.cycle += 1;
        self.stats.cycles += 1;

        match self.source.read().await {
            Ok(reading) => {
                self.stats.readings += 1;
                self.logger.info(&format!(
                    "New measurement: temperature={}{}, humidity={}%",
                    reading.temperature, reading.unit, reading.humidity
                ));

                if let Err(error) = publisher::publish(&reading, self.route, self.sink).await {
                    self.stats.publish_failures += 1;
                    self.logger
                        .warn(&format!("Publishing measurement failed: {error}"));
                }
            }
            Err(error) => {
                self.stats.sensor_failures += 1;
                self.logger
                    .warn(&format!("DHT measurement failed: {error}"));
            }
        }

        match self
            .announcer
            .maybe_announce(cycle, self.sink, self.logger)
            .await
        {
            Ok(true) => self.stats.announcements += 1,
            Ok(false) => {}
            Err(error) => {
                if error.failures().len() < self.announcer.config_topics().count() {
                    self.stats.announcements += 1;
                }
                self.logger
                    .warn(&format!("Publishing discovery config failed: {error}"));
            }
        }
    }
}
