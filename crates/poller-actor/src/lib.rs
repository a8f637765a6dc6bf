use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use alphaess_client::{AlphaEssClient, ClientError};
use types::{DailyEnergy, PowerSnapshot};

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    pub jitter_ms: u64,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("power data fetch failed: {0}")]
    Fetch(#[from] ClientError),
    #[error("sample channel closed")]
    ChannelClosed,
}

/// Where the actor gets its readings from.
#[async_trait]
pub trait PowerSource: Send + Sync {
    async fn last_power_data(&self, serial: &str) -> Result<PowerSnapshot, ClientError>;

    async fn one_date_energy(&self, serial: &str, date: &str) -> Result<DailyEnergy, ClientError>;
}

#[async_trait]
impl PowerSource for AlphaEssClient {
    async fn last_power_data(&self, serial: &str) -> Result<PowerSnapshot, ClientError> {
        self.get_last_power_data(serial).await
    }

    async fn one_date_energy(&self, serial: &str, date: &str) -> Result<DailyEnergy, ClientError> {
        self.get_one_date_energy(serial, date).await
    }
}

#[derive(Debug, Clone)]
pub struct PollSample {
    pub serial: String,
    pub snapshot: PowerSnapshot,
    /// Absent when today's totals could not be fetched this cycle.
    pub energy: Option<DailyEnergy>,
    pub collected_at: DateTime<Local>,
}

/// Polls one system at a fixed interval and forwards every reading.
pub struct PollerActor {
    serial: String,
    source: Arc<dyn PowerSource>,
    sender: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl PollerActor {
    pub fn new(
        serial: impl Into<String>,
        source: Arc<dyn PowerSource>,
        sender: mpsc::Sender<PollSample>,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            serial: serial.into(),
            source,
            sender,
            shutdown,
            config,
        }
    }

    /// Fetches the latest snapshot together with today's totals.
    ///
    /// Only a failed snapshot fails the poll; missing totals leave `energy`
    /// empty.
    pub async fn poll_once(&self) -> Result<PollSample, PollerError> {
        let collected_at = Local::now();
        let date = collected_at.format("%Y-%m-%d").to_string();

        let (snapshot, energy) = tokio::join!(
            self.source.last_power_data(&self.serial),
            self.source.one_date_energy(&self.serial, &date),
        );
        let snapshot = snapshot?;
        let energy = match energy {
            Ok(energy) => Some(energy),
            Err(err) => {
                warn!(serial = %self.serial, date = %date, error = %err, "daily energy fetch failed");
                None
            }
        };

        record_snapshot(&self.serial, &snapshot);
        Ok(PollSample {
            serial: self.serial.clone(),
            snapshot,
            energy,
            collected_at,
        })
    }

    /// Polls until shutdown is requested. Returns `ChannelClosed` when the
    /// consumer goes away first.
    pub async fn run(mut self) -> Result<(), PollerError> {
        let mut iteration = 0u64;
        let mut consecutive_failures = 0u64;

        loop {
            if *self.shutdown.borrow() {
                info!(serial = %self.serial, "poller shutdown requested");
                break;
            }

            let cycle_start = Instant::now();
            counter!("alphaess_polls_total", "serial" => self.serial.clone()).increment(1);

            match self.poll_once().await {
                Ok(sample) => {
                    consecutive_failures = 0;
                    if self.sender.send(sample).await.is_err() {
                        if *self.shutdown.borrow() {
                            break;
                        }
                        warn!(serial = %self.serial, "sample channel closed, poller stopping");
                        return Err(PollerError::ChannelClosed);
                    }
                }
                Err(err) => {
                    consecutive_failures += 1;
                    counter!("alphaess_poll_failures_total", "serial" => self.serial.clone())
                        .increment(1);
                    warn!(
                        serial = %self.serial,
                        consecutive_failures,
                        error = %err,
                        "poll failed, keeping previous reading"
                    );
                }
            }

            iteration = iteration.wrapping_add(1);
            let elapsed = cycle_start.elapsed();
            let lag = elapsed.saturating_sub(self.config.poll_interval);
            let delay = jittered_delay(self.config.poll_interval, self.config.jitter_ms, iteration);
            info!(
                serial = %self.serial,
                elapsed_ms = elapsed.as_millis(),
                lag_ms = lag.as_millis(),
                consecutive_failures,
                delay_ms = delay.as_millis(),
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(delay) => {},
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!(serial = %self.serial, "poller shutdown requested");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

fn record_snapshot(serial: &str, snapshot: &PowerSnapshot) {
    let readings = [
        ("alphaess_pv_watts", snapshot.ppv),
        ("alphaess_battery_soc_percent", snapshot.soc),
        ("alphaess_battery_watts", snapshot.pbat),
        ("alphaess_grid_watts", snapshot.pgrid),
        ("alphaess_load_watts", snapshot.pload),
    ];
    for (name, value) in readings {
        if let Some(value) = value {
            gauge!(name, "serial" => serial.to_string()).set(value);
        }
    }
    debug!(serial, "snapshot recorded");
}

fn jittered_delay(base: Duration, jitter_ms: u64, iteration: u64) -> Duration {
    if jitter_ms == 0 {
        return base;
    }

    let jitter_window = jitter_ms.max(1);
    let seed = unix_ms().wrapping_add(iteration.wrapping_mul(1_664_525));
    let offset = seed % jitter_window;
    base + Duration::from_millis(offset)
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_window() {
        let base = Duration::from_millis(1_000);
        assert_eq!(jittered_delay(base, 0, 7), base);
        for iteration in 0..50 {
            let delay = jittered_delay(base, 250, iteration);
            assert!(delay >= base);
            assert!(delay < base + Duration::from_millis(250));
        }
    }
}
