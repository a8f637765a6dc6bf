use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, warn};

use discovery::DiscoveryError;
use display::{Report, Sink};
use poller_actor::{PollSample, PollerError};
use types::EssSystem;

/// Picks the serial to poll from the startup registration check.
///
/// A registered system is polled under its canonical serial. Configuration
/// errors are returned; any other failure falls back to the configured serial.
pub fn monitored_serial(
    configured: &str,
    resolved: Result<EssSystem, DiscoveryError>,
) -> Result<String, DiscoveryError> {
    match resolved {
        Ok(system) => {
            info!(
                serial = %system.sys_sn,
                inverter = system.minv.as_deref().unwrap_or("-"),
                "monitoring system"
            );
            Ok(system.sys_sn)
        }
        Err(err) if err.is_configuration() => Err(err),
        Err(err) => {
            warn!(serial = %configured, error = %err, "serial number check skipped");
            Ok(configured.trim().to_string())
        }
    }
}

/// Runs the poller produced by `start` and starts a fresh one after
/// `respawn_delay` whenever it exits, until shutdown is requested.
pub async fn supervise<F, Fut>(
    mut start: F,
    respawn_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<(), PollerError>> + Send + 'static,
{
    let mut join_set = JoinSet::new();
    join_set.spawn(start());

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            maybe_result = join_set.join_next() => {
                match maybe_result {
                    Some(Ok(Ok(()))) => info!("poller exited cleanly"),
                    Some(Ok(Err(err))) => warn!(error = %err, "poller exited with error"),
                    Some(Err(err)) => warn!(error = %err, "poller task failed"),
                    None => break,
                }
                if *shutdown.borrow() {
                    break;
                }
                let poller = start();
                join_set.spawn(async move {
                    sleep(respawn_delay).await;
                    poller.await
                });
            }
        }
    }

    join_set.abort_all();
    while let Some(result) = join_set.join_next().await {
        if let Err(err) = result {
            if !err.is_cancelled() {
                warn!(error = %err, "poller task join failed");
            }
        }
    }
}

/// Presents a single sample, failing when no output could be prepared.
pub fn present_once(sinks: Vec<Box<dyn Sink>>, sample: &PollSample) -> Result<()> {
    let mut sinks = init_sinks(sinks);
    if sinks.is_empty() {
        anyhow::bail!("no output could be initialised");
    }
    present_sample(&mut sinks, sample);
    Ok(())
}

/// Prepares every sink; a sink that fails to initialise is dropped.
pub fn init_sinks(sinks: Vec<Box<dyn Sink>>) -> Vec<Box<dyn Sink>> {
    sinks
        .into_iter()
        .filter_map(|mut sink| match sink.init() {
            Ok(()) => Some(sink),
            Err(err) => {
                warn!(sink = sink.name(), error = %err, "sink init failed, disabling");
                None
            }
        })
        .collect()
}

pub fn present_sample(sinks: &mut [Box<dyn Sink>], sample: &PollSample) {
    let report = Report::build(&sample.snapshot, sample.energy.as_ref(), sample.collected_at);
    for sink in sinks.iter_mut() {
        if let Err(err) = sink.present(&report) {
            warn!(sink = sink.name(), serial = %sample.serial, error = %err, "sink present failed");
        }
    }
}

/// Shows every sample that arrives until the channel closes or shutdown is
/// requested.
pub async fn display_task(
    mut rx: mpsc::Receiver<PollSample>,
    mut sinks: Vec<Box<dyn Sink>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_sample = rx.recv() => {
                match maybe_sample {
                    Some(sample) => present_sample(&mut sinks, &sample),
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("display shutdown requested");
                    break;
                }
            }
        }
    }
}

/// One line per registered system for `--list-systems`.
pub fn format_systems(systems: &[EssSystem]) -> Vec<String> {
    systems
        .iter()
        .map(|system| {
            format!(
                "{}  inverter={} battery={} kWh pv={} kWp",
                system.sys_sn,
                system.minv.as_deref().unwrap_or("-"),
                display::format_value(system.cobat),
                display::format_value(system.popv),
            )
        })
        .collect()
}
