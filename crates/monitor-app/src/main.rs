use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use alphaess_client::AlphaEssClient;
use discovery::{list_systems, resolve_system};
use display::build_sinks;
use monitor_app::cli::USAGE;
use monitor_app::runtime::{
    display_task, format_systems, init_sinks, monitored_serial, present_once, supervise,
};
use monitor_app::{CliArgs, MonitorConfig};
use poller_actor::{ActorConfig, PollSample, PollerActor, PowerSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = CliArgs::parse(env::args().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = MonitorConfig::load_with_path(args.credentials.clone(), args.config.clone())
        .context("load config failed")?;

    if args.list_systems {
        config
            .validate_for_listing()
            .context("config validation failed")?;
        let client = AlphaEssClient::new(config.api.clone()).context("api client init failed")?;
        let systems = list_systems(&client)
            .await
            .context("fetch ess list failed")?;
        for line in format_systems(&systems) {
            println!("{line}");
        }
        return Ok(());
    }

    config.validate().context("config validation failed")?;
    let client = AlphaEssClient::new(config.api.clone()).context("api client init failed")?;

    let serial = monitored_serial(
        &config.serial_number,
        resolve_system(&client, &config.serial_number).await,
    )
    .context("serial number check failed")?;

    let source: Arc<dyn PowerSource> = Arc::new(client);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if args.once {
        return poll_once(&config, serial, source, shutdown_rx).await;
    }

    if let Some(listen) = &config.metrics_listen {
        install_metrics_exporter(listen)?;
    }

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let sinks = init_sinks(build_sinks(&config.panel));
    if sinks.is_empty() {
        anyhow::bail!("no output could be initialised");
    }
    let mut display_handle = tokio::spawn(display_task(rx, sinks, shutdown_rx.clone()));

    let spec = PollerSpec {
        serial,
        source,
        poller_config: config.poller.clone(),
        sender: tx,
        shutdown: shutdown_rx.clone(),
    };
    let supervisor = tokio::spawn(supervise(
        move || spec.clone().into_actor().run(),
        Duration::from_millis(config.respawn_delay_ms),
        shutdown_rx.clone(),
    ));

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    let shutdown_signal = shutdown_signal();
    tokio::pin!(shutdown_signal);
    let display_finished = tokio::select! {
        _ = &mut shutdown_signal => {
            info!("shutdown signal received");
            false
        }
        result = &mut display_handle => {
            if let Err(err) = result {
                warn!(error = %err, "display task failed");
            } else {
                warn!("display task ended");
            }
            true
        }
    };

    let _ = shutdown_tx.send(true);
    if let Err(err) = supervisor.await {
        warn!(error = %err, "poller supervisor join failed");
    }
    if !display_finished {
        let _ = display_handle.await;
    }
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

#[derive(Clone)]
struct PollerSpec {
    serial: String,
    source: Arc<dyn PowerSource>,
    poller_config: ActorConfig,
    sender: mpsc::Sender<PollSample>,
    shutdown: watch::Receiver<bool>,
}

impl PollerSpec {
    fn into_actor(self) -> PollerActor {
        PollerActor::new(
            self.serial,
            self.source,
            self.sender,
            self.shutdown,
            self.poller_config,
        )
    }
}

async fn poll_once(
    config: &MonitorConfig,
    serial: String,
    source: Arc<dyn PowerSource>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    // the actor needs a sender even though this sample is presented directly
    let (tx, _rx) = mpsc::channel(1);
    let actor = PollerActor::new(serial, source, tx, shutdown, config.poller.clone());
    let sample = actor.poll_once().await.context("poll failed")?;

    present_once(build_sinks(&config.panel), &sample)
}

fn install_metrics_exporter(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid metrics listen address {listen}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("metrics exporter install failed")?;

    metrics::describe_counter!("alphaess_polls_total", "Poll cycles started");
    metrics::describe_counter!("alphaess_poll_failures_total", "Poll cycles without a snapshot");
    metrics::describe_gauge!("alphaess_pv_watts", "Current PV production in watts");
    metrics::describe_gauge!("alphaess_battery_soc_percent", "Battery state of charge");
    metrics::describe_gauge!("alphaess_battery_watts", "Battery power, negative while charging");
    metrics::describe_gauge!("alphaess_grid_watts", "Grid power, negative while feeding in");
    metrics::describe_gauge!("alphaess_load_watts", "Household load in watts");

    info!(%addr, "metrics exporter listening");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler install failed");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
