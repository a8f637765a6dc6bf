use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use alphaess_client::ClientConfig;
use display::PanelConfig;
use poller_actor::ActorConfig;

use crate::credentials::{load_credentials, Credentials, CREDENTIALS_FILE};

const DEFAULT_CHANNEL_CAPACITY: usize = 16;
const DEFAULT_RESPAWN_DELAY_MS: u64 = 5_000;
const SERIAL_PREFIX: &str = "AL";

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub api: ClientConfig,
    pub serial_number: String,
    pub poller: ActorConfig,
    pub panel: PanelConfig,
    pub channel_capacity: usize,
    pub respawn_delay_ms: u64,
    pub metrics_listen: Option<String>,
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None, None)
    }

    /// Layers defaults, the credentials file, an optional settings file and
    /// environment overrides, in increasing precedence.
    pub fn load_with_path(
        credentials_path: Option<String>,
        config_path: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        if let Some(credentials) = load_credentials_file(credentials_path)? {
            config.apply_credentials(credentials);
        }

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_credentials(&mut self, credentials: Credentials) {
        self.api.base_url = credentials.base_url;
        self.api.app_id = credentials.app_id;
        self.api.app_secret = credentials.app_secret;
        self.serial_number = credentials.serial_number;
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_for_listing()?;
        validate_serial(&self.serial_number)?;
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("runtime.channel_capacity must be >= 1");
        }
        if self.respawn_delay_ms == 0 {
            anyhow::bail!("runtime.respawn_delay_ms must be >= 1");
        }
        if !self.panel.console && self.panel.frame_path.is_none() {
            anyhow::bail!("panel needs console output or a frame_path");
        }
        if let Some(ref listen) = self.metrics_listen {
            listen
                .parse::<SocketAddr>()
                .with_context(|| format!("runtime.metrics_listen must be host:port, got {listen}"))?;
        }

        Ok(())
    }

    /// Checks only what is needed to call the API, so systems can be listed
    /// before a serial number is known.
    pub fn validate_for_listing(&self) -> Result<()> {
        let url = Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a valid URL: {}", self.api.base_url))?;
        match url.scheme() {
            "https" => {}
            "http" => warn!(base_url = %self.api.base_url, "api.base_url is not HTTPS"),
            other => anyhow::bail!("api.base_url scheme must be http or https, got {other}"),
        }
        if self.api.app_id.trim().is_empty() {
            anyhow::bail!("api.app_id must be non-empty");
        }
        if self.api.app_secret.trim().is_empty() {
            anyhow::bail!("api.app_secret must be non-empty");
        }
        if self.api.timeout_ms == 0 {
            anyhow::bail!("api.timeout_ms must be >= 1");
        }
        if self.api.retry_backoff_ms == 0 {
            anyhow::bail!("api.retry_backoff_ms must be >= 1");
        }
        if self.api.retry_max_backoff_ms == 0 {
            anyhow::bail!("api.retry_max_backoff_ms must be >= 1");
        }

        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api: ClientConfig::default(),
            serial_number: String::new(),
            poller: ActorConfig::default(),
            panel: PanelConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            respawn_delay_ms: DEFAULT_RESPAWN_DELAY_MS,
            metrics_listen: None,
        }
    }
}

fn load_credentials_file(credentials_path: Option<String>) -> Result<Option<Credentials>> {
    let explicit = credentials_path.or_else(|| env::var("ALPHAESS_CREDENTIALS").ok());
    let path = match explicit {
        Some(path) => PathBuf::from(path),
        None => {
            let default = PathBuf::from(CREDENTIALS_FILE);
            if !default.exists() {
                debug!(path = %default.display(), "no credentials file, relying on environment");
                return Ok(None);
            }
            default
        }
    };

    let credentials = load_credentials(&path)
        .with_context(|| format!("invalid credentials file {}", path.display()))?;
    Ok(Some(credentials))
}

fn apply_env_overrides(config: &mut MonitorConfig) {
    if let Ok(value) = env::var("ALPHAESS_BASE_URL") {
        config.api.base_url = value;
    }
    if let Ok(value) = env::var("ALPHAESS_APP_ID") {
        config.api.app_id = value;
    }
    if let Ok(value) = env::var("ALPHAESS_APP_SECRET") {
        config.api.app_secret = value;
    }
    if let Ok(value) = env::var("ALPHAESS_SERIAL") {
        config.serial_number = value;
    }

    if let Some(interval_ms) = parse_env_u64("ALPHAESS_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }
    if let Some(jitter_ms) = parse_env_u64("ALPHAESS_JITTER_MS") {
        config.poller.jitter_ms = jitter_ms;
    }
    if let Some(timeout_ms) = parse_env_u64("ALPHAESS_TIMEOUT_MS") {
        config.api.timeout_ms = timeout_ms;
    }
    if let Some(retry_count) = parse_env_usize("ALPHAESS_RETRY_COUNT") {
        config.api.retry_count = retry_count;
    }

    if let Ok(value) = env::var("ALPHAESS_FRAME_PATH") {
        config.panel.frame_path = Some(PathBuf::from(value));
    }
    if let Some(console) = parse_env_bool("ALPHAESS_CONSOLE") {
        config.panel.console = console;
    }

    config.metrics_listen = env::var("ALPHAESS_METRICS_LISTEN")
        .ok()
        .or(config.metrics_listen.take());
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    api: Option<FileApiConfig>,
    poller: Option<FilePollerConfig>,
    panel: Option<FilePanelConfig>,
    runtime: Option<FileRuntimeConfig>,
}

#[derive(Debug, Deserialize)]
struct FileApiConfig {
    base_url: Option<String>,
    app_id: Option<String>,
    app_secret: Option<String>,
    serial_number: Option<String>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    jitter_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FilePanelConfig {
    console: Option<bool>,
    frame_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FileRuntimeConfig {
    channel_capacity: Option<usize>,
    respawn_delay_ms: Option<u64>,
    metrics_listen: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("ALPHAESS_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut MonitorConfig, file: FileConfig) {
    if let Some(api) = file.api {
        if let Some(base_url) = api.base_url {
            config.api.base_url = base_url;
        }
        if let Some(app_id) = api.app_id {
            config.api.app_id = app_id;
        }
        if let Some(app_secret) = api.app_secret {
            config.api.app_secret = app_secret;
        }
        if let Some(serial) = api.serial_number {
            config.serial_number = serial;
        }
        if let Some(timeout_ms) = api.timeout_ms {
            config.api.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = api.retry_count {
            config.api.retry_count = retry_count;
        }
        if let Some(backoff) = api.retry_backoff_ms {
            config.api.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = api.retry_max_backoff_ms {
            config.api.retry_max_backoff_ms = max_backoff;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(jitter_ms) = poller.jitter_ms {
            config.poller.jitter_ms = jitter_ms;
        }
    }

    if let Some(panel) = file.panel {
        if let Some(console) = panel.console {
            config.panel.console = console;
        }
        if let Some(frame_path) = panel.frame_path {
            config.panel.frame_path = Some(frame_path);
        }
    }

    if let Some(runtime) = file.runtime {
        if let Some(capacity) = runtime.channel_capacity {
            config.channel_capacity = capacity;
        }
        if let Some(delay) = runtime.respawn_delay_ms {
            config.respawn_delay_ms = delay;
        }
        if let Some(listen) = runtime.metrics_listen {
            config.metrics_listen = Some(listen);
        }
    }
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn validate_serial(serial: &str) -> Result<()> {
    if serial.trim().is_empty() {
        anyhow::bail!("serial number must be non-empty");
    }
    if !serial.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        anyhow::bail!("serial number must be ASCII alphanumeric, got {serial:?}");
    }
    if !serial.to_ascii_uppercase().starts_with(SERIAL_PREFIX) {
        warn!(serial = %serial, prefix = SERIAL_PREFIX, "serial number has an unexpected prefix");
    }
    Ok(())
}
