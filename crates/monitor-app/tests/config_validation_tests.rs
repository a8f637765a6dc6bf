use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use monitor_app::MonitorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_KEYS: [&str; 13] = [
    "ALPHAESS_CONFIG",
    "ALPHAESS_CREDENTIALS",
    "ALPHAESS_BASE_URL",
    "ALPHAESS_APP_ID",
    "ALPHAESS_APP_SECRET",
    "ALPHAESS_SERIAL",
    "ALPHAESS_POLL_INTERVAL_MS",
    "ALPHAESS_JITTER_MS",
    "ALPHAESS_TIMEOUT_MS",
    "ALPHAESS_RETRY_COUNT",
    "ALPHAESS_FRAME_PATH",
    "ALPHAESS_CONSOLE",
    "ALPHAESS_METRICS_LISTEN",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

#[test]
fn credentials_file_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = MonitorConfig::load_with_path(Some(fixture_path("configuration.conf")), None)
        .expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.api.base_url, "https://openapi.alphaess.com/api");
    assert_eq!(config.api.app_id, "alpha1234567890");
    assert_eq!(config.api.app_secret, "0123456789abcdef0123456789abcdef");
    assert_eq!(config.serial_number, "AL1234567890");
    assert_eq!(config.poller.poll_interval, Duration::from_secs(10));
    assert!(config.panel.console);
}

#[test]
fn toml_settings_layer_over_credentials() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("ALPHAESS_CONFIG", fixture_path("config-valid.toml"));

    let config = MonitorConfig::load_with_path(Some(fixture_path("configuration.conf")), None)
        .expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.api.timeout_ms, 5_000);
    assert_eq!(config.api.retry_count, 3);
    assert_eq!(config.poller.poll_interval, Duration::from_secs(30));
    assert_eq!(config.poller.jitter_ms, 500);
    assert!(!config.panel.console);
    assert_eq!(
        config.panel.frame_path,
        Some(PathBuf::from("/tmp/alphaess/frame.pbm"))
    );
    assert_eq!(config.channel_capacity, 4);
    assert_eq!(config.metrics_listen.as_deref(), Some("127.0.0.1:9187"));

    clear_env();
}

#[test]
fn json_settings_can_carry_credentials() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("ALPHAESS_CREDENTIALS", fixture_path("missing.conf"));

    // an explicitly named credentials file must exist
    assert!(MonitorConfig::load().is_err());
    env::remove_var("ALPHAESS_CREDENTIALS");

    let config = MonitorConfig::load_with_path(None, Some(fixture_path("config-valid.json")))
        .expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.api.app_id, "alpha-json");
    assert_eq!(config.serial_number, "AL0000000042");
    assert_eq!(config.poller.poll_interval, Duration::from_secs(15));
    assert_eq!(config.respawn_delay_ms, 2_000);
}

#[test]
fn env_overrides_win() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("ALPHAESS_SERIAL", "AL9999999999");
    env::set_var("ALPHAESS_POLL_INTERVAL_MS", "2500");
    env::set_var("ALPHAESS_CONSOLE", "false");
    env::set_var("ALPHAESS_FRAME_PATH", "frame.pbm");
    env::set_var("ALPHAESS_METRICS_LISTEN", "0.0.0.0:9100");

    let config = MonitorConfig::load_with_path(
        Some(fixture_path("configuration.conf")),
        Some(fixture_path("config-valid.toml")),
    )
    .expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.serial_number, "AL9999999999");
    assert_eq!(config.poller.poll_interval, Duration::from_millis(2_500));
    assert!(!config.panel.console);
    assert_eq!(config.panel.frame_path, Some(PathBuf::from("frame.pbm")));
    assert_eq!(config.metrics_listen.as_deref(), Some("0.0.0.0:9100"));

    clear_env();
}

#[test]
fn invalid_settings_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("ALPHAESS_CONFIG", fixture_path("config-invalid.toml"));

    let config = MonitorConfig::load_with_path(Some(fixture_path("configuration.conf")), None)
        .expect("load config");
    assert!(config.validate().is_err());

    clear_env();
}

#[test]
fn malformed_credentials_fail_to_load() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let short = MonitorConfig::load_with_path(Some(fixture_path("configuration-short.conf")), None)
        .expect_err("short file");
    assert!(format!("{short:#}").contains("line 3 (AppSecret) is missing"));

    let empty = MonitorConfig::load_with_path(
        Some(fixture_path("configuration-empty-secret.conf")),
        None,
    )
    .expect_err("empty secret");
    assert!(format!("{empty:#}").contains("line 3 (AppSecret) is empty"));
}

#[test]
fn missing_credentials_fail_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let config = MonitorConfig::load().expect("load defaults");
    let err = config.validate().expect_err("no credentials");
    assert!(err.to_string().contains("app_id"));
}

#[test]
fn listing_systems_does_not_need_a_serial() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();
    env::set_var("ALPHAESS_APP_ID", "alpha-env");
    env::set_var("ALPHAESS_APP_SECRET", "secret-env");

    let config = MonitorConfig::load().expect("load config");
    assert!(config.serial_number.is_empty());
    config.validate_for_listing().expect("listing config");
    let err = config.validate().expect_err("serial required for polling");
    assert!(err.to_string().contains("serial number"));

    let mut config = config;
    config.api.app_secret = String::new();
    assert!(config.validate_for_listing().is_err());

    clear_env();
}

#[test]
fn bad_values_are_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    clear_env();

    let base = MonitorConfig::load_with_path(Some(fixture_path("configuration.conf")), None)
        .expect("load config");

    let mut config = base.clone();
    config.api.base_url = "ftp://openapi.alphaess.com/api".to_string();
    assert!(config.validate().is_err());

    let mut config = base.clone();
    config.api.base_url = "not a url".to_string();
    assert!(config.validate().is_err());

    let mut config = base.clone();
    config.api.base_url = "http://localhost:8080/api".to_string();
    assert!(config.validate().is_ok());

    let mut config = base.clone();
    config.serial_number = "AL 123".to_string();
    assert!(config.validate().is_err());

    let mut config = base.clone();
    config.metrics_listen = Some("localhost".to_string());
    assert!(config.validate().is_err());

    let mut config = base;
    config.channel_capacity = 0;
    assert!(config.validate().is_err());
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
