use std::cmp::min;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha512};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use types::{ChargeConfig, DailyEnergy, DischargeConfig, EssSystem, PowerSample, PowerSnapshot};

pub const DEFAULT_BASE_URL: &str = "https://openapi.alphaess.com/api";

const PATH_ESS_LIST: &str = "getEssList";
const PATH_LAST_POWER: &str = "getLastPowerData";
const PATH_ONE_DATE_ENERGY: &str = "getOneDateEnergyBySn";
const PATH_ONE_DAY_POWER: &str = "getOneDayPowerBySn";
const PATH_CHARGE_CONFIG: &str = "getInChargeConfigInfo";
const PATH_DISCHARGE_CONFIG: &str = "getOutChargeConfigInfo";
const PATH_UPDATE_CHARGE_CONFIG: &str = "updateChargeConfigInfo";
const PATH_UPDATE_DISCHARGE_CONFIG: &str = "updateDisChargeConfigInfo";

const API_CODE_OK: i64 = 200;

/// Credentials and transport options for the AlphaESS Open API.
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Number of retries per request after the initial attempt.
    pub retry_count: usize,
    /// Base delay between retries in milliseconds (exponential backoff).
    pub retry_backoff_ms: u64,
    /// Upper bound for retry backoff delay in milliseconds.
    pub retry_max_backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            app_id: String::new(),
            app_secret: String::new(),
            timeout_ms: 10_000,
            retry_count: 2,
            retry_backoff_ms: 500,
            retry_max_backoff_ms: 5_000,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_count", &self.retry_count)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("retry_max_backoff_ms", &self.retry_max_backoff_ms)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http client init failed: {0}")]
    Build(reqwest::Error),
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("unexpected http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("api error {code}: {msg}")]
    Api { code: i64, msg: String },
    #[error("response carried no data")]
    MissingData,
    #[error("response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Transport failures and server-side errors are worth another attempt;
    /// rejected credentials or parameters are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout { .. } => true,
            ClientError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a, T> {
    sys_sn: &'a str,
    #[serde(flatten)]
    settings: &'a T,
}

/// Signed client for the AlphaESS Open API.
///
/// Every request carries `appId`, `timeStamp` and `sign` headers, where `sign`
/// is the hex SHA-512 of the AppID, AppSecret and timestamp concatenated.
#[derive(Debug, Clone)]
pub struct AlphaEssClient {
    config: ClientConfig,
    http: Client,
}

impl AlphaEssClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Systems registered to the AppID. The API answers with either a list or
    /// a single object; both come back as a list.
    pub async fn get_ess_list(&self) -> Result<Vec<EssSystem>, ClientError> {
        let data = self.get(PATH_ESS_LIST, &[]).await?;
        match decode::<OneOrMany<EssSystem>>(data)? {
            OneOrMany::Many(systems) => Ok(systems),
            OneOrMany::One(system) => Ok(vec![system]),
        }
    }

    pub async fn get_last_power_data(&self, sys_sn: &str) -> Result<PowerSnapshot, ClientError> {
        let data = self.get(PATH_LAST_POWER, &[("sysSn", sys_sn)]).await?;
        decode(data)
    }

    /// Energy totals for `date` (`YYYY-MM-DD`).
    pub async fn get_one_date_energy(
        &self,
        sys_sn: &str,
        date: &str,
    ) -> Result<DailyEnergy, ClientError> {
        let data = self
            .get(PATH_ONE_DATE_ENERGY, &[("sysSn", sys_sn), ("queryDate", date)])
            .await?;
        decode(data)
    }

    /// Intraday power curve for `date` (`YYYY-MM-DD`).
    pub async fn get_one_day_power(
        &self,
        sys_sn: &str,
        date: &str,
    ) -> Result<Vec<PowerSample>, ClientError> {
        let data = self
            .get(PATH_ONE_DAY_POWER, &[("sysSn", sys_sn), ("queryDate", date)])
            .await?;
        match data {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_charge_config(&self, sys_sn: &str) -> Result<ChargeConfig, ClientError> {
        let data = self.get(PATH_CHARGE_CONFIG, &[("sysSn", sys_sn)]).await?;
        decode(data)
    }

    pub async fn get_discharge_config(&self, sys_sn: &str) -> Result<DischargeConfig, ClientError> {
        let data = self.get(PATH_DISCHARGE_CONFIG, &[("sysSn", sys_sn)]).await?;
        decode(data)
    }

    pub async fn update_charge_config(
        &self,
        sys_sn: &str,
        settings: &ChargeConfig,
    ) -> Result<(), ClientError> {
        let body = UpdateRequest { sys_sn, settings };
        self.post(PATH_UPDATE_CHARGE_CONFIG, &body).await?;
        Ok(())
    }

    pub async fn update_discharge_config(
        &self,
        sys_sn: &str,
        settings: &DischargeConfig,
    ) -> Result<(), ClientError> {
        let body = UpdateRequest { sys_sn, settings };
        self.post(PATH_UPDATE_DISCHARGE_CONFIG, &body).await?;
        Ok(())
    }

    async fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<Option<Value>, ClientError> {
        self.send(Method::GET, path, Payload::Query(params)).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Option<Value>, ClientError> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Payload::Json(&body)).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Payload<'_>,
    ) -> Result<Option<Value>, ClientError> {
        let mut attempts = 0usize;

        loop {
            match self.send_once(method.clone(), path, &payload).await {
                Ok(data) => return Ok(data),
                Err(err) if err.is_retryable() && attempts < self.config.retry_count => {
                    let delay_ms = self.retry_delay_ms(attempts);
                    warn!(
                        path,
                        attempt = attempts + 1,
                        delay_ms,
                        error = %err,
                        "alphaess request failed, retrying"
                    );
                    attempts += 1;
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        payload: &Payload<'_>,
    ) -> Result<Option<Value>, ClientError> {
        let timestamp = unix_seconds().to_string();
        let sign = signature(&self.config.app_id, &self.config.app_secret, &timestamp);

        let mut request = self
            .http
            .request(method, self.url(path))
            .header("appId", &self.config.app_id)
            .header("timeStamp", &timestamp)
            .header("sign", sign);
        request = match payload {
            Payload::Query(params) if params.is_empty() => request,
            Payload::Query(params) => request.query(params),
            Payload::Json(body) => request.json(body),
        };

        let response = request.send().await.map_err(|err| self.transport_error(err))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;

        if status != StatusCode::OK {
            error!(path, status = status.as_u16(), body = %body, "alphaess request rejected");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = serde_json::from_str(&body)?;
        if envelope.code != API_CODE_OK {
            let msg = envelope.msg.unwrap_or_default();
            error!(path, code = envelope.code, msg = %msg, "alphaess api error");
            return Err(ClientError::Api {
                code: envelope.code,
                msg,
            });
        }

        debug!(path, "alphaess request ok");
        Ok(envelope.data.filter(|value| !value.is_null()))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn transport_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            ClientError::Transport(err)
        }
    }

    fn retry_delay_ms(&self, attempt: usize) -> u64 {
        let base = self.config.retry_backoff_ms.max(1);
        let shift = u32::try_from(attempt).unwrap_or(u32::MAX);
        let factor = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
        let delay = base.saturating_mul(factor);
        let max = self.config.retry_max_backoff_ms.max(base);
        min(delay, max)
    }
}

enum Payload<'a> {
    Query(&'a [(&'a str, &'a str)]),
    Json(&'a Value),
}

/// Request signature: lowercase hex SHA-512 over `app_id`, `app_secret` and
/// `timestamp` concatenated in that order.
pub fn signature(app_id: &str, app_secret: &str, timestamp: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(app_id.as_bytes());
    hasher.update(app_secret.as_bytes());
    hasher.update(timestamp.as_bytes());
    hex::encode(hasher.finalize())
}

fn decode<T: DeserializeOwned>(data: Option<Value>) -> Result<T, ClientError> {
    let value = data.ok_or(ClientError::MissingData)?;
    Ok(serde_json::from_value(value)?)
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_backoff(base: u64, max: u64) -> AlphaEssClient {
        let config = ClientConfig {
            retry_backoff_ms: base,
            retry_max_backoff_ms: max,
            ..ClientConfig::default()
        };
        AlphaEssClient::new(config).expect("client")
    }

    #[test]
    fn retry_delay_doubles_until_cap() {
        let client = client_with_backoff(100, 1_000);
        assert_eq!(client.retry_delay_ms(0), 100);
        assert_eq!(client.retry_delay_ms(1), 200);
        assert_eq!(client.retry_delay_ms(3), 800);
        assert_eq!(client.retry_delay_ms(4), 1_000);
        assert_eq!(client.retry_delay_ms(200), 1_000);
    }

    #[test]
    fn debug_output_hides_secret() {
        let config = ClientConfig {
            app_secret: "very-secret".to_string(),
            ..ClientConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn url_joins_with_single_slash() {
        let mut client = client_with_backoff(1, 1);
        client.config.base_url = "https://openapi.alphaess.com/api/".to_string();
        assert_eq!(
            client.url("getEssList"),
            "https://openapi.alphaess.com/api/getEssList"
        );
        client.config.base_url = "https://openapi.alphaess.com/api".to_string();
        assert_eq!(
            client.url("/getEssList"),
            "https://openapi.alphaess.com/api/getEssList"
        );
    }

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let server = ClientError::Status {
            status: 502,
            body: String::new(),
        };
        let rejected = ClientError::Status {
            status: 401,
            body: String::new(),
        };
        let api = ClientError::Api {
            code: 6053,
            msg: "sign verification error".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!rejected.is_retryable());
        assert!(!api.is_retryable());
        assert!(ClientError::Timeout { timeout_ms: 1 }.is_retryable());
    }
}
