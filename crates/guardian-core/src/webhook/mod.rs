//! Webhook notification delivery.
//!
//! The [`WebhookNotifier`] turns a transitioned [`CheckOutcome`] into a
//! provider-specific body and sends it to the configured URL, retrying at a
//! fixed interval. Delivery failures are logged and reported as `false`; they
//! never propagate as errors.

mod payload;

pub use payload::{
    epoch_seconds_string, GenericPayload, LatencyField, NotificationPayload, Provider,
    UNKNOWN_LATENCY,
};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::monitor::CheckOutcome;

/// Upper bound for a single delivery attempt.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Response bodies are cut to this many characters in logs.
const LOG_BODY_LIMIT: usize = 500;

pub const SIGNATURE_HEADER: &str = "X-Guardian-Signature-256";

/// Notification destination as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,

    /// GET, POST or PUT, case-insensitive.
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Extra attempts after the first one. Negative values mean zero.
    pub retry_count: i64,

    /// Seconds between attempts. Values below one mean one.
    pub retry_interval: i64,

    #[serde(default = "default_msg_type")]
    pub msg_type: String,

    /// Optional HMAC-SHA256 signing secret for the signature header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

fn default_msg_type() -> String {
    "text".into()
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            retry_count: 0,
            retry_interval: 1,
            msg_type: default_msg_type(),
            secret: None,
        }
    }

    pub fn with_retries(mut self, retry_count: i64, retry_interval: i64) -> Self {
        self.retry_count = retry_count;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn effective_retry_count(&self) -> u32 {
        u32::try_from(self.retry_count.max(0)).unwrap_or(u32::MAX)
    }

    pub fn effective_retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval.max(1).unsigned_abs())
    }

    pub fn provider(&self) -> Provider {
        Provider::classify(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl FromStr for HttpMethod {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            _ => Err(NotifierError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// Invalid notifier setup. Raised only at construction.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("unsupported webhook method '{0}': expected GET, POST or PUT")]
    UnsupportedMethod(String),
    #[error("invalid webhook header name '{0}'")]
    InvalidHeaderName(String),
    #[error("invalid value for webhook header '{0}'")]
    InvalidHeaderValue(String),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A single failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("request timed out after {}s", DELIVERY_TIMEOUT.as_secs())]
    Timeout,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Delivers notifications for check outcomes.
///
/// Returns whether the notification was delivered. Implementations must treat
/// a non-transitioned outcome as delivered without doing any work.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, outcome: &CheckOutcome) -> bool;
}

/// HTTP webhook notifier with fixed-interval retries.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    method: HttpMethod,
    headers: HeaderMap,
    json_body: bool,
    provider: Provider,
    msg_type: String,
    retry_count: u32,
    retry_interval: Duration,
    secret: Option<String>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig) -> Result<Self, NotifierError> {
        Self::with_client(config, Self::build_client(DELIVERY_TIMEOUT)?)
    }

    pub fn with_client(config: &WebhookConfig, client: Client) -> Result<Self, NotifierError> {
        let method: HttpMethod = config.method.parse()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| NotifierError::InvalidHeaderName(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| NotifierError::InvalidHeaderValue(name.clone()))?;
            headers.insert(header_name, header_value);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        let json_body = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().to_ascii_lowercase().starts_with("application/json"));

        let notifier = Self {
            client,
            url: config.url.clone(),
            method,
            headers,
            json_body,
            provider: config.provider(),
            msg_type: config.msg_type.clone(),
            retry_count: config.effective_retry_count(),
            retry_interval: config.effective_retry_interval(),
            secret: config.secret.clone(),
            shutdown: None,
        };

        info!(
            url = %notifier.url,
            method = %notifier.method,
            provider = ?notifier.provider,
            msg_type = %notifier.msg_type,
            retry_count = notifier.retry_count,
            retry_interval_secs = notifier.retry_interval.as_secs(),
            "Webhook notifier configured"
        );
        debug!(headers = ?notifier.headers, "Webhook headers");
        Ok(notifier)
    }

    /// Abort pending retry waits once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("port-guardian/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Total attempts per notification: the first try plus the retries.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    async fn send_once(&self, payload: &Value) -> Result<(u16, String), DeliveryError> {
        let (req, signed) = match self.method {
            HttpMethod::Get => {
                let pairs = form_pairs(payload);
                let encoded = encode_pairs(&pairs);
                (self.client.get(&self.url).query(&pairs), encoded.into_bytes())
            }
            HttpMethod::Post | HttpMethod::Put => {
                let body = if self.json_body {
                    serde_json::to_vec(payload)?
                } else {
                    encode_pairs(&form_pairs(payload)).into_bytes()
                };
                let builder = match self.method {
                    HttpMethod::Put => self.client.put(&self.url),
                    _ => self.client.post(&self.url),
                };
                (builder.body(body.clone()), body)
            }
        };

        let mut req = req.headers(self.headers.clone());
        if let Some(secret) = self.secret.as_deref() {
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(&signed, secret)));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                DeliveryError::Timeout
            } else {
                DeliveryError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let body = truncate(&resp.text().await.unwrap_or_default(), LOG_BODY_LIMIT);
        if status.is_client_error() || status.is_server_error() {
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok((status.as_u16(), body))
    }

    /// Sleep for `interval`. Returns `false` if shutdown was requested first.
    async fn pause(&self, interval: Duration) -> bool {
        let Some(mut shutdown) = self.shutdown.clone() else {
            tokio::time::sleep(interval).await;
            return true;
        };

        let sleep = tokio::time::sleep(interval);
        tokio::pin!(sleep);
        tokio::select! {
            _ = &mut sleep => true,
            stopped = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                if stopped {
                    false
                } else {
                    // Sender gone without a stop request: nobody can cancel us.
                    sleep.await;
                    true
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn deliver(&self, outcome: &CheckOutcome) -> bool {
        if !outcome.transitioned {
            debug!(endpoint = %outcome.endpoint, "Liveness unchanged, skipping notification");
            return true;
        }

        let payload = NotificationPayload::render(self.provider, outcome, &self.msg_type);
        info!(
            endpoint = %outcome.endpoint,
            title = payload.title(),
            "Sending port status notification"
        );

        let value = match payload.to_value() {
            Ok(v) => v,
            Err(e) => {
                error!(endpoint = %outcome.endpoint, error = %e, "Failed to serialize notification payload");
                return false;
            }
        };
        debug!(method = %self.method, url = %self.url, payload = %value, "Webhook request");

        let attempts = self.max_attempts();
        for attempt in 1..=attempts {
            info!(attempt, attempts, url = %self.url, "Webhook delivery attempt");
            match self.send_once(&value).await {
                Ok((status, body)) => {
                    info!(attempt, status, response = %body, "Webhook delivered");
                    return true;
                }
                Err(e) => {
                    error!(
                        attempt,
                        attempts,
                        url = %self.url,
                        status = e.status_code(),
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                }
            }

            if attempt < attempts {
                info!(
                    wait_secs = self.retry_interval.as_secs(),
                    "Waiting before retrying webhook"
                );
                if !self.pause(self.retry_interval).await {
                    warn!(attempt, attempts, "Shutdown requested, abandoning webhook retries");
                    return false;
                }
            }
        }

        error!(attempts, url = %self.url, endpoint = %outcome.endpoint, "Webhook delivery failed after all attempts");
        false
    }
}

/// Flatten a payload into key/value pairs for query strings and form bodies.
/// Nested values are JSON-encoded into a single parameter.
fn form_pairs(payload: &Value) -> Vec<(String, String)> {
    match payload {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        other => vec![("payload".to_string(), other.to_string())],
    }
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit).collect();
    cut.push_str("...");
    cut
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
