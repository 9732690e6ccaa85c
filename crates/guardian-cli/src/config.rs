//! Configuration file schema and parsing.
//!
//! JSON is the default format; a `.toml` extension switches to TOML.
//!
//! ```json
//! {
//!   "check_interval": 60,
//!   "timeout": 5,
//!   "log_level": "INFO",
//!   "log_file": "./logs/port-guardian.log",
//!   "servers": [
//!     { "name": "web", "host": "10.0.0.10", "port": 443, "protocol": "TCP" },
//!     { "name": "dns", "host": "10.0.0.53", "port": 53, "protocol": "udp" }
//!   ],
//!   "webhook": {
//!     "url": "https://open.feishu.cn/open-apis/bot/v2/hook/xxxx",
//!     "method": "POST",
//!     "headers": { "Content-Type": "application/json" },
//!     "retry_count": 3,
//!     "retry_interval": 5,
//!     "msg_type": "text"
//!   }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use guardian_core::{Endpoint, GuardianConfig, HttpMethod, Protocol, WebhookConfig};

pub const DEFAULT_CONFIG_PATH: &str = "./config/config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Seconds between check cycles.
    pub check_interval: i64,

    /// Per-probe timeout in seconds.
    pub timeout: i64,

    pub servers: Vec<ServerDef>,

    pub webhook: WebhookConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerDef {
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: String,
}

fn default_log_level() -> String {
    "INFO".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_max_concurrent_probes() -> usize {
    16
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_json(&content)
        }
        .map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval <= 0 {
            return Err(ConfigError::Invalid(format!(
                "check_interval must be a positive integer, got {}",
                self.check_interval
            )));
        }
        if self.timeout <= 0 {
            return Err(ConfigError::Invalid(format!(
                "timeout must be a positive integer, got {}",
                self.timeout
            )));
        }
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_probes must be at least 1".into(),
            ));
        }

        if self.servers.is_empty() {
            return Err(ConfigError::Invalid(
                "servers must list at least one endpoint".into(),
            ));
        }
        for (i, s) in self.servers.iter().enumerate() {
            let idx = i + 1;
            if s.host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "server #{idx} ('{}') has an empty host",
                    s.name
                )));
            }
            if !(1..=65535).contains(&s.port) {
                return Err(ConfigError::Invalid(format!(
                    "server #{idx} ('{}') has invalid port {}: must be 1-65535",
                    s.name, s.port
                )));
            }
            if !Protocol::parse(&s.protocol).is_supported() {
                return Err(ConfigError::Invalid(format!(
                    "server #{idx} ('{}') uses unsupported protocol '{}': expected TCP or UDP",
                    s.name, s.protocol
                )));
            }
        }

        let parsed = url::Url::parse(&self.webhook.url).map_err(|e| {
            ConfigError::Invalid(format!("invalid webhook URL {}: {}", self.webhook.url, e))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ConfigError::Invalid(format!(
                "webhook URL must use http or https: {}",
                self.webhook.url
            )));
        }
        self.webhook
            .method
            .parse::<HttpMethod>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        match self.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "invalid log_format '{other}': must be 'pretty' or 'json'"
                )));
            }
        }

        Ok(())
    }

    pub fn to_guardian_config(&self) -> GuardianConfig {
        GuardianConfig::default()
            .with_check_interval(self.check_interval.unsigned_abs())
            .with_probe_timeout(self.timeout.unsigned_abs())
            .with_max_concurrent_probes(self.max_concurrent_probes)
    }

    /// Endpoints in file order. Call after [`AppConfig::validate`].
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.servers
            .iter()
            .map(|s| {
                Endpoint::new(
                    s.name.clone(),
                    s.host.clone(),
                    u16::try_from(s.port).unwrap_or_default(),
                    Protocol::parse(&s.protocol),
                )
            })
            .collect()
    }

    /// `tracing` filter directive for `log_level`, or `None` if the level is
    /// not recognised.
    pub fn tracing_directive(&self) -> Option<&'static str> {
        match self.log_level.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some("debug"),
            "INFO" => Some("info"),
            "WARNING" | "WARN" => Some("warn"),
            "ERROR" | "CRITICAL" => Some("error"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL_JSON: &str = r#"{
        "check_interval": 30,
        "timeout": 3,
        "servers": [
            { "name": "web", "host": "10.0.0.10", "port": 443, "protocol": "TCP" },
            { "name": "dns", "host": "10.0.0.53", "port": 53, "protocol": "udp" }
        ],
        "webhook": {
            "url": "https://hooks.example.com/ports",
            "method": "post",
            "retry_count": 2,
            "retry_interval": 5
        }
    }"#;

    fn with_json(edit: impl FnOnce(&mut serde_json::Value)) -> AppConfig {
        let mut v: serde_json::Value = serde_json::from_str(MINIMAL_JSON).unwrap();
        edit(&mut v);
        serde_json::from_value(v).unwrap()
    }

    fn invalid_reason(config: &AppConfig) -> String {
        config.validate().unwrap_err().to_string()
    }

    #[test]
    fn parse_minimal_json_config() {
        let config = AppConfig::from_json(MINIMAL_JSON).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.log_format, "pretty");
        assert!(config.log_file.is_none());
        assert_eq!(config.webhook.msg_type, "text");
        assert!(config.webhook.headers.is_empty());

        let eps = config.endpoints();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].protocol, Protocol::Tcp);
        assert_eq!(eps[1].protocol, Protocol::Udp);
        assert_eq!(eps[1].port, 53);

        let gc = config.to_guardian_config();
        assert_eq!(gc.check_interval, Duration::from_secs(30));
        assert_eq!(gc.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn parse_toml_config() {
        let toml = r#"
check_interval = 10
timeout = 2
log_level = "debug"
log_format = "json"
max_concurrent_probes = 4

[[servers]]
name = "ssh"
host = "192.168.1.20"
port = 22
protocol = "tcp"

[webhook]
url = "https://oapi.dingtalk.com/robot/send?access_token=abc"
method = "POST"
retry_count = 0
retry_interval = 1
headers = { Authorization = "Bearer x" }
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.tracing_directive(), Some("debug"));
        assert_eq!(config.log_format, "json");
        assert_eq!(config.to_guardian_config().max_concurrent_probes, 4);
        assert_eq!(config.webhook.headers["Authorization"], "Bearer x");
        assert_eq!(config.webhook.provider(), guardian_core::Provider::DingTalk);
    }

    #[test]
    fn retry_settings_below_floor_are_clamped_not_rejected() {
        let config = with_json(|v| {
            v["webhook"]["retry_count"] = (-2).into();
            v["webhook"]["retry_interval"] = 0.into();
        });
        config.validate().unwrap();
        assert_eq!(config.webhook.effective_retry_count(), 0);
        assert_eq!(
            config.webhook.effective_retry_interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn missing_required_section_fails_to_parse() {
        let err = AppConfig::from_json(r#"{ "check_interval": 1, "timeout": 1, "servers": [] }"#)
            .unwrap_err();
        assert!(err.contains("webhook"), "{}", err);
    }

    #[test]
    fn validate_rejects_non_positive_interval() {
        let config = with_json(|v| v["check_interval"] = 0.into());
        assert!(invalid_reason(&config).contains("check_interval"));

        let config = with_json(|v| v["timeout"] = (-1).into());
        assert!(invalid_reason(&config).contains("timeout"));
    }

    #[test]
    fn validate_rejects_empty_servers() {
        let config = with_json(|v| v["servers"] = serde_json::json!([]));
        assert!(invalid_reason(&config).contains("at least one endpoint"));
    }

    #[test]
    fn validate_rejects_out_of_range_port() {
        for port in [0, 65536, -80] {
            let config = with_json(|v| v["servers"][0]["port"] = port.into());
            let reason = invalid_reason(&config);
            assert!(reason.contains("invalid port"), "{}", reason);
        }
    }

    #[test]
    fn validate_rejects_unknown_protocol() {
        let config = with_json(|v| v["servers"][1]["protocol"] = "icmp".into());
        let reason = invalid_reason(&config);
        assert!(reason.contains("server #2"), "{}", reason);
        assert!(reason.contains("icmp"), "{}", reason);
    }

    #[test]
    fn validate_rejects_bad_webhook() {
        let config = with_json(|v| v["webhook"]["url"] = "not-a-url".into());
        assert!(invalid_reason(&config).contains("invalid webhook URL"));

        let config = with_json(|v| v["webhook"]["url"] = "ftp://example.com/x".into());
        assert!(invalid_reason(&config).contains("http or https"));

        let config = with_json(|v| v["webhook"]["method"] = "DELETE".into());
        assert!(invalid_reason(&config).contains("unsupported webhook method"));
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let config = with_json(|v| v["log_format"] = "xml".into());
        assert!(invalid_reason(&config).contains("invalid log_format"));
    }

    #[test]
    fn unknown_log_level_has_no_directive() {
        assert_eq!(with_json(|v| v["log_level"] = "CRITICAL".into()).tracing_directive(), Some("error"));
        assert_eq!(with_json(|v| v["log_level"] = "warning".into()).tracing_directive(), Some("warn"));
        assert_eq!(with_json(|v| v["log_level"] = "LOUD".into()).tracing_directive(), None);
    }

    #[test]
    fn load_reads_json_and_toml_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("config.json");
        std::fs::File::create(&json_path)
            .unwrap()
            .write_all(MINIMAL_JSON.as_bytes())
            .unwrap();
        assert_eq!(AppConfig::load(&json_path).unwrap().servers.len(), 2);

        let toml_path = dir.path().join("config.toml");
        std::fs::write(
            &toml_path,
            r#"
check_interval = 5
timeout = 1
servers = [{ name = "a", host = "127.0.0.1", port = 80, protocol = "TCP" }]

[webhook]
url = "http://127.0.0.1:9/hook"
method = "GET"
retry_count = 1
retry_interval = 1
"#,
        )
        .unwrap();
        assert_eq!(AppConfig::load(&toml_path).unwrap().servers.len(), 1);
    }

    #[test]
    fn load_reports_missing_file_and_bad_syntax() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            AppConfig::load(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ \"check_interval\": ").unwrap();
        assert!(matches!(
            AppConfig::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }
}
