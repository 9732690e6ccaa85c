//! Provider-specific notification bodies.
//!
//! The destination URL alone decides the body shape. Feishu/Lark and DingTalk
//! robots get their text-message envelopes; everything else gets the flat
//! generic object whose field names are the stable contract for consumers.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::monitor::CheckOutcome;

/// Rendered in place of a latency that could not be measured.
pub const UNKNOWN_LATENCY: &str = "未知";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Feishu,
    DingTalk,
    Generic,
}

impl Provider {
    /// Classify a destination URL. Total: unrecognised URLs are `Generic`.
    pub fn classify(url: &str) -> Self {
        if url.contains("feishu.cn") || url.contains("larksuite.com") {
            Self::Feishu
        } else if url.contains("dingtalk.com") {
            Self::DingTalk
        } else {
            Self::Generic
        }
    }
}

/// Latency as it appears in payloads: a number when known, the
/// [`UNKNOWN_LATENCY`] marker otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LatencyField {
    Millis(f64),
    Unknown(&'static str),
}

impl LatencyField {
    fn from_outcome(latency_ms: Option<f64>) -> Self {
        match latency_ms {
            Some(ms) => Self::Millis(ms),
            None => Self::Unknown(UNKNOWN_LATENCY),
        }
    }
}

impl std::fmt::Display for LatencyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Millis(ms) => write!(f, "{ms}"),
            Self::Unknown(marker) => f.write_str(marker),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeishuContent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DingTalkText {
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenericPayload {
    pub msg_type: String,
    pub title: String,
    pub server_name: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub status: String,
    pub response_time_ms: LatencyField,
    pub checked_at: String,
    pub timestamp: f64,
}

/// A notification body, one variant per [`Provider`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum NotificationPayload {
    Feishu {
        msg_type: String,
        content: FeishuContent,
    },
    DingTalk {
        msgtype: String,
        text: DingTalkText,
    },
    Generic(GenericPayload),
}

impl NotificationPayload {
    pub fn render(provider: Provider, outcome: &CheckOutcome, msg_type: &str) -> Self {
        match provider {
            Provider::Feishu => Self::Feishu {
                msg_type: msg_type.to_string(),
                content: FeishuContent {
                    text: format!(
                        "{}\n检查时间: {}",
                        message_body(outcome),
                        epoch_seconds_string(outcome.observed_at)
                    ),
                },
            },
            Provider::DingTalk => Self::DingTalk {
                msgtype: "text".to_string(),
                text: DingTalkText {
                    content: message_body(outcome),
                },
            },
            Provider::Generic => Self::Generic(GenericPayload {
                msg_type: msg_type.to_string(),
                title: headline(outcome.reachable),
                server_name: outcome.endpoint.name.clone(),
                host: outcome.endpoint.host.clone(),
                port: outcome.endpoint.port,
                protocol: outcome.endpoint.protocol.to_string(),
                status: outcome.liveness().to_string(),
                response_time_ms: LatencyField::from_outcome(outcome.latency_ms),
                checked_at: epoch_seconds_string(outcome.observed_at),
                timestamp: now_epoch_seconds(),
            }),
        }
    }

    /// First line of the human-readable message, for logging.
    pub fn title(&self) -> &str {
        match self {
            Self::Feishu { content, .. } => first_line(&content.text),
            Self::DingTalk { text, .. } => first_line(&text.content),
            Self::Generic(g) => &g.title,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

fn headline(reachable: bool) -> String {
    if reachable {
        "✅ 服务器端口恢复正常".to_string()
    } else {
        "❌ 服务器端口出现异常".to_string()
    }
}

fn message_body(outcome: &CheckOutcome) -> String {
    let ep = &outcome.endpoint;
    format!(
        "{}\n服务器名称: {}\n主机地址: {}\n端口: {}\n协议: {}\n状态: {}\n响应时间: {}ms",
        headline(outcome.reachable),
        ep.name,
        ep.host,
        ep.port,
        ep.protocol,
        outcome.liveness(),
        LatencyField::from_outcome(outcome.latency_ms),
    )
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Epoch seconds with millisecond precision, e.g. `"1700000000.250"`.
pub fn epoch_seconds_string(at: DateTime<Utc>) -> String {
    format!("{}.{:03}", at.timestamp(), at.timestamp_subsec_millis())
}

fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use chrono::TimeZone;

    fn outcome(reachable: bool, latency_ms: Option<f64>) -> CheckOutcome {
        CheckOutcome::new(Endpoint::tcp("api", "10.1.2.3", 8443), reachable, latency_ms)
            .with_transition(true)
            .with_observed_at(Utc.timestamp_millis_opt(1_700_000_000_250).unwrap())
    }

    #[test]
    fn classify_recognises_known_providers() {
        assert_eq!(
            Provider::classify("https://open.feishu.cn/open-apis/bot/v2/hook/abc"),
            Provider::Feishu
        );
        assert_eq!(
            Provider::classify("https://open.larksuite.com/open-apis/bot/v2/hook/abc"),
            Provider::Feishu
        );
        assert_eq!(
            Provider::classify("https://oapi.dingtalk.com/robot/send?access_token=x"),
            Provider::DingTalk
        );
        assert_eq!(
            Provider::classify("https://hooks.example.com/ports"),
            Provider::Generic
        );
        assert_eq!(Provider::classify(""), Provider::Generic);
        assert_eq!(Provider::classify("not a url at all"), Provider::Generic);
    }

    #[test]
    fn feishu_payload_is_nested_text_message() {
        let payload = NotificationPayload::render(Provider::Feishu, &outcome(false, None), "text");
        let v = payload.to_value().unwrap();

        assert_eq!(v["msg_type"], "text");
        let text = v["content"]["text"].as_str().unwrap();
        assert!(text.starts_with("❌ 服务器端口出现异常"));
        assert!(text.contains("主机地址: 10.1.2.3"));
        assert!(text.contains("状态: DOWN"));
        assert!(text.contains("响应时间: 未知ms"));
        assert!(text.contains("检查时间: 1700000000.250"));
        assert_eq!(v.as_object().unwrap().len(), 2);
    }

    #[test]
    fn dingtalk_payload_uses_msgtype_text() {
        let payload =
            NotificationPayload::render(Provider::DingTalk, &outcome(true, Some(4.2)), "post");
        let v = payload.to_value().unwrap();

        assert_eq!(v["msgtype"], "text");
        let content = v["text"]["content"].as_str().unwrap();
        assert!(content.starts_with("✅ 服务器端口恢复正常"));
        assert!(content.contains("响应时间: 4.2ms"));
        assert!(!content.contains("检查时间"));
    }

    #[test]
    fn generic_payload_has_every_contract_field() {
        let payload =
            NotificationPayload::render(Provider::Generic, &outcome(true, Some(12.5)), "text");
        let v = payload.to_value().unwrap();

        for key in [
            "msg_type",
            "title",
            "server_name",
            "host",
            "port",
            "protocol",
            "status",
            "response_time_ms",
            "checked_at",
            "timestamp",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert_eq!(v["server_name"], "api");
        assert_eq!(v["port"], 8443);
        assert_eq!(v["protocol"], "tcp");
        assert_eq!(v["status"], "UP");
        assert_eq!(v["response_time_ms"], 12.5);
        assert_eq!(v["checked_at"], "1700000000.250");
        assert!(v["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn generic_payload_marks_unknown_latency() {
        let payload =
            NotificationPayload::render(Provider::Generic, &outcome(false, None), "text");
        let v = payload.to_value().unwrap();
        assert_eq!(v["status"], "DOWN");
        assert_eq!(v["response_time_ms"], UNKNOWN_LATENCY);
        assert_eq!(payload.title(), "❌ 服务器端口出现异常");
    }

    #[test]
    fn title_comes_from_first_line_for_text_providers() {
        let payload = NotificationPayload::render(Provider::Feishu, &outcome(true, None), "text");
        assert_eq!(payload.title(), "✅ 服务器端口恢复正常");
    }
}
