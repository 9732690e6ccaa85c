mod socket;

pub use socket::SocketProber;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::endpoint::Endpoint;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to resolve {target}: {reason}")]
    Resolve { target: String, reason: String },
    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {}ms reaching {target}", .after.as_millis())]
    Timeout { target: String, after: Duration },
    #[error("failed to open local socket for {target}: {source}")]
    Bind {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to send datagram to {target}: {source}")]
    Send {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error receiving from {target}: {source}")]
    Receive {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}

/// Result of a single reachability test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub reachable: bool,
    /// Wall time to reach the target, in milliseconds rounded to 0.01.
    pub latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn reachable(elapsed: Duration) -> Self {
        Self {
            reachable: true,
            latency_ms: Some(round_millis(elapsed)),
            error: None,
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<Duration, ProbeError>> for ProbeReport {
    fn from(result: Result<Duration, ProbeError>) -> Self {
        match result {
            Ok(elapsed) => Self::reachable(elapsed),
            Err(e) => Self::unreachable(e.to_string()),
        }
    }
}

pub(crate) fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_micros() as f64 / 10.0).round() / 100.0
}

/// Performs reachability tests against endpoints.
///
/// Implementations never fail: every error is folded into an unreachable
/// [`ProbeReport`]. No retries happen inside a probe; the cycle cadence is the
/// retry policy.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeReport;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_is_rounded_to_hundredths_of_a_millisecond() {
        assert_eq!(round_millis(Duration::from_micros(12_345)), 12.35);
        assert_eq!(round_millis(Duration::from_millis(3)), 3.0);
    }

    #[test]
    fn report_from_error_carries_message() {
        let report: ProbeReport =
            Err(ProbeError::UnsupportedProtocol("sctp".into())).into();
        assert!(!report.reachable);
        assert_eq!(report.latency_ms, None);
        assert_eq!(report.error.as_deref(), Some("unsupported protocol: sctp"));
    }
}
