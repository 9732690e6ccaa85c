use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Liveness {
    Up,
    Down,
}

impl Liveness {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Up
        } else {
            Self::Down
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.pad("UP"),
            Self::Down => f.pad("DOWN"),
        }
    }
}

/// What one probe of one endpoint produced during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub endpoint: Endpoint,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    /// True only when a previous reading existed and differed.
    pub transitioned: bool,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckOutcome {
    pub fn new(endpoint: Endpoint, reachable: bool, latency_ms: Option<f64>) -> Self {
        Self {
            endpoint,
            reachable,
            latency_ms,
            transitioned: false,
            observed_at: Utc::now(),
            error: None,
        }
    }

    pub fn with_transition(mut self, transitioned: bool) -> Self {
        self.transitioned = transitioned;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn with_observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from_reachable(self.reachable)
    }
}
