use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport used to probe an endpoint.
///
/// Parsing is case-insensitive. Unknown strings are preserved as
/// [`Protocol::Unsupported`] so that a probe can report them as a failure
/// instead of the endpoint silently disappearing from a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Protocol {
    Tcp,
    Udp,
    Unsupported(String),
}

impl Protocol {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tcp" => Self::Tcp,
            "udp" => Self::Udp,
            _ => Self::Unsupported(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Unsupported(raw) => raw,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl From<String> for Protocol {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Protocol> for String {
    fn from(protocol: Protocol) -> Self {
        protocol.as_str().to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monitored network target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Display label. Not part of the endpoint's identity.
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Endpoint {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        protocol: Protocol,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            protocol,
        }
    }

    pub fn tcp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::new(name, host, port, Protocol::Tcp)
    }

    pub fn udp(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::new(name, host, port, Protocol::Udp)
    }

    pub fn key(&self) -> EndpointKey {
        EndpointKey {
            host: self.host.clone(),
            port: self.port,
            protocol: self.protocol.as_str().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{}/{})", self.name, self.host, self.port, self.protocol)
    }
}

/// Identity of an endpoint in liveness memory: `host:port:protocol`.
///
/// Two endpoints that differ only by name share a key and therefore share
/// liveness state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointKey {
    host: String,
    port: u16,
    protocol: String,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.port, self.protocol)
    }
}
