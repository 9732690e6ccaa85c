#![forbid(unsafe_code)]

pub mod config;
pub mod endpoint;
pub mod monitor;
pub mod probe;
pub mod webhook;

pub use config::GuardianConfig;
pub use endpoint::{Endpoint, EndpointKey, Protocol};
pub use monitor::{CheckOutcome, CycleRunner, CycleSummary, Liveness, LivenessTracker};
pub use probe::{ProbeError, ProbeReport, Prober, SocketProber};
pub use webhook::{
    DeliveryError, HttpMethod, NotificationPayload, Notifier, NotifierError, Provider,
    WebhookConfig, WebhookNotifier,
};
