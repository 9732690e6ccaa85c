use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::outcome::CheckOutcome;
use crate::endpoint::{Endpoint, EndpointKey};

/// Last observed reachability per endpoint identity, used to report edges
/// rather than levels.
///
/// Entries are created on the first reading of an identity and overwritten
/// on every later one; nothing is ever removed. The first reading of an
/// identity is never a transition.
#[derive(Debug, Default)]
pub struct LivenessTracker {
    memory: HashMap<EndpointKey, bool>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        endpoint: &Endpoint,
        reachable: bool,
        latency_ms: Option<f64>,
    ) -> CheckOutcome {
        let key = endpoint.key();
        let previous = self.memory.insert(key.clone(), reachable);
        let transitioned = previous.is_some_and(|prev| prev != reachable);

        match previous {
            None => {
                debug!(endpoint = %endpoint, %key, reachable, "Recorded liveness baseline");
            }
            Some(_) if !transitioned => {
                debug!(endpoint = %endpoint, %key, reachable, "Liveness unchanged");
            }
            Some(_) if reachable => {
                info!(endpoint = %endpoint, %key, latency_ms, "Endpoint recovered");
            }
            Some(_) => {
                warn!(endpoint = %endpoint, %key, "Endpoint became unreachable");
            }
        }

        CheckOutcome::new(endpoint.clone(), reachable, latency_ms).with_transition(transitioned)
    }

    /// Last reading stored for `endpoint`'s identity, if any.
    pub fn last_state(&self, endpoint: &Endpoint) -> Option<bool> {
        self.memory.get(&endpoint.key()).copied()
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}
