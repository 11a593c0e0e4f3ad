use std::sync::Arc;

use super::HalResult;

pub trait Relay: Send + Sync {
    fn set(&self, closed: bool) -> HalResult<()>;
    fn get(&self) -> HalResult<bool>;
}

/// Momentary closing of a relay.
pub trait RelayPulse: Send + Sync {
    /// Returns the pulse length in milliseconds actually used.
    fn pulse(&self, msec: u32) -> HalResult<u32>;
}

#[derive(Clone)]
pub struct RelayHal {
    pub relay: Arc<dyn Relay>,
    pub pulse: Option<Arc<dyn RelayPulse>>,
}

impl RelayHal {
    pub fn new(relay: Arc<dyn Relay>) -> RelayHal {
        RelayHal { relay, pulse: None }
    }

    pub fn with_pulse(mut self, pulse: Arc<dyn RelayPulse>) -> Self {
        self.pulse = Some(pulse);
        self
    }
}
