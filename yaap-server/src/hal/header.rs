use std::sync::Arc;

use super::HalResult;

/// Connection state of a debug header.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HeaderStatus {
    pub connected: bool,
    /// Human readable connection mode, e.g. `"HDT+"`.
    pub mode: String,
}

/// The (possibly virtual) connector a debug target is attached through.
pub trait Header: Send + Sync {
    fn status(&self) -> HalResult<HeaderStatus>;
    fn is_enabled(&self) -> HalResult<bool>;
    fn is_in_conflict(&self) -> HalResult<bool>;
}

pub trait HeaderEnable: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> HalResult<()>;
}

/// Latches whether the header status changed since it was last cleared.
pub trait HeaderChangeDetect: Send + Sync {
    fn is_changed(&self) -> HalResult<bool>;
    fn clear_changed(&self) -> HalResult<()>;
}

pub trait Trst: Send + Sync {
    fn set_trst(&self, asserted: bool) -> HalResult<()>;
    fn trst(&self) -> HalResult<bool>;
}

#[derive(Clone)]
pub struct HeaderHal {
    pub header: Arc<dyn Header>,
    pub enable: Option<Arc<dyn HeaderEnable>>,
    pub change_detect: Option<Arc<dyn HeaderChangeDetect>>,
    pub trst: Option<Arc<dyn Trst>>,
}

impl HeaderHal {
    pub fn new(header: Arc<dyn Header>) -> HeaderHal {
        HeaderHal {
            header,
            enable: None,
            change_detect: None,
            trst: None,
        }
    }

    pub fn with_enable(mut self, enable: Arc<dyn HeaderEnable>) -> Self {
        self.enable = Some(enable);
        self
    }

    pub fn with_change_detect(mut self, change_detect: Arc<dyn HeaderChangeDetect>) -> Self {
        self.change_detect = Some(change_detect);
        self
    }

    pub fn with_trst(mut self, trst: Arc<dyn Trst>) -> Self {
        self.trst = Some(trst);
        self
    }
}
