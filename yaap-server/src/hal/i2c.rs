use std::sync::Arc;

use super::HalResult;

/// Outcome of a combined write/read transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct I2cTransfer {
    pub written: u32,
    pub read: Vec<u8>,
}

pub trait I2c: Send + Sync {
    /// Write `write` to and then read `read_len` bytes from the 7-bit address `addr`.
    fn transfer(&self, addr: u8, write: &[u8], read_len: usize) -> HalResult<I2cTransfer>;
}

pub trait SclFrequency: Send + Sync {
    fn scl_frequency(&self) -> HalResult<u32>;
    /// Returns the frequency actually configured.
    fn set_scl_frequency(&self, hz: u32) -> HalResult<u32>;
}

#[derive(Clone)]
pub struct I2cHal {
    pub i2c: Arc<dyn I2c>,
    pub scl_frequency: Option<Arc<dyn SclFrequency>>,
}

impl I2cHal {
    pub fn new(i2c: Arc<dyn I2c>) -> I2cHal {
        I2cHal {
            i2c,
            scl_frequency: None,
        }
    }

    pub fn with_scl_frequency(mut self, scl: Arc<dyn SclFrequency>) -> Self {
        self.scl_frequency = Some(scl);
        self
    }
}
