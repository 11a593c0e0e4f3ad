use std::sync::Arc;

use super::HalResult;

/// One captured POST code write.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PostCodeEntry {
    pub data: u8,
    /// Byte offset of the write relative to the monitored port.
    pub offset: u8,
    pub flag: bool,
    pub timestamp: u64,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FifoStatus {
    pub entries: u32,
    pub overflow: bool,
    pub full: bool,
    pub empty: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FifoSetup {
    pub entries: u32,
    pub circular: bool,
    pub discard: bool,
    pub auto_clear: bool,
}

/// Snoops POST codes written to an I/O port on the LPC bus.
pub trait LpcPostCode: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> HalResult<()>;
    fn is_enabled(&self) -> HalResult<bool>;
    /// The last code seen on the monitored port.
    fn post_code(&self) -> HalResult<u32>;
    fn set_port(&self, port: u32) -> HalResult<()>;
    fn port(&self) -> HalResult<u32>;
    /// In passive mode the snooper does not claim the cycle on the bus.
    fn set_passive(&self, passive: bool) -> HalResult<()>;
    fn passive(&self) -> HalResult<bool>;
}

/// History of POST codes.
pub trait PostCodeFifo: Send + Sync {
    fn dump(&self) -> HalResult<Vec<PostCodeEntry>>;
    fn clear(&self) -> HalResult<()>;
    fn status(&self) -> HalResult<FifoStatus>;
    fn clear_status(&self) -> HalResult<()>;
    fn setup(&self) -> HalResult<FifoSetup>;
    fn set_circular(&self, circular: bool) -> HalResult<()>;
    fn set_discard(&self, discard: bool) -> HalResult<()>;
    fn set_auto_clear(&self, auto_clear: bool) -> HalResult<()>;
}

#[derive(Clone)]
pub struct LpcPostCodeHal {
    pub post_code: Arc<dyn LpcPostCode>,
    pub fifo: Option<Arc<dyn PostCodeFifo>>,
}

impl LpcPostCodeHal {
    pub fn new(post_code: Arc<dyn LpcPostCode>) -> LpcPostCodeHal {
        LpcPostCodeHal {
            post_code,
            fifo: None,
        }
    }

    pub fn with_fifo(mut self, fifo: Arc<dyn PostCodeFifo>) -> Self {
        self.fifo = Some(fifo);
        self
    }
}

/// Emulates a firmware flash part on the LPC bus from local SRAM.
pub trait LpcRomEmulator: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> HalResult<()>;
    fn is_enabled(&self) -> HalResult<bool>;
    /// Size of the emulation SRAM in bytes and the emulated part.
    fn setup(&self) -> HalResult<(u32, String)>;
    fn set_device(&self, device: &str) -> HalResult<()>;
    fn write(&self, start: u32, data: &[u8]) -> HalResult<()>;
    fn read(&self, start: u32, data: &mut [u8]) -> HalResult<()>;
}
