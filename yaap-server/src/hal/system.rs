use std::sync::Arc;

use yaap_protocol::{Code, Version};

use super::HalResult;

/// Transitions of the device-wide session lock reported to the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LockChange {
    /// A new holder locked the device
    Locked,
    /// The holder actively unlocked the device
    Unlocked,
    /// The lock expired or the last connection went away
    LockTimedOut,
    /// A timed out lock was picked up again by its holder
    LockRestored,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FirmwareInfo {
    pub kind: String,
    pub version: Version,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BoardInfo {
    pub name: String,
    pub part_no: String,
    pub revision: String,
    pub serial_no: String,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FirmwareStatus {
    pub status: u32,
    pub percent: u32,
}

/// Identity of the debug device and the hooks the session lock drives.
pub trait System: Send + Sync {
    fn device_name(&self) -> HalResult<String>;

    fn yaap_key(&self) -> HalResult<[u8; 16]>;

    fn lock_changed(&self, _change: LockChange) -> HalResult<()> {
        Err(Code::NOT_IMPLEMENTED)
    }

    /// Hand the debug signal multiplexers to (`true`) or away from (`false`) this server.
    fn config_mux(&self, enable: bool) -> HalResult<()>;
}

pub trait Firmware: Send + Sync {
    fn firmware_info(&self) -> HalResult<Vec<FirmwareInfo>>;
    fn update_firmware(&self, kind: &str, image: &[u8]) -> HalResult<()>;
    fn firmware_status(&self, kind: &str) -> HalResult<FirmwareStatus>;
}

pub trait BoardInfoSource: Send + Sync {
    fn boards(&self) -> HalResult<Vec<BoardInfo>>;
}

pub trait DeviceReset: Send + Sync {
    fn reset(&self) -> HalResult<()>;
}

#[derive(Clone)]
pub struct SystemHal {
    pub system: Arc<dyn System>,
    pub firmware: Option<Arc<dyn Firmware>>,
    pub boards: Option<Arc<dyn BoardInfoSource>>,
    pub reset: Option<Arc<dyn DeviceReset>>,
}

impl SystemHal {
    pub fn new(system: Arc<dyn System>) -> SystemHal {
        SystemHal {
            system,
            firmware: None,
            boards: None,
            reset: None,
        }
    }

    pub fn with_firmware(mut self, firmware: Arc<dyn Firmware>) -> Self {
        self.firmware = Some(firmware);
        self
    }

    pub fn with_boards(mut self, boards: Arc<dyn BoardInfoSource>) -> Self {
        self.boards = Some(boards);
        self
    }

    pub fn with_reset(mut self, reset: Arc<dyn DeviceReset>) -> Self {
        self.reset = Some(reset);
        self
    }

    /// Reports a lock transition and switches the debug multiplexers accordingly.
    ///
    /// Hook failures are logged but never fail the operation that caused them.
    pub fn notify(&self, change: LockChange, mux: bool) {
        log::debug!("Lock change {:?}, mux {}", change, if mux { "on" } else { "off" });
        if let Err(code) = self.system.lock_changed(change) {
            if code != Code::NOT_IMPLEMENTED {
                log::warn!("lockChanged({:?}) failed: {}", change, code);
            }
        }
        self.config_mux(mux);
    }

    pub fn config_mux(&self, enable: bool) {
        if let Err(code) = self.system.config_mux(enable) {
            log::warn!("configMux({}) failed: {}", enable, code);
        }
    }
}
