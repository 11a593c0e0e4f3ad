//! POST code snooping and flash emulation on the LPC bus.
use std::sync::Arc;

use yaap_protocol::{Code, Version};

use crate::hal::lpc::{FifoSetup, FifoStatus, PostCodeFifo};
use crate::hal::{HalResult, LpcPostCodeHal, LpcRomEmulator};
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// I/O ports a POST code reader can monitor, indexed by their wire code.
const POST_CODE_PORTS: [u32; 4] = [0x80, 0x84, 0xE0, 0x160];

/// Flash parts the ROM emulator can pose as, indexed by their wire code.
const ROM_DEVICES: [&str; 4] = ["SST49LF002B", "SST49LF004B", "SST49LF080A", "SST49LF160C"];

fn bool_reply(result: HalResult<bool>) -> Reply {
    match result {
        Ok(value) => Reply::ok().bool(value),
        Err(code) => Reply::new(code).bool(false),
    }
}

pub struct LpcPostCodeClass {
    hal: LpcPostCodeHal,
}

impl LpcPostCodeClass {
    pub fn new(hal: LpcPostCodeHal) -> LpcPostCodeClass {
        LpcPostCodeClass { hal }
    }

    fn fifo(&self) -> HalResult<&Arc<dyn PostCodeFifo>> {
        self.hal.fifo.as_ref().ok_or(Code::NOT_IMPLEMENTED)
    }

    fn fifo_setup(&self) -> HalResult<FifoSetup> {
        self.fifo()?.setup()
    }

    fn post_code_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.hal.post_code.post_code() {
            Ok(code) => Reply::ok().u32(code),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn fifo_size_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.fifo_setup() {
            Ok(setup) => Reply::ok().u32(setup.entries),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn fifo_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.fifo().and_then(|fifo| fifo.dump()) {
            Ok(entries) => {
                let mut reply = Reply::ok().u32(entries.len() as u32);
                for entry in &entries {
                    reply
                        .fields()
                        .u8(entry.data)
                        .u8(entry.offset)
                        .bool(entry.flag)
                        .u64(entry.timestamp);
                }
                reply
            }
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn fifo_clear(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::status(self.fifo().and_then(|fifo| fifo.clear()))
    }

    fn fifo_status_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let (code, status) = match self.fifo().and_then(|fifo| fifo.status()) {
            Ok(status) => (Code::SUCCESS, status),
            Err(code) => (code, FifoStatus::default()),
        };
        // Underflow is part of the reply but never detected.
        Reply::new(code)
            .u32(status.entries)
            .bool(status.overflow)
            .bool(false)
            .bool(status.full)
            .bool(status.empty)
    }

    fn fifo_status_clear(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::status(self.fifo().and_then(|fifo| fifo.clear_status()))
    }

    fn port_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.u8()).and_then(|port_code| {
            let port = POST_CODE_PORTS
                .get(port_code as usize)
                .ok_or(Code::INVALID_SETTING)?;
            self.hal.post_code.set_port(*port)
        });
        Reply::status(result)
    }

    fn port_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = self.hal.post_code.port().and_then(|port| {
            POST_CODE_PORTS
                .iter()
                .position(|known| *known == port)
                .ok_or(Code::INVALID_SETTING)
        });
        match result {
            Ok(port_code) => Reply::ok().u8(port_code as u8),
            Err(code) => Reply::new(code).u8(0),
        }
    }

    fn passive_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|passive| self.hal.post_code.set_passive(passive));
        Reply::status(result)
    }

    fn passive_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.hal.post_code.passive())
    }

    fn circular_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|circular| self.fifo()?.set_circular(circular));
        Reply::status(result)
    }

    fn circular_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.fifo_setup().map(|setup| setup.circular))
    }

    fn discard_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|discard| self.fifo()?.set_discard(discard));
        Reply::status(result)
    }

    fn discard_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.fifo_setup().map(|setup| setup.discard))
    }

    fn auto_reset_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|auto_clear| self.fifo()?.set_auto_clear(auto_clear));
        Reply::status(result)
    }

    fn auto_reset_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.fifo_setup().map(|setup| setup.auto_clear))
    }

    fn enable_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|enabled| self.hal.post_code.set_enabled(enabled));
        Reply::status(result)
    }

    fn enable_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.hal.post_code.is_enabled())
    }
}

impl YaapClass for LpcPostCodeClass {
    const TYPE_NAME: &'static str = "lpcPostCode";
    const VERSION: Version = Version::new(1, 0, 0);

    fn methods(&self) -> Vec<Method<Self>> {
        if self.hal.fifo.is_none() {
            log::debug!("LPC POST code reader without FIFO");
        }
        vec![
            Method::locked(
                "postCodeGet",
                "int lpcPostCode.postCodeGet(void)",
                LpcPostCodeClass::post_code_get,
            ),
            Method::locked(
                "fifoSizeGet",
                "int lpcPostCode.fifoSizeGet(void)",
                LpcPostCodeClass::fifo_size_get,
            ),
            Method::locked(
                "fifoGet",
                "struct { uint8_t data; uint8_t offset; bool flag; uint64_t timestamp; } [] lpcPostCode.fifoGet(void)",
                LpcPostCodeClass::fifo_get,
            ),
            Method::locked(
                "fifoClear",
                "void lpcPostCode.fifoClear(void)",
                LpcPostCodeClass::fifo_clear,
            ),
            Method::locked(
                "fifoStatusGet",
                "struct { int count; bool overflow; bool underflow; bool full; bool empty; } lpcPostCode.fifoStatusGet(void)",
                LpcPostCodeClass::fifo_status_get,
            ),
            Method::locked(
                "fifoStatusClear",
                "void lpcPostCode.fifoStatusClear(void)",
                LpcPostCodeClass::fifo_status_clear,
            ),
            Method::locked(
                "optionPortSet",
                "void lpcPostCode.optionPortSet(uint8_t port)",
                LpcPostCodeClass::port_set,
            ),
            Method::locked(
                "optionPortGet",
                "uint8_t lpcPostCode.optionPortGet(void)",
                LpcPostCodeClass::port_get,
            ),
            Method::locked(
                "optionPassiveSet",
                "void lpcPostCode.optionPassiveSet(bool passive)",
                LpcPostCodeClass::passive_set,
            ),
            Method::locked(
                "optionPassiveGet",
                "bool lpcPostCode.optionPassiveGet(void)",
                LpcPostCodeClass::passive_get,
            ),
            Method::locked(
                "optionFifoCircularSet",
                "void lpcPostCode.optionFifoCircularSet(bool circular)",
                LpcPostCodeClass::circular_set,
            ),
            Method::locked(
                "optionFifoCircularGet",
                "bool lpcPostCode.optionFifoCircularGet(void)",
                LpcPostCodeClass::circular_get,
            ),
            Method::locked(
                "optionFifoDiscardSet",
                "void lpcPostCode.optionFifoDiscardSet(bool discard)",
                LpcPostCodeClass::discard_set,
            ),
            Method::locked(
                "optionFifoDiscardGet",
                "bool lpcPostCode.optionFifoDiscardGet(void)",
                LpcPostCodeClass::discard_get,
            ),
            Method::locked(
                "optionFifoAutoResetSet",
                "void lpcPostCode.optionFifoAutoResetSet(bool autoReset)",
                LpcPostCodeClass::auto_reset_set,
            ),
            Method::locked(
                "optionFifoAutoResetGet",
                "bool lpcPostCode.optionFifoAutoResetGet(void)",
                LpcPostCodeClass::auto_reset_get,
            ),
            Method::locked(
                "enableSet",
                "void lpcPostCode.enableSet(bool enable)",
                LpcPostCodeClass::enable_set,
            ),
            Method::locked(
                "enableGet",
                "bool lpcPostCode.enableGet(void)",
                LpcPostCodeClass::enable_get,
            ),
        ]
    }
}

pub struct LpcRomEmulationClass {
    hal: Arc<dyn LpcRomEmulator>,
}

impl LpcRomEmulationClass {
    pub fn new(hal: Arc<dyn LpcRomEmulator>) -> LpcRomEmulationClass {
        LpcRomEmulationClass { hal }
    }

    fn enable_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.hal.is_enabled())
    }

    fn enable_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|enabled| self.hal.set_enabled(enabled));
        Reply::status(result)
    }

    fn rom_type_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = self.hal.setup().and_then(|(_, device)| {
            ROM_DEVICES
                .iter()
                .position(|known| *known == device)
                .ok_or(Code::UNSUPPORTED_DEVICE)
        });
        match result {
            Ok(device_code) => Reply::ok().u8(device_code as u8),
            Err(code) => Reply::new(code).u8(0),
        }
    }

    fn rom_type_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.u8()).and_then(|device_code| {
            let device = ROM_DEVICES
                .get(device_code as usize)
                .ok_or(Code::UNSUPPORTED_DEVICE)?;
            self.hal.set_device(device)
        });
        Reply::status(result)
    }

    fn sram_get(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| Ok((args.u32()?, args.u32()?)))
            .and_then(|(start, len)| {
                let mut data = Vec::new();
                data.try_reserve_exact(len as usize)
                    .map_err(|_| Code::OUT_OF_MEMORY)?;
                data.resize(len as usize, 0);
                self.hal.read(start, &mut data)?;
                Ok(data)
            });
        match result {
            Ok(data) => Reply::ok().bytes(&data),
            Err(code) => Reply::new(code).bytes(&[]),
        }
    }

    fn sram_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| Ok((args.u32()?, args.bytes()?)))
            .and_then(|(start, data)| self.hal.write(start, data));
        Reply::status(result)
    }

    fn sram_size_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.hal.setup() {
            Ok((size, _)) => Reply::ok().u32(size),
            Err(code) => Reply::new(code).u32(0),
        }
    }
}

impl YaapClass for LpcRomEmulationClass {
    const TYPE_NAME: &'static str = "lpcRomEmulation";
    const VERSION: Version = Version::new(1, 0, 0);

    fn methods(&self) -> Vec<Method<Self>> {
        vec![
            Method::locked(
                "enableGet",
                "bool lpcRomEmulation.enableGet(void)",
                LpcRomEmulationClass::enable_get,
            ),
            Method::locked(
                "enableSet",
                "void lpcRomEmulation.enableSet(bool enable)",
                LpcRomEmulationClass::enable_set,
            ),
            Method::locked(
                "optionRomTypeGet",
                "uint8_t lpcRomEmulation.optionRomTypeGet(void)",
                LpcRomEmulationClass::rom_type_get,
            ),
            Method::locked(
                "optionRomTypeSet",
                "void lpcRomEmulation.optionRomTypeSet(uint8_t romType)",
                LpcRomEmulationClass::rom_type_set,
            ),
            Method::locked(
                "sramGet",
                "uint8_t [] lpcRomEmulation.sramGet(uint32_t startAddr, uint32_t numBytes)",
                LpcRomEmulationClass::sram_get,
            ),
            Method::locked(
                "sramSet",
                "void lpcRomEmulation.sramSet(uint32_t startAddr, uint8_t [] data)",
                LpcRomEmulationClass::sram_set,
            ),
            Method::locked(
                "sramSizeGet",
                "int lpcRomEmulation.sramSizeGet(void)",
                LpcRomEmulationClass::sram_size_get,
            ),
        ]
    }
}
