//! # Simulated Board Backend
//!
//! An in-memory board that implements every HAL capability, for running the
//! daemon on a development host and for exercising clients without hardware.
//!
//! - JTAG is a loopback: TDO returns what was shifted in on TDI.
//! - Asserting DBREQ halts all cores, so DBRDY follows DBREQ.
//! - The I2C bus carries a 256 byte EEPROM at address 0x50.
//! - POST codes are injected with [SimPostCode::emit].
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use yaap_protocol::{
    Code, Version,
    code::{hdt as hdt_code, i2c as i2c_code, system as system_code},
};
use yaap_server::hal::{
    HalResult, Hdt, Header, I2c, Jtag, LockChange, LpcPostCode, LpcRomEmulator, Relay, ShiftOp,
    System, TapState, Triggers,
    hdt::{
        DbrdyMask, DbrdySnapshot, DbreqOnDbrdy, DbreqOnReset, DbreqOnTrigger, DbreqPulseWidth,
        DbreqSource, DbreqSourceSnapshot, DbreqTrigger, ManualTriggers, PwrokSense, ResetSense,
        TriggerConfig,
    },
    header::{HeaderChangeDetect, HeaderEnable, HeaderStatus, Trst},
    i2c::{I2cTransfer, SclFrequency},
    jtag::{TapStateControl, TckFrequency},
    lpc::{FifoSetup, FifoStatus, PostCodeEntry, PostCodeFifo},
    relay::RelayPulse,
    system::{
        BoardInfo, BoardInfoSource, DeviceReset, Firmware, FirmwareInfo, FirmwareStatus,
    },
};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fastest TCK of the hardware shift engine.
const HW_TCK_MAX_HZ: u32 = 100_000_000;
/// Fastest TCK when the TAP is bit-banged over GPIO.
const SW_TCK_MAX_HZ: u32 = 1_000_000;
const DEFAULT_TCK_HZ: u32 = 5_000_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JtagMode {
    Hardware,
    Software,
}

#[derive(Debug)]
struct JtagState {
    tap: TapState,
    tck_hz: u32,
}

pub struct SimJtag {
    mode: JtagMode,
    state: Mutex<JtagState>,
}

impl SimJtag {
    pub fn new(mode: JtagMode) -> SimJtag {
        SimJtag {
            mode,
            state: Mutex::new(JtagState {
                tap: TapState::TestLogicReset,
                tck_hz: DEFAULT_TCK_HZ.min(SimJtag::max_tck(mode)),
            }),
        }
    }

    fn max_tck(mode: JtagMode) -> u32 {
        match mode {
            JtagMode::Hardware => HW_TCK_MAX_HZ,
            JtagMode::Software => SW_TCK_MAX_HZ,
        }
    }
}

impl Jtag for SimJtag {
    fn shift(
        &self,
        op: ShiftOp,
        tdi: &[u8],
        tdo: &mut [u8],
        bits: u32,
        pre_tck: u32,
        post_tck: u32,
        end_state: TapState,
    ) -> HalResult<()> {
        let bytes = bits.div_ceil(8) as usize;
        let len = bytes.min(tdi.len()).min(tdo.len());
        tdo[..len].copy_from_slice(&tdi[..len]);
        if bits % 8 != 0 && len == bytes && len > 0 {
            tdo[len - 1] &= (1u8 << (bits % 8)) - 1;
        }
        let mut state = locked(&self.state);
        log::trace!(
            "{:?} shift of {} bits ({} + {} idle clocks) from {:?} to {:?}",
            op,
            bits,
            pre_tck,
            post_tck,
            state.tap,
            end_state
        );
        state.tap = end_state;
        Ok(())
    }

    fn reset_tap(&self) -> HalResult<()> {
        locked(&self.state).tap = TapState::TestLogicReset;
        Ok(())
    }
}

impl TapStateControl for SimJtag {
    fn tap_state(&self) -> HalResult<TapState> {
        Ok(locked(&self.state).tap)
    }

    fn set_tap_state(&self, state: TapState) -> HalResult<()> {
        let mut current = locked(&self.state);
        log::trace!("TMS path {:?}", current.tap.path_to(state));
        current.tap = state;
        Ok(())
    }
}

impl TckFrequency for SimJtag {
    fn tck_frequency(&self) -> HalResult<u32> {
        Ok(locked(&self.state).tck_hz)
    }

    fn set_tck_frequency(&self, hz: u32) -> HalResult<u32> {
        if hz == 0 {
            return Err(Code::INVALID_SETTING);
        }
        let hz = hz.min(SimJtag::max_tck(self.mode));
        locked(&self.state).tck_hz = hz;
        Ok(hz)
    }
}

#[derive(Debug, Default)]
struct HeaderState {
    enabled: bool,
    trst: bool,
    changed: bool,
}

/// The CPU debug header. Always connected, never in conflict.
#[derive(Default)]
pub struct SimHeader {
    state: Mutex<HeaderState>,
}

impl Header for SimHeader {
    fn status(&self) -> HalResult<HeaderStatus> {
        Ok(HeaderStatus {
            connected: true,
            mode: "HDT+".to_owned(),
        })
    }

    fn is_enabled(&self) -> HalResult<bool> {
        Ok(locked(&self.state).enabled)
    }

    fn is_in_conflict(&self) -> HalResult<bool> {
        Ok(false)
    }
}

impl HeaderEnable for SimHeader {
    fn set_enabled(&self, enabled: bool) -> HalResult<()> {
        let mut state = locked(&self.state);
        if state.enabled != enabled {
            state.changed = true;
        }
        state.enabled = enabled;
        Ok(())
    }
}

impl HeaderChangeDetect for SimHeader {
    fn is_changed(&self) -> HalResult<bool> {
        Ok(locked(&self.state).changed)
    }

    fn clear_changed(&self) -> HalResult<()> {
        locked(&self.state).changed = false;
        Ok(())
    }
}

impl Trst for SimHeader {
    fn set_trst(&self, asserted: bool) -> HalResult<()> {
        locked(&self.state).trst = asserted;
        Ok(())
    }

    fn trst(&self) -> HalResult<bool> {
        Ok(locked(&self.state).trst)
    }
}

pub const TRIGGER_CHANNELS: usize = 2;

#[derive(Debug)]
struct HdtState {
    dbreq: bool,
    dbrdy: u8,
    dbrdy_snapshot: u8,
    dbreq_source: DbreqSource,
    on_dbrdy: bool,
    on_reset: bool,
    on_trigger: DbreqTrigger,
    pulse_usec: u32,
    mask: u8,
    triggers: [TriggerConfig; TRIGGER_CHANNELS],
    manual: [bool; TRIGGER_CHANNELS],
}

/// HDT sideband signals of an eight core target.
pub struct SimHdt {
    state: Mutex<HdtState>,
}

impl Default for SimHdt {
    fn default() -> Self {
        let mut triggers = [TriggerConfig::default(); TRIGGER_CHANNELS];
        for (channel, config) in triggers.iter_mut().enumerate() {
            config.channel = channel as u32;
        }
        SimHdt {
            state: Mutex::new(HdtState {
                dbreq: false,
                dbrdy: 0,
                dbrdy_snapshot: 0,
                dbreq_source: DbreqSource::None,
                on_dbrdy: false,
                on_reset: false,
                on_trigger: DbreqTrigger::default(),
                pulse_usec: 1,
                mask: 0xff,
                triggers,
                manual: [false; TRIGGER_CHANNELS],
            }),
        }
    }
}

fn channel(channel: u32) -> HalResult<usize> {
    let idx = channel as usize;
    if idx < TRIGGER_CHANNELS {
        Ok(idx)
    } else {
        Err(hdt_code::INVALID_TRIGGER_CHAN)
    }
}

impl Hdt for SimHdt {
    fn dbreq(&self) -> HalResult<bool> {
        Ok(locked(&self.state).dbreq)
    }

    fn set_dbreq(&self, asserted: bool) -> HalResult<()> {
        let mut state = locked(&self.state);
        state.dbreq = asserted;
        if asserted {
            state.dbrdy = state.mask;
            state.dbrdy_snapshot |= state.dbrdy;
            state.dbreq_source = DbreqSource::Host;
        } else {
            state.dbrdy = 0;
        }
        Ok(())
    }

    fn dbrdy(&self) -> HalResult<u8> {
        Ok(locked(&self.state).dbrdy)
    }
}

impl DbrdySnapshot for SimHdt {
    fn dbrdy_snapshot(&self) -> HalResult<u8> {
        Ok(locked(&self.state).dbrdy_snapshot)
    }

    fn clear_dbrdy_snapshot(&self) -> HalResult<()> {
        locked(&self.state).dbrdy_snapshot = 0;
        Ok(())
    }
}

impl DbreqSourceSnapshot for SimHdt {
    fn dbreq_source_snapshot(&self) -> HalResult<DbreqSource> {
        Ok(locked(&self.state).dbreq_source)
    }

    fn clear_dbreq_source_snapshot(&self) -> HalResult<()> {
        locked(&self.state).dbreq_source = DbreqSource::None;
        Ok(())
    }
}

impl ResetSense for SimHdt {
    fn reset(&self) -> HalResult<bool> {
        Ok(false)
    }
}

impl PwrokSense for SimHdt {
    fn pwrok(&self) -> HalResult<bool> {
        Ok(true)
    }
}

impl DbreqOnDbrdy for SimHdt {
    fn set_dbreq_on_dbrdy(&self, enabled: bool) -> HalResult<()> {
        locked(&self.state).on_dbrdy = enabled;
        Ok(())
    }

    fn dbreq_on_dbrdy(&self) -> HalResult<bool> {
        Ok(locked(&self.state).on_dbrdy)
    }
}

impl DbreqOnReset for SimHdt {
    fn set_dbreq_on_reset(&self, enabled: bool) -> HalResult<()> {
        locked(&self.state).on_reset = enabled;
        Ok(())
    }

    fn dbreq_on_reset(&self) -> HalResult<bool> {
        Ok(locked(&self.state).on_reset)
    }
}

impl DbreqOnTrigger for SimHdt {
    fn set_dbreq_on_trigger(&self, config: DbreqTrigger) -> HalResult<()> {
        locked(&self.state).on_trigger = config;
        Ok(())
    }

    fn dbreq_on_trigger(&self) -> HalResult<DbreqTrigger> {
        Ok(locked(&self.state).on_trigger)
    }
}

impl DbreqPulseWidth for SimHdt {
    fn dbreq_pulse_width(&self) -> HalResult<u32> {
        Ok(locked(&self.state).pulse_usec)
    }

    fn set_dbreq_pulse_width(&self, usec: u32) -> HalResult<u32> {
        let usec = usec.clamp(1, 0xffff);
        locked(&self.state).pulse_usec = usec;
        Ok(usec)
    }
}

impl DbrdyMask for SimHdt {
    fn set_dbrdy_mask(&self, mask: u8) -> HalResult<()> {
        locked(&self.state).mask = mask;
        Ok(())
    }

    fn dbrdy_mask(&self) -> HalResult<u8> {
        Ok(locked(&self.state).mask)
    }
}

impl Triggers for SimHdt {
    fn set_trigger_setup(&self, config: &TriggerConfig) -> HalResult<()> {
        let idx = channel(config.channel)?;
        locked(&self.state).triggers[idx] = *config;
        Ok(())
    }

    fn trigger_setup(&self, channel_id: u32) -> HalResult<TriggerConfig> {
        let idx = channel(channel_id)?;
        Ok(locked(&self.state).triggers[idx])
    }
}

impl ManualTriggers for SimHdt {
    fn set_trigger(&self, channel_id: u32, asserted: bool) -> HalResult<()> {
        let idx = channel(channel_id)?;
        locked(&self.state).manual[idx] = asserted;
        Ok(())
    }

    fn trigger(&self, channel_id: u32) -> HalResult<bool> {
        let idx = channel(channel_id)?;
        Ok(locked(&self.state).manual[idx])
    }
}

const RELAY_PULSE_MAX_MSEC: u32 = 10_000;

pub struct SimRelay {
    index: usize,
    closed: Mutex<bool>,
}

impl SimRelay {
    pub fn new(index: usize) -> SimRelay {
        SimRelay {
            index,
            closed: Mutex::new(false),
        }
    }
}

impl Relay for SimRelay {
    fn set(&self, closed: bool) -> HalResult<()> {
        log::debug!("relay{} {}", self.index, if closed { "closed" } else { "open" });
        *locked(&self.closed) = closed;
        Ok(())
    }

    fn get(&self) -> HalResult<bool> {
        Ok(*locked(&self.closed))
    }
}

impl RelayPulse for SimRelay {
    fn pulse(&self, msec: u32) -> HalResult<u32> {
        let msec = msec.clamp(1, RELAY_PULSE_MAX_MSEC);
        log::debug!("relay{} pulsed for {} ms", self.index, msec);
        Ok(msec)
    }
}

pub const EEPROM_ADDRESS: u8 = 0x50;
const EEPROM_SIZE: usize = 256;
const I2C_MAX_TRANSFER: usize = 4096;
const I2C_MAX_SCL_HZ: u32 = 1_000_000;

#[derive(Debug)]
struct I2cState {
    eeprom: [u8; EEPROM_SIZE],
    pointer: u8,
    scl_hz: u32,
}

/// One I2C bus with a single EEPROM behind a one byte address pointer.
pub struct SimI2c {
    state: Mutex<I2cState>,
}

impl Default for SimI2c {
    fn default() -> Self {
        let mut eeprom = [0xff; EEPROM_SIZE];
        let fru = b"YAAPD SIMULATED BOARD";
        eeprom[..fru.len()].copy_from_slice(fru);
        SimI2c {
            state: Mutex::new(I2cState {
                eeprom,
                pointer: 0,
                scl_hz: 100_000,
            }),
        }
    }
}

impl I2c for SimI2c {
    fn transfer(&self, addr: u8, write: &[u8], read_len: usize) -> HalResult<I2cTransfer> {
        if write.len() + read_len > I2C_MAX_TRANSFER {
            return Err(i2c_code::TRANSFER_TOO_LARGE);
        }
        if addr != EEPROM_ADDRESS {
            return Err(i2c_code::ADDRESS_NAK);
        }
        let mut state = locked(&self.state);
        if let Some((&pointer, data)) = write.split_first() {
            state.pointer = pointer;
            for byte in data {
                let at = state.pointer as usize;
                state.eeprom[at] = *byte;
                state.pointer = state.pointer.wrapping_add(1);
            }
        }
        let mut read = Vec::with_capacity(read_len);
        for _ in 0..read_len {
            read.push(state.eeprom[state.pointer as usize]);
            state.pointer = state.pointer.wrapping_add(1);
        }
        Ok(I2cTransfer {
            written: write.len() as u32,
            read,
        })
    }
}

impl SclFrequency for SimI2c {
    fn scl_frequency(&self) -> HalResult<u32> {
        Ok(locked(&self.state).scl_hz)
    }

    fn set_scl_frequency(&self, hz: u32) -> HalResult<u32> {
        if hz == 0 || hz > I2C_MAX_SCL_HZ {
            return Err(Code::INVALID_SETTING);
        }
        locked(&self.state).scl_hz = hz;
        Ok(hz)
    }
}

const FIFO_ENTRIES: usize = 512;

#[derive(Debug)]
struct PostCodeState {
    enabled: bool,
    port: u32,
    passive: bool,
    last: u32,
    fifo: VecDeque<PostCodeEntry>,
    overflow: bool,
    circular: bool,
    discard: bool,
    auto_clear: bool,
    timestamp: u64,
}

/// POST code snooper with a capture FIFO.
pub struct SimPostCode {
    state: Mutex<PostCodeState>,
}

impl Default for SimPostCode {
    fn default() -> Self {
        SimPostCode {
            state: Mutex::new(PostCodeState {
                enabled: true,
                port: 0x80,
                passive: false,
                last: 0,
                fifo: VecDeque::with_capacity(FIFO_ENTRIES),
                overflow: false,
                circular: true,
                discard: false,
                auto_clear: false,
                timestamp: 0,
            }),
        }
    }
}

impl SimPostCode {
    /// Simulate the host writing `code` to the monitored port.
    pub fn emit(&self, code: u8) {
        let mut state = locked(&self.state);
        if !state.enabled {
            return;
        }
        state.last = u32::from(code);
        state.timestamp += 1;
        let entry = PostCodeEntry {
            data: code,
            offset: 0,
            flag: false,
            timestamp: state.timestamp,
        };
        if state.fifo.len() == FIFO_ENTRIES {
            state.overflow = true;
            if state.discard || !state.circular {
                return;
            }
            state.fifo.pop_front();
        }
        state.fifo.push_back(entry);
    }
}

impl LpcPostCode for SimPostCode {
    fn set_enabled(&self, enabled: bool) -> HalResult<()> {
        locked(&self.state).enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> HalResult<bool> {
        Ok(locked(&self.state).enabled)
    }

    fn post_code(&self) -> HalResult<u32> {
        Ok(locked(&self.state).last)
    }

    fn set_port(&self, port: u32) -> HalResult<()> {
        locked(&self.state).port = port;
        Ok(())
    }

    fn port(&self) -> HalResult<u32> {
        Ok(locked(&self.state).port)
    }

    fn set_passive(&self, passive: bool) -> HalResult<()> {
        locked(&self.state).passive = passive;
        Ok(())
    }

    fn passive(&self) -> HalResult<bool> {
        Ok(locked(&self.state).passive)
    }
}

impl PostCodeFifo for SimPostCode {
    fn dump(&self) -> HalResult<Vec<PostCodeEntry>> {
        let mut state = locked(&self.state);
        let entries = state.fifo.iter().copied().collect();
        if state.auto_clear {
            state.fifo.clear();
        }
        Ok(entries)
    }

    fn clear(&self) -> HalResult<()> {
        locked(&self.state).fifo.clear();
        Ok(())
    }

    fn status(&self) -> HalResult<FifoStatus> {
        let state = locked(&self.state);
        Ok(FifoStatus {
            entries: state.fifo.len() as u32,
            overflow: state.overflow,
            full: state.fifo.len() == FIFO_ENTRIES,
            empty: state.fifo.is_empty(),
        })
    }

    fn clear_status(&self) -> HalResult<()> {
        locked(&self.state).overflow = false;
        Ok(())
    }

    fn setup(&self) -> HalResult<FifoSetup> {
        let state = locked(&self.state);
        Ok(FifoSetup {
            entries: FIFO_ENTRIES as u32,
            circular: state.circular,
            discard: state.discard,
            auto_clear: state.auto_clear,
        })
    }

    fn set_circular(&self, circular: bool) -> HalResult<()> {
        locked(&self.state).circular = circular;
        Ok(())
    }

    fn set_discard(&self, discard: bool) -> HalResult<()> {
        locked(&self.state).discard = discard;
        Ok(())
    }

    fn set_auto_clear(&self, auto_clear: bool) -> HalResult<()> {
        locked(&self.state).auto_clear = auto_clear;
        Ok(())
    }
}

/// Large enough for the biggest supported part (16 Mbit).
const ROM_SRAM_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug)]
struct RomState {
    enabled: bool,
    device: String,
    sram: Vec<u8>,
}

pub struct SimRom {
    state: Mutex<RomState>,
}

impl Default for SimRom {
    fn default() -> Self {
        SimRom {
            state: Mutex::new(RomState {
                enabled: false,
                device: "SST49LF080A".to_owned(),
                sram: vec![0xff; ROM_SRAM_SIZE],
            }),
        }
    }
}

fn sram_range(start: u32, len: usize) -> HalResult<std::ops::Range<usize>> {
    let start = start as usize;
    match start.checked_add(len) {
        Some(end) if end <= ROM_SRAM_SIZE => Ok(start..end),
        _ => Err(Code::TOO_BIG),
    }
}

impl LpcRomEmulator for SimRom {
    fn set_enabled(&self, enabled: bool) -> HalResult<()> {
        locked(&self.state).enabled = enabled;
        Ok(())
    }

    fn is_enabled(&self) -> HalResult<bool> {
        Ok(locked(&self.state).enabled)
    }

    fn setup(&self) -> HalResult<(u32, String)> {
        let state = locked(&self.state);
        Ok((state.sram.len() as u32, state.device.clone()))
    }

    fn set_device(&self, device: &str) -> HalResult<()> {
        locked(&self.state).device = device.to_owned();
        Ok(())
    }

    fn write(&self, start: u32, data: &[u8]) -> HalResult<()> {
        let range = sram_range(start, data.len())?;
        locked(&self.state).sram[range].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, start: u32, data: &mut [u8]) -> HalResult<()> {
        let range = sram_range(start, data.len())?;
        data.copy_from_slice(&locked(&self.state).sram[range]);
        Ok(())
    }
}

const FIRMWARE_TYPES: [&str; 2] = ["bmc", "cpld"];

#[derive(Debug, Default)]
struct SystemState {
    mux: bool,
    updated: Vec<String>,
}

/// Identity, firmware and reset of the simulated BMC.
pub struct SimSystem {
    name: String,
    state: Mutex<SystemState>,
}

impl SimSystem {
    pub fn new(name: impl Into<String>) -> SimSystem {
        SimSystem {
            name: name.into(),
            state: Mutex::new(SystemState::default()),
        }
    }
}

impl System for SimSystem {
    fn device_name(&self) -> HalResult<String> {
        Ok(self.name.clone())
    }

    fn yaap_key(&self) -> HalResult<[u8; 16]> {
        Ok(*b"yaapd-simulated!")
    }

    fn lock_changed(&self, change: LockChange) -> HalResult<()> {
        log::info!("Session lock changed: {:?}", change);
        Ok(())
    }

    fn config_mux(&self, enable: bool) -> HalResult<()> {
        let mut state = locked(&self.state);
        if state.mux != enable {
            log::info!("Debug signals routed to {}", if enable { "BMC" } else { "host" });
        }
        state.mux = enable;
        Ok(())
    }
}

impl Firmware for SimSystem {
    fn firmware_info(&self) -> HalResult<Vec<FirmwareInfo>> {
        Ok(FIRMWARE_TYPES
            .iter()
            .map(|kind| FirmwareInfo {
                kind: (*kind).to_owned(),
                version: Version::new(1, 0, 0),
            })
            .collect())
    }

    fn update_firmware(&self, kind: &str, image: &[u8]) -> HalResult<()> {
        if !FIRMWARE_TYPES.contains(&kind) {
            return Err(system_code::INVALID_FW_TYPE);
        }
        log::info!("Accepted {} byte {} image", image.len(), kind);
        locked(&self.state).updated.push(kind.to_owned());
        Ok(())
    }

    fn firmware_status(&self, kind: &str) -> HalResult<FirmwareStatus> {
        if !FIRMWARE_TYPES.contains(&kind) {
            return Err(system_code::INVALID_FW_TYPE);
        }
        let done = locked(&self.state).updated.iter().any(|updated| updated == kind);
        Ok(FirmwareStatus {
            status: 0,
            percent: if done { 100 } else { 0 },
        })
    }
}

impl BoardInfoSource for SimSystem {
    fn boards(&self) -> HalResult<Vec<BoardInfo>> {
        Ok(vec![BoardInfo {
            name: "Simulated target".to_owned(),
            part_no: "SIM-0001".to_owned(),
            revision: "A".to_owned(),
            serial_no: "0000000001".to_owned(),
        }])
    }
}

impl DeviceReset for SimSystem {
    fn reset(&self) -> HalResult<()> {
        log::warn!("Simulated BMC reset");
        Ok(())
    }
}

/// Every device of the simulated board.
pub struct SimBoard {
    pub system: Arc<SimSystem>,
    pub jtag: Arc<SimJtag>,
    pub header: Arc<SimHeader>,
    pub hdt: Arc<SimHdt>,
    pub relays: Vec<Arc<SimRelay>>,
    pub i2c: Arc<SimI2c>,
    pub post_code: Arc<SimPostCode>,
    pub rom: Arc<SimRom>,
}

pub const RELAY_COUNT: usize = 4;
const BOOT_POST_CODES: [u8; 6] = [0x01, 0x10, 0x2b, 0x60, 0xa0, 0xb0];

impl SimBoard {
    pub fn new(name: impl Into<String>, jtag_mode: JtagMode) -> SimBoard {
        SimBoard {
            system: Arc::new(SimSystem::new(name)),
            jtag: Arc::new(SimJtag::new(jtag_mode)),
            header: Arc::new(SimHeader::default()),
            hdt: Arc::new(SimHdt::default()),
            relays: (0..RELAY_COUNT).map(|idx| Arc::new(SimRelay::new(idx))).collect(),
            i2c: Arc::new(SimI2c::default()),
            post_code: Arc::new(SimPostCode::default()),
            rom: Arc::new(SimRom::default()),
        }
    }

    /// Run the host through a short boot so the POST code FIFO has content.
    pub fn power_on(&self) {
        for code in BOOT_POST_CODES {
            self.post_code.emit(code);
        }
    }
}
