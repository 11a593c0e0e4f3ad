//! The JTAG shift engine: header preconditions, repeat and retry policy.
use std::sync::{Arc, Mutex, MutexGuard};

use yaap_protocol::{Code, code::jtag};

use crate::hal::{HalResult, JtagHal, ShiftOp, TapState};

/// Default number of idle clocks issued before and after every shift.
pub const DEFAULT_PRE_POST_TCK: u32 = 5;

pub(crate) fn byte_len(bits: u32) -> usize {
    bits.div_ceil(8) as usize
}

/// Per register (IR or DR) shift options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShiftParams {
    pub repeat_enabled: bool,
    pub repeat_count: u32,
    pub retry_enabled: bool,
    pub retry_count: u32,
    pub retry_bits: u32,
    pub retry_mask: Vec<u8>,
    pub retry_expected: Vec<u8>,
    pub pre_tck: u32,
    pub post_tck: u32,
    pub end_state: TapState,
}

impl ShiftParams {
    pub fn new(pre_tck: u32, post_tck: u32) -> ShiftParams {
        ShiftParams {
            repeat_enabled: false,
            repeat_count: 0,
            retry_enabled: false,
            retry_count: 0,
            retry_bits: 0,
            retry_mask: Vec::new(),
            retry_expected: Vec::new(),
            pre_tck,
            post_tck,
            end_state: TapState::RunTestIdle,
        }
    }

    /// Set the TDO value a retried shift is expected to capture.
    ///
    /// Mask and expected value are truncated or zero padded to `⌈bits / 8⌉` bytes.
    pub fn set_expected(&mut self, bits: u32, mask: &[u8], expected: &[u8]) {
        let len = byte_len(bits);
        let fit = |data: &[u8]| {
            let mut out = data[..data.len().min(len)].to_vec();
            out.resize(len, 0);
            out
        };
        self.retry_bits = bits;
        self.retry_mask = fit(mask);
        self.retry_expected = fit(expected);
    }

    fn shift_count(&self) -> u32 {
        if self.repeat_enabled {
            self.repeat_count.saturating_add(1)
        } else {
            1
        }
    }

    fn tries(&self) -> u32 {
        if self.retry_enabled {
            self.retry_count.saturating_add(1)
        } else {
            1
        }
    }

    fn matches_expected(&self, out: &[u8]) -> bool {
        out.iter()
            .zip(&self.retry_mask)
            .zip(&self.retry_expected)
            .take(byte_len(self.retry_bits))
            .all(|((out, mask), expected)| out & mask == *expected)
    }
}

impl Default for ShiftParams {
    fn default() -> Self {
        ShiftParams::new(DEFAULT_PRE_POST_TCK, DEFAULT_PRE_POST_TCK)
    }
}

/// Output buffer for captured TDO data.
///
/// The buffer only grows. Cloning a `ShiftBuffer` shares the underlying
/// storage, so several JTAG objects can use one buffer.
#[derive(Clone, Debug, Default)]
pub struct ShiftBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl ShiftBuffer {
    pub fn new() -> ShiftBuffer {
        ShiftBuffer::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.guard().len()
    }

    /// Lock the buffer with room for at least `len` bytes.
    ///
    /// If growing fails the previous allocation is kept and
    /// [Code::OUT_OF_MEMORY] is returned.
    fn reserve(&self, len: usize) -> Result<MutexGuard<'_, Vec<u8>>, Code> {
        let mut buffer = self.guard();
        if len > buffer.len() {
            let additional = len - buffer.len();
            if let Err(err) = buffer.try_reserve_exact(additional) {
                log::error!("Cannot grow TDO buffer to {} bytes: {}", len, err);
                return Err(Code::OUT_OF_MEMORY);
            }
            log::debug!("TDO buffer grown from {} to {} bytes", buffer.len(), len);
            buffer.resize(len, 0);
        }
        Ok(buffer)
    }
}

fn check_header(hal: &JtagHal) -> HalResult<()> {
    let Some(header) = &hal.header else {
        return Ok(());
    };
    if !header.header.status()?.connected {
        return Err(jtag::HEADER_NOT_CONNECTED);
    }
    if !header.header.is_enabled()? {
        return Err(jtag::HEADER_NOT_ENABLED);
    }
    if let Some(change_detect) = &header.change_detect {
        if change_detect.is_changed()? {
            return Err(jtag::HEADER_STATUS_CHANGED);
        }
    }
    Ok(())
}

/// Shift `bits` bits of `input` through the IR or DR.
///
/// Returns the result code together with the captured data of every
/// repetition, `⌈bits / 8⌉` bytes each. The captured data is returned even
/// if the shift failed part way; it is empty if the header checks failed.
pub fn shift(
    hal: &JtagHal,
    op: ShiftOp,
    params: &ShiftParams,
    buffer: &ShiftBuffer,
    bits: u32,
    input: &[u8],
) -> (Code, Vec<u8>) {
    let shift_bytes = byte_len(bits);
    if input.len() < shift_bytes {
        log::error!(
            "Shift of {} bits needs {} bytes, got {}",
            bits,
            shift_bytes,
            input.len()
        );
        return (jtag::LENGTH_MISMATCH, Vec::new());
    }
    if let Err(code) = check_header(hal) {
        log::debug!("Shift rejected by header check: {}", code);
        return (code, Vec::new());
    }

    let shift_count = params.shift_count();
    let Some(out_bytes) = shift_bytes.checked_mul(shift_count as usize) else {
        return (Code::OUT_OF_MEMORY, Vec::new());
    };
    let mut out = match buffer.reserve(out_bytes) {
        Ok(out) => out,
        Err(code) => return (code, Vec::new()),
    };

    let input = &input[..shift_bytes];
    log::trace!("Shift {:?} in: {:02x?}", op, input);
    let mut code = Code::SUCCESS;
    'repeat: for repetition in 0..shift_count as usize {
        let chunk = &mut out[repetition * shift_bytes..(repetition + 1) * shift_bytes];
        for attempt in 1..=params.tries() {
            if let Err(err) = hal.jtag.shift(
                op,
                input,
                chunk,
                bits,
                params.pre_tck,
                params.post_tck,
                params.end_state,
            ) {
                code = err;
                break 'repeat;
            }
            if !params.retry_enabled || params.matches_expected(chunk) {
                code = Code::SUCCESS;
                break;
            }
            log::debug!("Shift {:?} attempt {} did not match expected TDO", op, attempt);
            code = jtag::RETRIES_EXHAUSTED;
        }
        if code != Code::SUCCESS {
            break;
        }
    }
    let captured = out[..out_bytes].to_vec();
    log::trace!("Shift {:?} out: {:02x?} ({})", op, captured, code);
    (code, captured)
}
