use yaap_protocol::{Code, Version, code::hdt, code::jtag as jtag_code};

use crate::hal::{JtagHal, ShiftOp, TapState};
use crate::registry::{Invocation, Method, Reply, YaapClass};
use crate::shift::{self, ShiftBuffer, ShiftParams};

/// Peripheral clock the TCK divisor is applied to.
const TCK_BASE_HZ: u32 = 200_000_000;

/// A JTAG chain reached through one TAP controller.
pub struct JtagClass {
    hal: JtagHal,
    ir: ShiftParams,
    dr: ShiftParams,
    buffer: ShiftBuffer,
}

impl JtagClass {
    pub fn new(hal: JtagHal, pre_tck: u32, post_tck: u32) -> JtagClass {
        JtagClass {
            hal,
            ir: ShiftParams::new(pre_tck, post_tck),
            dr: ShiftParams::new(pre_tck, post_tck),
            buffer: ShiftBuffer::new(),
        }
    }

    /// Use `buffer` for captured TDO data instead of a private one.
    pub fn with_shared_buffer(mut self, buffer: ShiftBuffer) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn ir_params(&self) -> &ShiftParams {
        &self.ir
    }

    pub fn dr_params(&self) -> &ShiftParams {
        &self.dr
    }

    fn shift(&mut self, op: ShiftOp, inv: &mut Invocation<'_>) -> Reply {
        let (bits, input) = match inv.parse(|args| Ok((args.u32()?, args.bytes()?))) {
            Ok(args) => args,
            Err(code) => return Reply::new(code).bytes(&[]),
        };
        let params = match op {
            ShiftOp::Ir => &self.ir,
            ShiftOp::Dr => &self.dr,
        };
        let (code, out) = shift::shift(&self.hal, op, params, &self.buffer, bits, input);
        Reply::new(code).bytes(&out)
    }

    fn shift_ir(&mut self, inv: &mut Invocation<'_>) -> Reply {
        self.shift(ShiftOp::Ir, inv)
    }

    fn shift_dr(&mut self, inv: &mut Invocation<'_>) -> Reply {
        self.shift(ShiftOp::Dr, inv)
    }

    fn tdo_expected_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok()
            .u32(self.ir.retry_bits)
            .bytes(&self.ir.retry_mask)
            .bytes(&self.ir.retry_expected)
            .u32(self.dr.retry_bits)
            .bytes(&self.dr.retry_mask)
            .bytes(&self.dr.retry_expected)
    }

    fn tdo_expected_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let parsed = inv.parse(|args| {
            Ok((
                args.u32()?,
                args.bytes()?,
                args.bytes()?,
                args.u32()?,
                args.bytes()?,
                args.bytes()?,
            ))
        });
        match parsed {
            Ok((ir_bits, ir_mask, ir_exp, dr_bits, dr_mask, dr_exp)) => {
                self.ir.set_expected(ir_bits, ir_mask, ir_exp);
                self.dr.set_expected(dr_bits, dr_mask, dr_exp);
                Reply::ok()
            }
            Err(code) => Reply::new(code),
        }
    }

    fn retry_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok()
            .u32(self.ir.retry_count)
            .bool(self.ir.retry_enabled)
            .u32(self.dr.retry_count)
            .bool(self.dr.retry_enabled)
    }

    fn retry_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        match inv.parse(|args| Ok((args.u32()?, args.bool()?, args.u32()?, args.bool()?))) {
            Ok((ir_count, ir_enabled, dr_count, dr_enabled)) => {
                self.ir.retry_count = ir_count;
                self.ir.retry_enabled = ir_enabled;
                self.dr.retry_count = dr_count;
                self.dr.retry_enabled = dr_enabled;
                Reply::ok()
            }
            Err(code) => Reply::new(code),
        }
    }

    fn repeat_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok()
            .u32(self.ir.repeat_count)
            .bool(self.ir.repeat_enabled)
            .u32(self.dr.repeat_count)
            .bool(self.dr.repeat_enabled)
    }

    fn repeat_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        match inv.parse(|args| Ok((args.u32()?, args.bool()?, args.u32()?, args.bool()?))) {
            Ok((ir_count, ir_enabled, dr_count, dr_enabled)) => {
                self.ir.repeat_count = ir_count;
                self.ir.repeat_enabled = ir_enabled;
                self.dr.repeat_count = dr_count;
                self.dr.repeat_enabled = dr_enabled;
                Reply::ok()
            }
            Err(code) => Reply::new(code),
        }
    }

    fn termination_state_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok()
            .u32(self.ir.end_state.raw())
            .u32(self.dr.end_state.raw())
    }

    fn termination_state_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let (ir, dr) = match inv.parse(|args| Ok((args.u32()?, args.u32()?))) {
            Ok(args) => args,
            Err(code) => return Reply::new(code),
        };
        let ir = TapState::from_raw(ir).filter(|state| state.is_valid_termination(ShiftOp::Ir));
        let dr = TapState::from_raw(dr).filter(|state| state.is_valid_termination(ShiftOp::Dr));
        match (ir, dr) {
            (Some(ir), Some(dr)) => {
                self.ir.end_state = ir;
                self.dr.end_state = dr;
                Reply::ok()
            }
            (_, None) => Reply::new(jtag_code::INVALID_DR_STATE),
            (None, _) => Reply::new(jtag_code::INVALID_IR_STATE),
        }
    }

    fn pre_post_tck_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok()
            .u32(self.ir.pre_tck)
            .u32(self.ir.post_tck)
            .u32(self.dr.pre_tck)
            .u32(self.dr.post_tck)
    }

    fn pre_post_tck_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        match inv.parse(|args| Ok((args.u32()?, args.u32()?, args.u32()?, args.u32()?))) {
            Ok((ir_pre, ir_post, dr_pre, dr_post)) => {
                self.ir.pre_tck = ir_pre;
                self.ir.post_tck = ir_post;
                self.dr.pre_tck = dr_pre;
                self.dr.post_tck = dr_post;
                Reply::ok()
            }
            Err(code) => Reply::new(code),
        }
    }

    fn enable_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.bool()).and_then(|enabled| {
            match self.hal.header.as_ref().and_then(|header| header.enable.as_ref()) {
                Some(enable) => enable.set_enabled(enabled),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        Reply::status(result)
    }

    fn enable_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match self.hal.header() {
            Some(header) => header.is_enabled(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok(enabled) => Reply::ok().bool(enabled),
            Err(code) => Reply::new(code).bool(false),
        }
    }

    fn trst_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let (assert, enable) = match inv.parse(|args| Ok((args.bool()?, args.bool()?))) {
            Ok(args) => args,
            Err(code) => return Reply::new(code),
        };
        let Some(header) = &self.hal.header else {
            return Reply::new(Code::NOT_IMPLEMENTED);
        };
        let result = header.header.is_enabled().and_then(|enabled| {
            if enabled {
                return Ok(());
            }
            if !enable {
                return Err(hdt::HEADER_NOT_ENABLED);
            }
            match &header.enable {
                Some(cap) => cap.set_enabled(true),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        let result = result.and_then(|_| match &header.trst {
            Some(trst) => trst.set_trst(assert),
            None => Err(Code::NOT_IMPLEMENTED),
        });
        Reply::status(result)
    }

    fn trst_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.header {
            Some(header) => match &header.trst {
                Some(trst) => header
                    .header
                    .is_enabled()
                    .and_then(|enabled| Ok((trst.trst()?, enabled))),
                None => Err(Code::NOT_IMPLEMENTED),
            },
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok((asserted, enabled)) => Reply::ok().bool(asserted).bool(enabled),
            Err(code) => Reply::new(code).bool(false).bool(false),
        }
    }

    fn tap_state_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.u32()).and_then(|raw| {
            let state = TapState::from_raw(raw).ok_or(jtag_code::INVALID_STATE)?;
            match &self.hal.tap_state {
                Some(control) => control.set_tap_state(state),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        Reply::status(result)
    }

    fn tap_state_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.tap_state {
            Some(control) => control.tap_state(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok(state) => Reply::ok().u32(state.raw()),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn tck_frequency_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.u32()).and_then(|divisor| {
            let hz = TCK_BASE_HZ / ((divisor & 0xfff) + 1);
            log::debug!("TCK divisor {} selects {} Hz", divisor, hz);
            match &self.hal.tck_frequency {
                Some(tck) => tck.set_tck_frequency(hz).map(|_| ()),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        Reply::status(result)
    }

    fn tck_frequency_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.tck_frequency {
            Some(tck) => tck.tck_frequency(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        let (code, hz) = match result {
            Ok(hz) => (Code::SUCCESS, hz),
            Err(code) => (code, 0),
        };
        let divisor = if hz == 0 {
            0
        } else {
            (f64::from(TCK_BASE_HZ) / f64::from(hz)).round() as u32
        };
        Reply::new(code)
            .f64(f64::from(TCK_BASE_HZ))
            .u32(divisor.saturating_sub(1))
    }
}

impl YaapClass for JtagClass {
    const TYPE_NAME: &'static str = "jtag";
    const VERSION: Version = Version::new(1, 2, 9);

    fn methods(&self) -> Vec<Method<Self>> {
        let mut methods = vec![
            Method::locked(
                "shiftIR",
                "char [] jtag.shiftIR(int numBits, char inData[])",
                JtagClass::shift_ir,
            ),
            Method::locked(
                "shiftDR",
                "char [] jtag.shiftDR(int numBits, char inData[])",
                JtagClass::shift_dr,
            ),
            Method::locked(
                "optionTdoExpectedGet",
                "struct { int irBits; char irMask[]; char irExpected[]; int drBits; char drMask[]; char drExpected[]; } jtag.optionTdoExpectedGet(void)",
                JtagClass::tdo_expected_get,
            ),
            Method::locked(
                "optionTdoExpectedSet",
                "void jtag.optionTdoExpectedSet(int irBits, char irMask[], char irExpected[], int drBits, char drMask[], char drExpected[])",
                JtagClass::tdo_expected_set,
            ),
            Method::locked(
                "optionRetryGet",
                "struct { int irCnt; bool irEn; int drCnt; bool drEn } jtag.optionRetryGet(void)",
                JtagClass::retry_get,
            ),
            Method::locked(
                "optionRetrySet",
                "void jtag.optionRetrySet(int irCnt, bool irEn, int drCnt, bool drEn)",
                JtagClass::retry_set,
            ),
            Method::locked(
                "optionRepeatGet",
                "struct { int irCnt; bool irEn; int drCnt; bool drEn } jtag.optionRepeatGet(void)",
                JtagClass::repeat_get,
            ),
            Method::locked(
                "optionRepeatSet",
                "void jtag.optionRepeatSet(int irCnt, bool irEn, int drCnt, bool drEn)",
                JtagClass::repeat_set,
            ),
            Method::locked(
                "optionTerminationStateGet",
                "struct { int irTermState; int drTermState } jtag.optionTerminationStateGet(void)",
                JtagClass::termination_state_get,
            ),
            Method::locked(
                "optionTerminationStateSet",
                "void jtag.optionTerminationStateSet(int irTermState, int drTermState)",
                JtagClass::termination_state_set,
            ),
            Method::locked(
                "optionPrePostTckGet",
                "struct { int irPre; int irPost; int drPre; int drPost; } jtag.optionPrePostTckGet(void)",
                JtagClass::pre_post_tck_get,
            ),
            Method::locked(
                "optionPrePostTckSet",
                "void jtag.optionPrePostTckSet(int irPre, int irPost, int drPre, int drPost)",
                JtagClass::pre_post_tck_set,
            ),
            Method::locked(
                "enableSet",
                "void jtag.enableSet(bool)",
                JtagClass::enable_set,
            ),
            Method::locked(
                "enableGet",
                "bool jtag.enableGet(void)",
                JtagClass::enable_get,
            ),
            Method::locked(
                "ioTrstSet",
                "void jtag.ioTrstSet(bool assert, bool enable)",
                JtagClass::trst_set,
            ),
            Method::locked(
                "ioTrstGet",
                "struct { bool asserted, bool enabled } jtag.ioTrstGet(void)",
                JtagClass::trst_get,
            ),
        ];
        if self.hal.tap_state.is_some() {
            log::debug!("JTAG supports tap state control");
            methods.push(Method::locked(
                "tapStateSet",
                "void jtag.tapStateSet(int state)",
                JtagClass::tap_state_set,
            ));
            methods.push(Method::locked(
                "tapStateGet",
                "int jtag.tapStateGet(void)",
                JtagClass::tap_state_get,
            ));
        }
        if self.hal.tck_frequency.is_some() {
            log::debug!("JTAG supports TCK frequency control");
            methods.push(Method::locked(
                "optionTckFrequencySet",
                "void jtag.optionTckFrequencySet(int divisor)",
                JtagClass::tck_frequency_set,
            ));
            methods.push(Method::locked(
                "optionTckFrequencyGet",
                "struct { double maxFreqHz; int divisor; } jtag.optionTckFrequencyGet(void)",
                JtagClass::tck_frequency_get,
            ));
        }
        methods
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use yaap_protocol::{Code, code::jtag};

    use crate::classes::testing::{Harness, LoopbackJtag};
    use crate::hal::{JtagHal, TapState};

    use super::JtagClass;

    fn harness() -> Harness<JtagClass> {
        Harness::new(JtagClass::new(JtagHal::new(LoopbackJtag::new()), 5, 5))
    }

    #[rstest]
    #[case(TapState::TestLogicReset, TapState::PauseDr, Code::SUCCESS)]
    #[case(TapState::ShiftIr, TapState::ShiftDr, Code::SUCCESS)]
    #[case(TapState::ShiftDr, TapState::RunTestIdle, jtag::INVALID_IR_STATE)]
    #[case(TapState::PauseIr, TapState::UpdateDr, jtag::INVALID_DR_STATE)]
    #[case(TapState::Exit1Ir, TapState::Exit2Dr, jtag::INVALID_DR_STATE)]
    fn termination_states(#[case] ir: TapState, #[case] dr: TapState, #[case] expected: Code) {
        let mut harness = harness();
        let reply = harness.call("optionTerminationStateSet", |args| {
            args.u32(ir.raw()).u32(dr.raw());
        });
        assert_eq!(reply.code, expected);
        let state = (
            harness.object().ir_params().end_state,
            harness.object().dr_params().end_state,
        );
        if expected == Code::SUCCESS {
            assert_eq!(state, (ir, dr));
        } else {
            assert_eq!(state, (TapState::RunTestIdle, TapState::RunTestIdle));
        }
    }

    #[test]
    fn shift_returns_captured_bytes() {
        let mut harness = harness();
        let reply = harness.call("shiftIR", |args| {
            args.u32(8).bytes(&[0xAA]);
        });
        assert_eq!(reply.code, Code::SUCCESS);
        assert_eq!(&reply.data[..], &[0, 0, 0, 1, 0xAA]);
    }

    #[test]
    fn expected_value_round_trips_padded() {
        let mut harness = harness();
        let reply = harness.call("optionTdoExpectedSet", |args| {
            args.u32(12).bytes(&[0xFF]).bytes(&[1, 2, 3]).u32(0).bytes(&[]).bytes(&[]);
        });
        assert_eq!(reply.code, Code::SUCCESS);
        let reply = harness.call("optionTdoExpectedGet", |_| {});
        assert_eq!(
            &reply.data[..],
            &[
                0, 0, 0, 12, 0, 0, 0, 2, 0xFF, 0, 0, 0, 0, 2, 1, 2, //
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            ]
        );
    }

    #[test]
    fn optional_methods_follow_capabilities() {
        let harness = harness();
        assert!(harness.method_id("tapStateSet").is_none());
        assert!(harness.method_id("optionTckFrequencyGet").is_none());
        assert_eq!(harness.method_id("shiftIR"), Some(8));
        assert_eq!(harness.method_id("ioTrstGet"), Some(23));
    }

    #[test]
    fn enable_without_header_is_not_implemented() {
        let mut harness = harness();
        let reply = harness.call("enableGet", |_| {});
        assert_eq!(reply.code, Code::NOT_IMPLEMENTED);
        let reply = harness.call("ioTrstSet", |args| {
            args.bool(true).bool(true);
        });
        assert_eq!(reply.code, Code::NOT_IMPLEMENTED);
    }
}
