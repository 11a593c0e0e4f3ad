use std::collections::VecDeque;
use std::sync::Arc;

use super::{HalResult, Header, HeaderHal};

/// The 16 states of the IEEE 1149.1 TAP controller, numbered as on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum TapState {
    TestLogicReset = 0,
    RunTestIdle = 1,
    SelectDr = 2,
    CaptureDr = 3,
    ShiftDr = 4,
    Exit1Dr = 5,
    PauseDr = 6,
    Exit2Dr = 7,
    UpdateDr = 8,
    SelectIr = 9,
    CaptureIr = 10,
    ShiftIr = 11,
    Exit1Ir = 12,
    PauseIr = 13,
    Exit2Ir = 14,
    UpdateIr = 15,
}

impl TapState {
    pub const ALL: [TapState; 16] = [
        TapState::TestLogicReset,
        TapState::RunTestIdle,
        TapState::SelectDr,
        TapState::CaptureDr,
        TapState::ShiftDr,
        TapState::Exit1Dr,
        TapState::PauseDr,
        TapState::Exit2Dr,
        TapState::UpdateDr,
        TapState::SelectIr,
        TapState::CaptureIr,
        TapState::ShiftIr,
        TapState::Exit1Ir,
        TapState::PauseIr,
        TapState::Exit2Ir,
        TapState::UpdateIr,
    ];

    /// Number of TCK cycles with TMS held high that reach Test-Logic-Reset from any state.
    pub const RESET_CLOCKS: usize = 5;

    pub fn from_raw(raw: u32) -> Option<TapState> {
        TapState::ALL.get(raw as usize).copied()
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    /// The state the controller enters on the next TCK edge for the given TMS level.
    pub fn next(self, tms: bool) -> TapState {
        use TapState::*;
        match (self, tms) {
            (TestLogicReset, false) => RunTestIdle,
            (TestLogicReset, true) => TestLogicReset,
            (RunTestIdle, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDr,
            (SelectDr, false) => CaptureDr,
            (SelectDr, true) => SelectIr,
            (CaptureDr, false) => ShiftDr,
            (CaptureDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (Exit1Dr, false) => PauseDr,
            (Exit1Dr, true) => UpdateDr,
            (PauseDr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (Exit2Dr, false) => ShiftDr,
            (Exit2Dr, true) => UpdateDr,
            (UpdateDr, false) => RunTestIdle,
            (UpdateDr, true) => SelectDr,
            (SelectIr, false) => CaptureIr,
            (SelectIr, true) => TestLogicReset,
            (CaptureIr, false) => ShiftIr,
            (CaptureIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (Exit1Ir, false) => PauseIr,
            (Exit1Ir, true) => UpdateIr,
            (PauseIr, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (Exit2Ir, false) => ShiftIr,
            (Exit2Ir, true) => UpdateIr,
            (UpdateIr, false) => RunTestIdle,
            (UpdateIr, true) => SelectDr,
        }
    }

    /// Shortest TMS sequence leading from `self` to `target`. Empty if already there.
    pub fn path_to(self, target: TapState) -> Vec<bool> {
        let mut previous: [Option<(TapState, bool)>; 16] = [None; 16];
        let mut queue = VecDeque::from([self]);
        let mut seen = [false; 16];
        seen[self as usize] = true;
        while let Some(state) = queue.pop_front() {
            if state == target {
                break;
            }
            for tms in [false, true] {
                let next = state.next(tms);
                if !seen[next as usize] {
                    seen[next as usize] = true;
                    previous[next as usize] = Some((state, tms));
                    queue.push_back(next);
                }
            }
        }
        let mut path = Vec::new();
        let mut cursor = target;
        while let Some((state, tms)) = previous[cursor as usize] {
            path.push(tms);
            cursor = state;
        }
        path.reverse();
        path
    }

    /// Whether a shift of the given kind may leave the controller in this state.
    pub fn is_valid_termination(self, op: ShiftOp) -> bool {
        use TapState::*;
        match op {
            ShiftOp::Ir => matches!(self, TestLogicReset | RunTestIdle | ShiftIr | PauseIr),
            ShiftOp::Dr => matches!(self, TestLogicReset | RunTestIdle | ShiftDr | PauseDr),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShiftOp {
    Ir,
    Dr,
}

/// A JTAG controller.
pub trait Jtag: Send + Sync {
    /// Shift `bits` bits of `tdi` through the selected register, capturing TDO into `tdo`.
    ///
    /// `pre_tck` and `post_tck` idle clocks are issued around the shift and the
    /// controller is left in `end_state`. Both buffers hold at least `⌈bits / 8⌉` bytes.
    #[allow(clippy::too_many_arguments)]
    fn shift(
        &self,
        op: ShiftOp,
        tdi: &[u8],
        tdo: &mut [u8],
        bits: u32,
        pre_tck: u32,
        post_tck: u32,
        end_state: TapState,
    ) -> HalResult<()>;

    /// Force Test-Logic-Reset independent of the current state.
    fn reset_tap(&self) -> HalResult<()>;
}

/// Direct access to the TAP controller state.
pub trait TapStateControl: Send + Sync {
    fn tap_state(&self) -> HalResult<TapState>;
    fn set_tap_state(&self, state: TapState) -> HalResult<()>;
}

/// Adjustable TCK.
pub trait TckFrequency: Send + Sync {
    fn tck_frequency(&self) -> HalResult<u32>;
    /// Returns the frequency actually configured.
    fn set_tck_frequency(&self, hz: u32) -> HalResult<u32>;
}

/// Everything a `jtag` object needs from the board.
#[derive(Clone)]
pub struct JtagHal {
    pub jtag: Arc<dyn Jtag>,
    pub header: Option<HeaderHal>,
    pub tap_state: Option<Arc<dyn TapStateControl>>,
    pub tck_frequency: Option<Arc<dyn TckFrequency>>,
}

impl JtagHal {
    pub fn new(jtag: Arc<dyn Jtag>) -> JtagHal {
        JtagHal {
            jtag,
            header: None,
            tap_state: None,
            tck_frequency: None,
        }
    }

    pub fn with_header(mut self, header: HeaderHal) -> Self {
        self.header = Some(header);
        self
    }

    pub fn with_tap_state(mut self, tap_state: Arc<dyn TapStateControl>) -> Self {
        self.tap_state = Some(tap_state);
        self
    }

    pub fn with_tck_frequency(mut self, tck: Arc<dyn TckFrequency>) -> Self {
        self.tck_frequency = Some(tck);
        self
    }

    pub fn header(&self) -> Option<&Arc<dyn Header>> {
        self.header.as_ref().map(|header| &header.header)
    }
}

#[cfg(test)]
mod test {
    use super::{ShiftOp, TapState};

    #[test]
    fn five_tms_high_clocks_reset_from_every_state() {
        for state in TapState::ALL {
            let end = (0..TapState::RESET_CLOCKS).fold(state, |s, _| s.next(true));
            assert_eq!(end, TapState::TestLogicReset, "from {:?}", state);
        }
    }

    #[test]
    fn path_reaches_target() {
        for from in TapState::ALL {
            for to in TapState::ALL {
                let end = from.path_to(to).into_iter().fold(from, TapState::next);
                assert_eq!(end, to);
            }
        }
        assert_eq!(
            TapState::RunTestIdle.path_to(TapState::ShiftIr),
            vec![true, true, false, false]
        );
    }

    #[test]
    fn raw_values_round_trip() {
        assert_eq!(TapState::from_raw(13), Some(TapState::PauseIr));
        assert_eq!(TapState::from_raw(16), None);
        assert!(TapState::PauseDr.is_valid_termination(ShiftOp::Dr));
        assert!(!TapState::PauseDr.is_valid_termination(ShiftOp::Ir));
    }
}
