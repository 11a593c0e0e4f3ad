use std::sync::Arc;

use super::{HalResult, HeaderHal};

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
        #[repr(u32)]
        pub enum $name {
            #[default]
            $($variant = $value),+
        }

        impl $name {
            pub fn from_raw(raw: u32) -> Option<$name> {
                match raw {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn raw(self) -> u32 {
                self as u32
            }
        }
    };
}

wire_enum!(
    /// Why DBREQ was last asserted.
    DbreqSource {
        None = 0,
        Host = 1,
        Dbrdy = 2,
        Reset = 3,
        TriggerIn = 4,
    }
);

wire_enum!(
    TriggerSource {
        A = 0,
        B = 1,
        AOrB = 2,
        AAndB = 3,
        AXorB = 4,
    }
);

wire_enum!(
    TriggerEvent {
        Level = 0,
        RisingEdge = 1,
        FallingEdge = 2,
        BothEdges = 3,
    }
);

wire_enum!(
    TriggerDirection {
        Input = 0,
        Output = 1,
    }
);

wire_enum!(
    TriggerLevel {
        V3_3 = 0,
        V5 = 1,
    }
);

wire_enum!(
    TriggerPolarity {
        Positive = 0,
        Negative = 1,
    }
);

wire_enum!(
    TriggerOutputSource {
        Dbrdy = 0,
        Manual = 1,
    }
);

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TriggerConfig {
    pub channel: u32,
    pub direction: TriggerDirection,
    pub level: TriggerLevel,
    pub input_polarity: TriggerPolarity,
    pub output_source: TriggerOutputSource,
    pub output_event: TriggerEvent,
    pub output_polarity: TriggerPolarity,
    pub output_pulse_nsec: u32,
}

/// Conditions under which DBREQ is raised when a trigger fires.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DbreqTrigger {
    pub enabled: bool,
    pub source: TriggerSource,
    pub invert: bool,
    pub event: TriggerEvent,
}

/// The HDT sideband signals.
pub trait Hdt: Send + Sync {
    fn dbreq(&self) -> HalResult<bool>;
    fn set_dbreq(&self, asserted: bool) -> HalResult<()>;
    /// One bit per core.
    fn dbrdy(&self) -> HalResult<u8>;
}

pub trait DbrdySnapshot: Send + Sync {
    fn dbrdy_snapshot(&self) -> HalResult<u8>;
    fn clear_dbrdy_snapshot(&self) -> HalResult<()>;
}

pub trait DbreqSourceSnapshot: Send + Sync {
    fn dbreq_source_snapshot(&self) -> HalResult<DbreqSource>;
    fn clear_dbreq_source_snapshot(&self) -> HalResult<()>;
}

pub trait ResetSense: Send + Sync {
    fn reset(&self) -> HalResult<bool>;
}

pub trait PwrokSense: Send + Sync {
    fn pwrok(&self) -> HalResult<bool>;
}

pub trait DbreqOnDbrdy: Send + Sync {
    fn set_dbreq_on_dbrdy(&self, enabled: bool) -> HalResult<()>;
    fn dbreq_on_dbrdy(&self) -> HalResult<bool>;
}

pub trait DbreqOnReset: Send + Sync {
    fn set_dbreq_on_reset(&self, enabled: bool) -> HalResult<()>;
    fn dbreq_on_reset(&self) -> HalResult<bool>;
}

pub trait DbreqOnTrigger: Send + Sync {
    fn set_dbreq_on_trigger(&self, config: DbreqTrigger) -> HalResult<()>;
    fn dbreq_on_trigger(&self) -> HalResult<DbreqTrigger>;
}

pub trait DbreqPulseWidth: Send + Sync {
    fn dbreq_pulse_width(&self) -> HalResult<u32>;
    /// Returns the width in microseconds actually configured.
    fn set_dbreq_pulse_width(&self, usec: u32) -> HalResult<u32>;
}

pub trait DbrdyMask: Send + Sync {
    fn set_dbrdy_mask(&self, mask: u8) -> HalResult<()>;
    fn dbrdy_mask(&self) -> HalResult<u8>;
}

/// External trigger lines.
pub trait Triggers: Send + Sync {
    fn set_trigger_setup(&self, config: &TriggerConfig) -> HalResult<()>;
    fn trigger_setup(&self, channel: u32) -> HalResult<TriggerConfig>;
}

pub trait ManualTriggers: Send + Sync {
    fn set_trigger(&self, channel: u32, asserted: bool) -> HalResult<()>;
    fn trigger(&self, channel: u32) -> HalResult<bool>;
}

#[derive(Clone)]
pub struct TriggersHal {
    pub triggers: Arc<dyn Triggers>,
    pub manual: Option<Arc<dyn ManualTriggers>>,
}

impl TriggersHal {
    pub fn new(triggers: Arc<dyn Triggers>) -> TriggersHal {
        TriggersHal {
            triggers,
            manual: None,
        }
    }

    pub fn with_manual(mut self, manual: Arc<dyn ManualTriggers>) -> Self {
        self.manual = Some(manual);
        self
    }
}

/// Everything an `hdt` object needs from the board.
#[derive(Clone)]
pub struct HdtHal {
    pub hdt: Arc<dyn Hdt>,
    pub header: HeaderHal,
    pub triggers: Option<TriggersHal>,
    pub dbrdy_snapshot: Option<Arc<dyn DbrdySnapshot>>,
    pub dbreq_source_snapshot: Option<Arc<dyn DbreqSourceSnapshot>>,
    pub reset: Option<Arc<dyn ResetSense>>,
    pub pwrok: Option<Arc<dyn PwrokSense>>,
    pub dbreq_on_dbrdy: Option<Arc<dyn DbreqOnDbrdy>>,
    pub dbreq_on_reset: Option<Arc<dyn DbreqOnReset>>,
    pub dbreq_on_trigger: Option<Arc<dyn DbreqOnTrigger>>,
    pub pulse_width: Option<Arc<dyn DbreqPulseWidth>>,
    pub dbrdy_mask: Option<Arc<dyn DbrdyMask>>,
}

impl HdtHal {
    pub fn new(hdt: Arc<dyn Hdt>, header: HeaderHal) -> HdtHal {
        HdtHal {
            hdt,
            header,
            triggers: None,
            dbrdy_snapshot: None,
            dbreq_source_snapshot: None,
            reset: None,
            pwrok: None,
            dbreq_on_dbrdy: None,
            dbreq_on_reset: None,
            dbreq_on_trigger: None,
            pulse_width: None,
            dbrdy_mask: None,
        }
    }

    pub fn with_triggers(mut self, triggers: TriggersHal) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn with_dbrdy_snapshot(mut self, cap: Arc<dyn DbrdySnapshot>) -> Self {
        self.dbrdy_snapshot = Some(cap);
        self
    }

    pub fn with_dbreq_source_snapshot(mut self, cap: Arc<dyn DbreqSourceSnapshot>) -> Self {
        self.dbreq_source_snapshot = Some(cap);
        self
    }

    pub fn with_reset(mut self, cap: Arc<dyn ResetSense>) -> Self {
        self.reset = Some(cap);
        self
    }

    pub fn with_pwrok(mut self, cap: Arc<dyn PwrokSense>) -> Self {
        self.pwrok = Some(cap);
        self
    }

    pub fn with_dbreq_on_dbrdy(mut self, cap: Arc<dyn DbreqOnDbrdy>) -> Self {
        self.dbreq_on_dbrdy = Some(cap);
        self
    }

    pub fn with_dbreq_on_reset(mut self, cap: Arc<dyn DbreqOnReset>) -> Self {
        self.dbreq_on_reset = Some(cap);
        self
    }

    pub fn with_dbreq_on_trigger(mut self, cap: Arc<dyn DbreqOnTrigger>) -> Self {
        self.dbreq_on_trigger = Some(cap);
        self
    }

    pub fn with_pulse_width(mut self, cap: Arc<dyn DbreqPulseWidth>) -> Self {
        self.pulse_width = Some(cap);
        self
    }

    pub fn with_dbrdy_mask(mut self, cap: Arc<dyn DbrdyMask>) -> Self {
        self.dbrdy_mask = Some(cap);
        self
    }
}

#[test]
fn trigger_enums_reject_out_of_range_values() {
    assert_eq!(TriggerSource::from_raw(4), Some(TriggerSource::AXorB));
    assert_eq!(TriggerSource::from_raw(5), None);
    assert_eq!(TriggerEvent::BothEdges.raw(), 3);
    assert_eq!(DbreqSource::default(), DbreqSource::None);
}
