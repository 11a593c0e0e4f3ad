use yaap_protocol::{Code, Version, code::hdt as hdt_code};

use crate::hal::hdt::{
    DbreqTrigger, TriggerConfig, TriggerDirection, TriggerEvent, TriggerLevel,
    TriggerOutputSource, TriggerPolarity, TriggerSource,
};
use crate::hal::{HalResult, HdtHal};
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// The HDT sideband clock is fixed.
const HDT_FREQUENCY_HZ: f64 = 24_750_000.0;

/// DBREQ pulse widths are exchanged in clocks of a 25 MHz reference.
const CLOCKS_PER_USEC: u32 = 25;

fn bool_reply(result: HalResult<bool>) -> Reply {
    match result {
        Ok(value) => Reply::ok().bool(value),
        Err(code) => Reply::new(code).bool(false),
    }
}

/// Expands the low eight bits of `bits` into a bool array.
fn bit_array_reply(result: HalResult<u8>) -> Reply {
    let (code, bits) = match result {
        Ok(bits) => (Code::SUCCESS, bits),
        Err(code) => (code, 0),
    };
    let mut reply = Reply::new(code).u32(8);
    for bit in 0..8 {
        reply.fields().bool(bits & (1 << bit) != 0);
    }
    reply
}

fn trigger_config(values: [u32; 8]) -> Result<TriggerConfig, Code> {
    let invalid = || hdt_code::INVALID_TRIGGER_CFG;
    Ok(TriggerConfig {
        channel: values[0],
        direction: TriggerDirection::from_raw(values[1]).ok_or_else(invalid)?,
        level: TriggerLevel::from_raw(values[2]).ok_or_else(invalid)?,
        input_polarity: TriggerPolarity::from_raw(values[3]).ok_or_else(invalid)?,
        output_source: TriggerOutputSource::from_raw(values[4]).ok_or_else(invalid)?,
        output_event: TriggerEvent::from_raw(values[5]).ok_or_else(invalid)?,
        output_polarity: TriggerPolarity::from_raw(values[6]).ok_or_else(invalid)?,
        output_pulse_nsec: values[7],
    })
}

/// Sideband debug signals of an AMD debug header.
pub struct HdtClass {
    hal: HdtHal,
}

impl HdtClass {
    pub fn new(hal: HdtHal) -> HdtClass {
        HdtClass { hal }
    }

    fn dbreq_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.hal.hdt.dbreq())
    }

    fn dbreq_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|asserted| self.hal.hdt.set_dbreq(asserted));
        Reply::status(result)
    }

    fn dbrdy_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bit_array_reply(self.hal.hdt.dbrdy())
    }

    fn enable_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(self.hal.header.header.is_enabled())
    }

    fn header_status_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let header = &self.hal.header;
        let mut conflicted = false;
        let mut connected = false;
        let mut mode = String::new();
        let mut changed = false;
        let result = header
            .header
            .is_in_conflict()
            .and_then(|value| {
                conflicted = value;
                header.header.status()
            })
            .and_then(|status| {
                connected = status.connected;
                mode = status.mode;
                match &header.change_detect {
                    Some(detect) => detect.is_changed().map(|value| changed = value),
                    None => Ok(()),
                }
            });
        // One header, followed by an empty list of conflicts.
        Reply::status(result)
            .u32(1)
            .string(&mode)
            .bool(connected)
            .bool(changed)
            .bool(conflicted)
            .u32(0)
    }

    fn frequency_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::ok().f64(HDT_FREQUENCY_HZ)
    }

    fn dbrdy_snapshot_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bit_array_reply(match &self.hal.dbrdy_snapshot {
            Some(snapshot) => snapshot.dbrdy_snapshot(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn dbrdy_snapshot_clear(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::status(match &self.hal.dbrdy_snapshot {
            Some(snapshot) => snapshot.clear_dbrdy_snapshot(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn dbreq_source_snapshot_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.dbreq_source_snapshot {
            Some(snapshot) => snapshot.dbreq_source_snapshot(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok(source) => Reply::ok().u32(source.raw()),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn dbreq_source_snapshot_clear(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::status(match &self.hal.dbreq_source_snapshot {
            Some(snapshot) => snapshot.clear_dbreq_source_snapshot(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn reset_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(match &self.hal.reset {
            Some(reset) => reset.reset(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn pwrok_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(match &self.hal.pwrok {
            Some(pwrok) => pwrok.pwrok(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn trigger_setup_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| {
                let mut values = [0u32; 8];
                for value in values.iter_mut() {
                    *value = args.u32()?;
                }
                Ok(values)
            })
            .and_then(trigger_config)
            .and_then(|config| match &self.hal.triggers {
                Some(triggers) => triggers.triggers.set_trigger_setup(&config),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        Reply::status(result)
    }

    fn trigger_setup_get(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.u32())
            .and_then(|channel| match &self.hal.triggers {
                Some(triggers) => triggers.triggers.trigger_setup(channel),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        let (code, config) = match result {
            Ok(config) => (Code::SUCCESS, config),
            Err(code) => (code, TriggerConfig::default()),
        };
        Reply::new(code)
            .u32(config.direction.raw())
            .u32(config.level.raw())
            .u32(config.input_polarity.raw())
            .u32(config.output_source.raw())
            .u32(config.output_event.raw())
            .u32(config.output_polarity.raw())
            .u32(config.output_pulse_nsec)
    }

    fn trigger_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let manual = self.hal.triggers.as_ref().and_then(|t| t.manual.as_ref());
        let result = inv
            .parse(|args| Ok((args.u32()?, args.bool()?)))
            .and_then(|(channel, asserted)| match manual {
                Some(manual) => manual.set_trigger(channel, asserted),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        Reply::status(result)
    }

    fn trigger_get(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let manual = self.hal.triggers.as_ref().and_then(|t| t.manual.as_ref());
        bool_reply(
            inv.parse(|args| args.u32())
                .and_then(|channel| match manual {
                    Some(manual) => manual.trigger(channel),
                    None => Err(Code::NOT_IMPLEMENTED),
                }),
        )
    }

    fn dbreq_on_trigger_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| Ok((args.bool()?, args.u32()?, args.bool()?, args.u32()?)))
            .and_then(|(enabled, source, invert, event)| {
                Ok(DbreqTrigger {
                    enabled,
                    source: TriggerSource::from_raw(source).ok_or(hdt_code::INVALID_TRIGGER_CFG)?,
                    invert,
                    event: TriggerEvent::from_raw(event).ok_or(hdt_code::INVALID_TRIGGER_CFG)?,
                })
            })
            .and_then(|config| match &self.hal.dbreq_on_trigger {
                Some(cap) => cap.set_dbreq_on_trigger(config),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        Reply::status(result)
    }

    fn dbreq_on_trigger_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.dbreq_on_trigger {
            Some(cap) => cap.dbreq_on_trigger(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        let (code, config) = match result {
            Ok(config) => (Code::SUCCESS, config),
            Err(code) => (code, DbreqTrigger::default()),
        };
        Reply::new(code)
            .bool(config.enabled)
            .u32(config.source.raw())
            .bool(config.invert)
            .u32(config.event.raw())
    }

    fn dbreq_on_dbrdy_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        Reply::status(inv.parse(|args| args.bool()).and_then(|enabled| {
            match &self.hal.dbreq_on_dbrdy {
                Some(cap) => cap.set_dbreq_on_dbrdy(enabled),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        }))
    }

    fn dbreq_on_dbrdy_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(match &self.hal.dbreq_on_dbrdy {
            Some(cap) => cap.dbreq_on_dbrdy(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn dbreq_on_reset_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        Reply::status(inv.parse(|args| args.bool()).and_then(|enabled| {
            match &self.hal.dbreq_on_reset {
                Some(cap) => cap.set_dbreq_on_reset(enabled),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        }))
    }

    fn dbreq_on_reset_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bool_reply(match &self.hal.dbreq_on_reset {
            Some(cap) => cap.dbreq_on_reset(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn pulse_width_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.u32()).and_then(|clocks| {
            let usec = clocks.saturating_add(CLOCKS_PER_USEC / 2) / CLOCKS_PER_USEC;
            match &self.hal.pulse_width {
                Some(cap) => cap.set_dbreq_pulse_width(usec).map(|_| ()),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        Reply::status(result)
    }

    fn pulse_width_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.pulse_width {
            Some(cap) => cap.dbreq_pulse_width(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok(usec) => Reply::ok().u32(usec.saturating_mul(CLOCKS_PER_USEC)),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn dbrdy_mask_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv.parse(|args| args.bytes()).and_then(|bits| {
            let mask = bits
                .iter()
                .take(8)
                .enumerate()
                .filter(|(_, bit)| **bit != 0)
                .fold(0u8, |mask, (idx, _)| mask | (1 << idx));
            match &self.hal.dbrdy_mask {
                Some(cap) => cap.set_dbrdy_mask(mask),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        });
        Reply::status(result)
    }

    fn dbrdy_mask_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        bit_array_reply(match &self.hal.dbrdy_mask {
            Some(cap) => cap.dbrdy_mask(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }

    fn enable_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        Reply::status(inv.parse(|args| args.bool()).and_then(|enabled| {
            match &self.hal.header.enable {
                Some(cap) => cap.set_enabled(enabled),
                None => Err(Code::NOT_IMPLEMENTED),
            }
        }))
    }

    fn header_status_clear(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        Reply::status(match &self.hal.header.change_detect {
            Some(cap) => cap.clear_changed(),
            None => Err(Code::NOT_IMPLEMENTED),
        })
    }
}

impl YaapClass for HdtClass {
    const TYPE_NAME: &'static str = "hdt";
    const VERSION: Version = Version::new(1, 1, 9);

    fn methods(&self) -> Vec<Method<Self>> {
        let hal = &self.hal;
        let mut methods = vec![
            Method::locked(
                "ioDbreqGet",
                "bool hdt.ioDbreqGet(void)",
                HdtClass::dbreq_get,
            ),
            Method::locked(
                "ioDbreqSet",
                "void hdt.ioDbreqSet(bool asserted)",
                HdtClass::dbreq_set,
            ),
            Method::locked(
                "ioDbrdyGet",
                "bool [] hdt.ioDbrdyGet(void)",
                HdtClass::dbrdy_get,
            ),
            Method::locked(
                "enableGet",
                "bool hdt.enableGet(void)",
                HdtClass::enable_get,
            ),
            Method::locked(
                "headerStatusGet",
                "struct { struct { string name; bool connected; bool changed; bool conflicted; } [] hdrs; struct { } [] conflicts; } hdt.headerStatusGet(void)",
                HdtClass::header_status_get,
            ),
            Method::locked(
                "optionFrequencyGet",
                "double hdt.optionFrequencyGet(void)",
                HdtClass::frequency_get,
            ),
        ];
        if hal.dbrdy_snapshot.is_some() {
            methods.push(Method::locked(
                "ioDbrdySnapshotGet",
                "bool [] hdt.ioDbrdySnapshotGet(void)",
                HdtClass::dbrdy_snapshot_get,
            ));
            methods.push(Method::locked(
                "ioDbrdySnapshotClear",
                "void hdt.ioDbrdySnapshotClear(void)",
                HdtClass::dbrdy_snapshot_clear,
            ));
        }
        if hal.dbreq_source_snapshot.is_some() {
            methods.push(Method::locked(
                "ioDbreqSourceSnapshotGet",
                "int hdt.ioDbreqSourceSnapshotGet(void)",
                HdtClass::dbreq_source_snapshot_get,
            ));
            methods.push(Method::locked(
                "ioDbreqSourceSnapshotClear",
                "void hdt.ioDbreqSourceSnapshotClear(void)",
                HdtClass::dbreq_source_snapshot_clear,
            ));
        }
        if hal.reset.is_some() {
            methods.push(Method::locked(
                "ioResetGet",
                "bool hdt.ioResetGet(void)",
                HdtClass::reset_get,
            ));
        }
        if hal.pwrok.is_some() {
            methods.push(Method::locked(
                "ioPwrokGet",
                "bool hdt.ioPwrokGet(void)",
                HdtClass::pwrok_get,
            ));
        }
        if let Some(triggers) = &hal.triggers {
            methods.push(Method::locked(
                "optionTriggerSetupSet",
                "void hdt.optionTriggerSetupSet(int channel, int direction, int level, int inputPolarity, int outputSource, int outputEvent, int outputPolarity, int outputPulseWidth)",
                HdtClass::trigger_setup_set,
            ));
            methods.push(Method::locked(
                "optionTriggerSetupGet",
                "struct { int direction; int level; int inputPolarity; int outputSource; int outputEvent; int outputPolarity; int outputPulseWidth; } hdt.optionTriggerSetupGet(int channel)",
                HdtClass::trigger_setup_get,
            ));
            if triggers.manual.is_some() {
                methods.push(Method::locked(
                    "ioTriggerSet",
                    "void hdt.ioTriggerSet(int channel, bool asserted)",
                    HdtClass::trigger_set,
                ));
                methods.push(Method::locked(
                    "ioTriggerGet",
                    "bool hdt.ioTriggerGet(int channel)",
                    HdtClass::trigger_get,
                ));
            }
            if hal.dbreq_on_trigger.is_some() {
                methods.push(Method::locked(
                    "optionDbreqOnTriggerSet",
                    "void hdt.optionDbreqOnTriggerSet(bool enable, int source, bool sourceInvert, int event)",
                    HdtClass::dbreq_on_trigger_set,
                ));
                methods.push(Method::locked(
                    "optionDbreqOnTriggerGet",
                    "struct { bool enable; int source; bool sourceInvert; int event; } hdt.optionDbreqOnTriggerGet(void)",
                    HdtClass::dbreq_on_trigger_get,
                ));
            }
        }
        if hal.dbreq_on_dbrdy.is_some() {
            methods.push(Method::locked(
                "optionDbreqOnDbrdySet",
                "void hdt.optionDbreqOnDbrdySet(bool enabled)",
                HdtClass::dbreq_on_dbrdy_set,
            ));
            methods.push(Method::locked(
                "optionDbreqOnDbrdyGet",
                "bool hdt.optionDbreqOnDbrdyGet(void)",
                HdtClass::dbreq_on_dbrdy_get,
            ));
        }
        if hal.dbreq_on_reset.is_some() {
            methods.push(Method::locked(
                "optionDbreqOnResetSet",
                "void hdt.optionDbreqOnResetSet(bool enabled)",
                HdtClass::dbreq_on_reset_set,
            ));
            methods.push(Method::locked(
                "optionDbreqOnResetGet",
                "bool hdt.optionDbreqOnResetGet(void)",
                HdtClass::dbreq_on_reset_get,
            ));
        }
        if hal.pulse_width.is_some() {
            methods.push(Method::locked(
                "optionDbreqPulseWidthSet",
                "void hdt.optionDbreqPulseWidthSet(int clocks)",
                HdtClass::pulse_width_set,
            ));
            methods.push(Method::locked(
                "optionDbreqPulseWidthGet",
                "int hdt.optionDbreqPulseWidthGet(void)",
                HdtClass::pulse_width_get,
            ));
        }
        if hal.dbrdy_mask.is_some() {
            methods.push(Method::locked(
                "optionDbrdyMaskSet",
                "void hdt.optionDbrdyMaskSet(bool maskBits[])",
                HdtClass::dbrdy_mask_set,
            ));
            methods.push(Method::locked(
                "optionDbrdyMaskGet",
                "bool [] hdt.optionDbrdyMaskGet(void)",
                HdtClass::dbrdy_mask_get,
            ));
        }
        if hal.header.enable.is_some() {
            methods.push(Method::locked(
                "enableSet",
                "void hdt.enableSet(bool enabled)",
                HdtClass::enable_set,
            ));
        }
        if hal.header.change_detect.is_some() {
            methods.push(Method::locked(
                "headerStatusClear",
                "void hdt.headerStatusClear(void)",
                HdtClass::header_status_clear,
            ));
        }
        log::debug!("HDT exposes {} methods", methods.len());
        methods
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use yaap_protocol::{Code, code::hdt};

    use crate::classes::testing::{FixedHeader, Harness};
    use crate::hal::hdt::{DbrdyMask, DbreqOnTrigger, DbreqPulseWidth, DbreqTrigger, Hdt, HdtHal};
    use crate::hal::{HalResult, HeaderHal};

    use super::HdtClass;

    #[derive(Default)]
    struct Registers {
        dbreq: Mutex<bool>,
        mask: Mutex<u8>,
        pulse_usec: Mutex<u32>,
        on_trigger: Mutex<DbreqTrigger>,
    }

    impl Hdt for Registers {
        fn dbreq(&self) -> HalResult<bool> {
            Ok(*self.dbreq.lock().unwrap())
        }

        fn set_dbreq(&self, asserted: bool) -> HalResult<()> {
            *self.dbreq.lock().unwrap() = asserted;
            Ok(())
        }

        fn dbrdy(&self) -> HalResult<u8> {
            Ok(0b1000_0101)
        }
    }

    impl DbrdyMask for Registers {
        fn set_dbrdy_mask(&self, mask: u8) -> HalResult<()> {
            *self.mask.lock().unwrap() = mask;
            Ok(())
        }

        fn dbrdy_mask(&self) -> HalResult<u8> {
            Ok(*self.mask.lock().unwrap())
        }
    }

    impl DbreqPulseWidth for Registers {
        fn dbreq_pulse_width(&self) -> HalResult<u32> {
            Ok(*self.pulse_usec.lock().unwrap())
        }

        fn set_dbreq_pulse_width(&self, usec: u32) -> HalResult<u32> {
            *self.pulse_usec.lock().unwrap() = usec;
            Ok(usec)
        }
    }

    impl DbreqOnTrigger for Registers {
        fn set_dbreq_on_trigger(&self, config: DbreqTrigger) -> HalResult<()> {
            *self.on_trigger.lock().unwrap() = config;
            Ok(())
        }

        fn dbreq_on_trigger(&self) -> HalResult<DbreqTrigger> {
            Ok(*self.on_trigger.lock().unwrap())
        }
    }

    fn harness(full: bool) -> (Arc<Registers>, Harness<HdtClass>) {
        let registers = Arc::new(Registers::default());
        let header = HeaderHal::new(Arc::new(FixedHeader::connected()));
        let mut hal = HdtHal::new(registers.clone(), header);
        if full {
            hal = hal
                .with_dbrdy_mask(registers.clone())
                .with_pulse_width(registers.clone())
                .with_dbreq_on_trigger(registers.clone());
        }
        (registers, Harness::new(HdtClass::new(hal)))
    }

    #[test]
    fn dbrdy_is_expanded_to_eight_bools() {
        let (_, mut harness) = harness(false);
        let reply = harness.call("ioDbrdyGet", |_| {});
        assert_eq!(&reply.data[..], &[0, 0, 0, 8, 1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn capabilities_select_methods() {
        let (_, basic) = harness(false);
        assert_eq!(basic.method_count(), 6);
        assert!(basic.method_id("optionDbrdyMaskSet").is_none());
        let (_, full) = harness(true);
        assert!(full.method_id("optionDbrdyMaskSet").is_some());
        // dbreq on trigger is only offered together with trigger lines
        assert!(full.method_id("optionDbreqOnTriggerSet").is_none());
    }

    #[test]
    fn mask_is_packed_from_bools() {
        let (registers, mut harness) = harness(true);
        let reply = harness.call("optionDbrdyMaskSet", |args| {
            args.bytes(&[1, 0, 0, 1]);
        });
        assert_eq!(reply.code, Code::SUCCESS);
        assert_eq!(*registers.mask.lock().unwrap(), 0b1001);
    }

    #[test]
    fn pulse_width_is_converted_from_clocks() {
        let (registers, mut harness) = harness(true);
        harness.call("optionDbreqPulseWidthSet", |args| {
            args.u32(100);
        });
        assert_eq!(*registers.pulse_usec.lock().unwrap(), 4);
        let reply = harness.call("optionDbreqPulseWidthGet", |_| {});
        assert_eq!(&reply.data[..], &100u32.to_be_bytes());
    }

    #[test]
    fn header_status_reports_one_header() {
        let (_, mut harness) = harness(false);
        let reply = harness.call("headerStatusGet", |_| {});
        assert_eq!(reply.code, Code::SUCCESS);
        assert_eq!(&reply.data[..4], &[0, 0, 0, 1]);
        assert_eq!(&reply.data[reply.data.len() - 7..], &[1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn trigger_enums_are_validated() {
        assert_eq!(
            super::trigger_config([0, 1, 1, 0, 1, 3, 1, 500]).map(|cfg| cfg.output_pulse_nsec),
            Ok(500)
        );
        assert_eq!(
            super::trigger_config([0, 2, 0, 0, 0, 0, 0, 0]),
            Err(hdt::INVALID_TRIGGER_CFG)
        );
    }
}
