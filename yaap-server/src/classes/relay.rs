use yaap_protocol::{Code, Version};

use crate::hal::RelayHal;
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// A relay switching a board signal such as power or reset buttons.
pub struct RelayClass {
    hal: RelayHal,
}

impl RelayClass {
    pub fn new(hal: RelayHal) -> RelayClass {
        RelayClass { hal }
    }

    fn set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.bool())
            .and_then(|closed| self.hal.relay.set(closed));
        Reply::status(result)
    }

    fn get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.hal.relay.get() {
            Ok(closed) => Reply::ok().bool(closed),
            Err(code) => Reply::new(code).bool(false),
        }
    }

    fn pulse(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.u32())
            .and_then(|msec| match &self.hal.pulse {
                Some(pulse) => pulse.pulse(msec),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        match result {
            Ok(msec) => Reply::ok().u32(msec),
            Err(code) => Reply::new(code).u32(0),
        }
    }
}

impl YaapClass for RelayClass {
    const TYPE_NAME: &'static str = "relay";
    const VERSION: Version = Version::new(1, 0, 0);

    fn methods(&self) -> Vec<Method<Self>> {
        let mut methods = vec![
            Method::locked("set", "void relay.set(bool closed)", RelayClass::set),
            Method::locked("get", "bool relay.get(void)", RelayClass::get),
        ];
        if self.hal.pulse.is_some() {
            methods.push(Method::locked(
                "pulse",
                "int relay.pulse(int msec)",
                RelayClass::pulse,
            ));
        }
        methods
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use yaap_protocol::Code;

    use crate::classes::testing::Harness;
    use crate::hal::relay::{Relay, RelayHal, RelayPulse};
    use crate::hal::HalResult;

    use super::RelayClass;

    #[derive(Default)]
    struct Contact {
        closed: Mutex<bool>,
    }

    impl Relay for Contact {
        fn set(&self, closed: bool) -> HalResult<()> {
            *self.closed.lock().unwrap() = closed;
            Ok(())
        }

        fn get(&self) -> HalResult<bool> {
            Ok(*self.closed.lock().unwrap())
        }
    }

    impl RelayPulse for Contact {
        fn pulse(&self, msec: u32) -> HalResult<u32> {
            Ok(msec.clamp(10, 5000))
        }
    }

    #[test]
    fn set_then_get() {
        let contact = Arc::new(Contact::default());
        let mut harness = Harness::new(RelayClass::new(RelayHal::new(contact.clone())));
        let reply = harness.call("set", |args| {
            args.bool(true);
        });
        assert_eq!(reply.code, Code::SUCCESS);
        assert!(*contact.closed.lock().unwrap());
        let reply = harness.call("get", |_| {});
        assert_eq!(&reply.data[..], &[1]);
        assert!(harness.method_id("pulse").is_none());
    }

    #[test]
    fn pulse_reports_the_length_used() {
        let contact = Arc::new(Contact::default());
        let hal = RelayHal::new(contact.clone()).with_pulse(contact);
        let mut harness = Harness::new(RelayClass::new(hal));
        assert_eq!(harness.method_id("pulse"), Some(10));
        let reply = harness.call("pulse", |args| {
            args.u32(2);
        });
        assert_eq!(&reply.data[..], &10u32.to_be_bytes());
    }
}
