//! The YAAP classes served by this crate.
//!
//! Each class wraps one `*Hal` bundle from [crate::hal] and publishes a method
//! table through [YaapClass](crate::registry::YaapClass).
use yaap_protocol::Version;

use crate::registry::{Method, YaapClass};

pub mod device;
pub mod hdt;
pub mod i2c;
pub mod jtag;
pub mod lpc;
pub mod relay;
pub mod system;

pub use device::Device;
pub use hdt::HdtClass;
pub use i2c::I2cClass;
pub use jtag::JtagClass;
pub use lpc::{LpcPostCodeClass, LpcRomEmulationClass};
pub use relay::RelayClass;
pub use system::SystemClass;

/// Groups the JTAG and HDT objects of one CPU debug header.
pub struct CpuDebug;

impl YaapClass for CpuDebug {
    const TYPE_NAME: &'static str = "cpuDebug";
    const VERSION: Version = Version::new(1, 0, 0);

    fn methods(&self) -> Vec<Method<Self>> {
        Vec::new()
    }
}

/// Groups the POST code reader and the ROM emulator of the LPC bus.
pub struct Lpc;

impl YaapClass for Lpc {
    const TYPE_NAME: &'static str = "lpc";
    const VERSION: Version = Version::new(1, 0, 0);

    fn methods(&self) -> Vec<Method<Self>> {
        Vec::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use yaap_protocol::{
        Code, MethodReply, StatusEntry,
        payload::{PayloadReader, PayloadWriter},
    };

    use crate::hal::header::{Header, HeaderStatus};
    use crate::hal::jtag::{Jtag, ShiftOp, TapState};
    use crate::hal::{HalResult, System, SystemHal};
    use crate::lock::SessionLock;
    use crate::registry::{Directory, Invocation, Method, YaapClass, BUILTIN_METHODS};

    /// Calls the class methods of a single object, bypassing the registry.
    pub struct Harness<T: YaapClass> {
        object: T,
        methods: Vec<Method<T>>,
        directory: Directory,
        lock: SessionLock,
        system: SystemHal,
        pub errors: Vec<StatusEntry>,
        pub reset_requested: bool,
    }

    impl<T: YaapClass> Harness<T> {
        pub fn new(object: T) -> Harness<T> {
            let methods = object.methods();
            Harness {
                object,
                methods,
                directory: Directory::default(),
                lock: SessionLock::new(Duration::from_secs(60), Instant::now()),
                system: SystemHal::new(Arc::new(NullSystem)),
                errors: Vec::new(),
                reset_requested: false,
            }
        }

        pub fn object(&self) -> &T {
            &self.object
        }

        /// Wire method id of the class method called `name`.
        pub fn method_id(&self, name: &str) -> Option<u32> {
            self.methods
                .iter()
                .position(|method| method.info.name == name)
                .map(|idx| (idx + BUILTIN_METHODS.len()) as u32)
        }

        pub fn method_count(&self) -> usize {
            self.methods.len()
        }

        pub fn call(&mut self, name: &str, args: impl FnOnce(&mut PayloadWriter)) -> MethodReply {
            let handler = self
                .methods
                .iter()
                .find(|method| method.info.name == name)
                .map(|method| method.handler)
                .unwrap_or_else(|| panic!("no method {}", name));
            let mut writer = PayloadWriter::new();
            args(&mut writer);
            let payload = writer.into_inner();
            let mut inv = Invocation {
                args: PayloadReader::new(&payload),
                directory: &self.directory,
                lock: &mut self.lock,
                system: &self.system,
                errors: &mut self.errors,
                reset_requested: &mut self.reset_requested,
                now: Instant::now(),
            };
            handler(&mut self.object, &mut inv).into_method_reply()
        }
    }

    pub struct NullSystem;

    impl System for NullSystem {
        fn device_name(&self) -> HalResult<String> {
            Ok("test".to_owned())
        }

        fn yaap_key(&self) -> HalResult<[u8; 16]> {
            Err(Code::NOT_IMPLEMENTED)
        }

        fn config_mux(&self, _enable: bool) -> HalResult<()> {
            Ok(())
        }
    }

    /// TDO follows TDI.
    pub struct LoopbackJtag;

    impl LoopbackJtag {
        #[allow(clippy::new_ret_no_self)]
        pub fn new() -> Arc<LoopbackJtag> {
            Arc::new(LoopbackJtag)
        }
    }

    impl Jtag for LoopbackJtag {
        fn shift(
            &self,
            _op: ShiftOp,
            tdi: &[u8],
            tdo: &mut [u8],
            _bits: u32,
            _pre_tck: u32,
            _post_tck: u32,
            _end_state: TapState,
        ) -> HalResult<()> {
            let len = tdo.len().min(tdi.len());
            tdo[..len].copy_from_slice(&tdi[..len]);
            Ok(())
        }

        fn reset_tap(&self) -> HalResult<()> {
            Ok(())
        }
    }

    /// A header that is enabled and conflict free.
    pub struct FixedHeader {
        connected: bool,
    }

    impl FixedHeader {
        pub fn connected() -> FixedHeader {
            FixedHeader { connected: true }
        }
    }

    impl Header for FixedHeader {
        fn status(&self) -> HalResult<HeaderStatus> {
            Ok(HeaderStatus {
                connected: self.connected,
                mode: "HDT".to_owned(),
            })
        }

        fn is_enabled(&self) -> HalResult<bool> {
            Ok(true)
        }

        fn is_in_conflict(&self) -> HalResult<bool> {
            Ok(false)
        }
    }
}
