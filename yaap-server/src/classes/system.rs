use yaap_protocol::{Code, Version};

use crate::hal::SystemHal;
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// Firmware maintenance and reset of the debug device itself.
pub struct SystemClass {
    hal: SystemHal,
}

impl SystemClass {
    pub fn new(hal: SystemHal) -> SystemClass {
        SystemClass { hal }
    }

    fn device_reset(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let Some(reset) = &self.hal.reset else {
            return Reply::new(Code::NOT_IMPLEMENTED);
        };
        let result = reset.reset();
        if result.is_ok() {
            log::info!("Device reset requested, shutting down after this response");
            inv.request_reset();
        }
        Reply::status(result)
    }

    fn firmware_update(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| Ok((args.string()?, args.bytes()?)))
            .and_then(|(kind, image)| match &self.hal.firmware {
                Some(firmware) => {
                    log::info!("Firmware update of \"{}\" with {} bytes", kind, image.len());
                    firmware.update_firmware(&kind, image)
                }
                None => Err(Code::NOT_IMPLEMENTED),
            });
        Reply::status(result)
    }

    fn firmware_status(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.string())
            .and_then(|kind| match &self.hal.firmware {
                Some(firmware) => firmware.firmware_status(&kind),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        match result {
            Ok(status) => Reply::ok().u32(status.status).u32(status.percent),
            Err(code) => Reply::new(code).u32(0).u32(0),
        }
    }
}

impl YaapClass for SystemClass {
    const TYPE_NAME: &'static str = "system";
    const VERSION: Version = Version::new(1, 0, 9);

    fn methods(&self) -> Vec<Method<Self>> {
        vec![
            Method::locked(
                "deviceReset",
                "void system.deviceReset(void)",
                SystemClass::device_reset,
            ),
            Method::locked(
                "firmwareUpdate",
                "void system.firmwareUpdate(char [] type, uint8_t [] data)",
                SystemClass::firmware_update,
            ),
            Method::locked(
                "firmwareStatus",
                "struct { int status; int percent; } system.firmwareStatus(char [] type)",
                SystemClass::firmware_status,
            ),
        ]
    }
}
