use yaap_protocol::{Code, Version};

use crate::hal::SystemHal;
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// The root object at instance id 0: identity and the session lock.
pub struct Device {
    hal: SystemHal,
}

impl Device {
    pub fn new(hal: SystemHal) -> Device {
        Device { hal }
    }

    fn info(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let mut name = String::new();
        let mut firmware = Vec::new();
        let mut boards = Vec::new();
        let result = self
            .hal
            .system
            .device_name()
            .map(|value| name = value)
            .and_then(|_| match &self.hal.firmware {
                Some(source) => source.firmware_info().map(|info| firmware = info),
                None => Ok(()),
            })
            .and_then(|_| match &self.hal.boards {
                Some(source) => source.boards().map(|info| boards = info),
                None => Ok(()),
            });

        let protocol = Version::latest();
        let mut reply = Reply::status(result)
            .string(&name)
            .u32(protocol.major())
            .u32(protocol.minor())
            .u32(protocol.point());
        let out = reply.fields();
        out.u32(firmware.len() as u32);
        for fw in &firmware {
            out.string(&fw.kind)
                .u32(fw.version.major())
                .u32(fw.version.minor())
                .u32(fw.version.point());
        }
        out.u32(boards.len() as u32);
        for board in &boards {
            out.string(&board.name)
                .string(&board.part_no)
                .string(&board.revision)
                .string(&board.serial_no);
        }
        reply
    }

    fn root_members(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let roots: Vec<_> = inv.directory().root_members().collect();
        let mut reply = Reply::ok().u32(roots.len() as u32);
        for (id, node) in roots {
            reply.fields().string(&node.name).u32(id);
        }
        reply
    }

    fn credentials<'a>(inv: &mut Invocation<'a>) -> Result<(&'a [u8], &'a [u8]), Code> {
        inv.parse(|args| Ok((args.c_str()?, args.c_str()?)))
    }

    /// Clients expect a rejected lock or unlock to show up in the error list too.
    fn report_holder(inv: &mut Invocation<'_>) {
        let holder = inv.lock().holder().unwrap_or_default().into_owned();
        inv.add_error(Code::DEVICE_LOCKED, holder);
    }

    fn lock(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = Device::credentials(inv).and_then(|(user, pass)| {
            let now = inv.now();
            inv.lock.lock(user, pass, now, inv.system)
        });
        match result {
            Ok(lock_id) => Reply::ok().u32(lock_id),
            Err(code) => {
                if code == Code::BAD_CREDENTIALS {
                    Device::report_holder(inv);
                }
                Reply::new(code).u32(0)
            }
        }
    }

    fn unlock(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = Device::credentials(inv)
            .and_then(|(user, pass)| inv.lock.unlock(user, pass, inv.system));
        if result == Err(Code::BAD_CREDENTIALS) {
            Device::report_holder(inv);
        }
        Reply::status(result)
    }

    fn get_key(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        match self.hal.system.yaap_key() {
            Ok(key) => Reply::ok().bytes(&key),
            Err(code) => Reply::new(code).bytes(&[]),
        }
    }
}

impl YaapClass for Device {
    const TYPE_NAME: &'static str = "device";
    const VERSION: Version = Version::new(1, 0, 9);

    fn methods(&self) -> Vec<Method<Self>> {
        vec![
            Method::open(
                "info",
                "struct { char [] deviceName; struct { int major; int minor; int point; } version; struct { char [] type; struct { int major; int minor; int point; } version; } [] firmwareInfo; struct { char [] name; char [] partNumber; char [] revision; char [] serialNumber; } [] boardInfo; } device.info(void)",
                Device::info,
            ),
            Method::open(
                "rootMembers",
                "struct { char [] name; int id; } [] device.rootMembers(void)",
                Device::root_members,
            ),
            Method::open(
                "lock",
                "int device.lock(char [] username, char [] password)",
                Device::lock,
            ),
            Method::locked(
                "unlock",
                "void device.unlock(char [] username, char [] password)",
                Device::unlock,
            ),
            Method::open("getKey", "char [] device.getKey()", Device::get_key),
        ]
    }
}
