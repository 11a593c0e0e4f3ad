use std::fmt::Display;

/// A YAAP result code as carried on the wire.
///
/// Codes below 2000 are shared by every class. Codes from 2002 upwards are
/// class specific and overlap between classes, which is why they live in the
/// per-class submodules ([`system`], [`jtag`], [`hdt`], [`i2c`]).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Code(pub u32);

impl Code {
    pub const SUCCESS: Code = Code(0);

    pub const LOCK_MISMATCH: Code = Code(1000);
    pub const DEVICE_LOCKED: Code = Code(1001);
    pub const MALFORMED_REQUEST: Code = Code(1002);
    pub const INVALID_INSTANCE_ID: Code = Code(1003);
    pub const INVALID_METHOD_ID: Code = Code(1004);
    pub const INVALID_PARAMETERS: Code = Code(1005);
    pub const METHOD_ERROR: Code = Code(1006);
    pub const NOT_IMPLEMENTED: Code = Code(1007);
    pub const ALREADY_RESERVED: Code = Code(1008);
    pub const NOT_RESERVED: Code = Code(1009);
    pub const BAD_CREDENTIALS: Code = Code(1010);
    pub const SERVER_ERROR: Code = Code(1011);
    pub const INVALID_MODE: Code = Code(1012);

    pub const UNSPECIFIED_HW_ERROR: Code = Code(2000);
    pub const OUT_OF_MEMORY: Code = Code(2001);
    pub const INVALID_SETTING: Code = Code(2002);
    pub const WRITE_ONLY: Code = Code(2003);
    pub const READ_ONLY: Code = Code(2004);
    pub const TOO_BIG: Code = Code(2005);
    pub const TOO_SMALL: Code = Code(2006);
    pub const UNSUPPORTED_DEVICE: Code = Code(2007);

    pub fn is_success(self) -> bool {
        self == Code::SUCCESS
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Symbolic name of the code, if it is one of the class independent codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Code::SUCCESS => "E_SUCCESS",
            Code::LOCK_MISMATCH => "E_LOCK_MISMATCH",
            Code::DEVICE_LOCKED => "E_DEVICE_LOCKED",
            Code::MALFORMED_REQUEST => "E_MALFORMED_REQUEST",
            Code::INVALID_INSTANCE_ID => "E_INVALID_INSTANCE_ID",
            Code::INVALID_METHOD_ID => "E_INVALID_METHOD_ID",
            Code::INVALID_PARAMETERS => "E_INVALID_PARAMETERS",
            Code::METHOD_ERROR => "E_METHOD_ERROR",
            Code::NOT_IMPLEMENTED => "E_NOT_IMPLEMENTED",
            Code::ALREADY_RESERVED => "E_ALREADY_RESERVED",
            Code::NOT_RESERVED => "E_NOT_RESERVED",
            Code::BAD_CREDENTIALS => "E_BAD_CREDENTIALS",
            Code::SERVER_ERROR => "E_SERVER_ERROR",
            Code::INVALID_MODE => "E_INVALID_MODE",
            Code::UNSPECIFIED_HW_ERROR => "E_UNSPECIFIED_HW_ERROR",
            Code::OUT_OF_MEMORY => "E_OUT_OF_MEMORY",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for Code {
    fn from(value: u32) -> Self {
        Code(value)
    }
}

impl From<Code> for u32 {
    fn from(value: Code) -> Self {
        value.0
    }
}

impl Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

pub mod system {
    use super::Code;

    pub const INVALID_FW_TYPE: Code = Code(2002);
    pub const FW_NOT_READY: Code = Code(2003);
}

pub mod jtag {
    use super::Code;

    pub const LENGTH_MISMATCH: Code = Code(2002);
    pub const HEADER_NOT_ENABLED: Code = Code(2003);
    pub const HEADER_NOT_CONNECTED: Code = Code(2004);
    pub const HEADER_STATUS_CHANGED: Code = Code(2005);
    pub const HEADER_CONFLICT: Code = Code(2006);
    pub const INVALID_IR_STATE: Code = Code(2007);
    pub const INVALID_DR_STATE: Code = Code(2008);
    pub const RETRIES_EXHAUSTED: Code = Code(2009);
    pub const FSM_ASYNC_RESET: Code = Code(2010);
    pub const INVALID_STATE: Code = Code(2011);
}

pub mod hdt {
    use super::Code;

    pub const HEADER_NOT_ENABLED: Code = Code(2002);
    pub const NOT_CONNECTED: Code = Code(2003);
    pub const STATUS_CHANGED: Code = Code(2004);
    pub const CONFLICT: Code = Code(2005);
    pub const DBRDY_TIMEOUT: Code = Code(2006);
    pub const INVALID_TRIGGER_CFG: Code = Code(2007);
    pub const INVALID_TRIGGER_CHAN: Code = Code(2008);
}

pub mod i2c {
    use super::Code;

    pub const LENGTH_MISMATCH: Code = Code(2002);
    pub const ADDRESS_NAK: Code = Code(2008);
    pub const WRITE_NAK: Code = Code(2009);
    pub const TRANSFER_TOO_LARGE: Code = Code(2010);
    pub const INVALID_TIMEOUT: Code = Code(2014);
}

#[test]
fn display_names_known_codes() {
    assert_eq!(Code::DEVICE_LOCKED.to_string(), "E_DEVICE_LOCKED (1001)");
    assert_eq!(jtag::RETRIES_EXHAUSTED.to_string(), "2009");
    assert!(Code::default().is_success());
}
