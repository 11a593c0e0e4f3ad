//! Capability interfaces between the YAAP classes and the board hardware.
//!
//! Every device kind has one mandatory trait plus a set of optional extension
//! traits. A board backend implements whatever it supports and hands the
//! pieces to the matching `*Hal` bundle, which the class inspects exactly once
//! when it is constructed to decide which methods it exposes.
//!
//! All calls are synchronous and may block on real hardware transactions.
//! A failing call returns the YAAP result code that is reported to the client
//! unchanged.
use yaap_protocol::Code;

pub mod hdt;
pub mod header;
pub mod i2c;
pub mod jtag;
pub mod lpc;
pub mod relay;
pub mod system;

pub use hdt::{Hdt, HdtHal, Triggers, TriggersHal};
pub use header::{Header, HeaderHal};
pub use i2c::{I2c, I2cHal};
pub use jtag::{Jtag, JtagHal, ShiftOp, TapState};
pub use lpc::{LpcPostCode, LpcPostCodeHal, LpcRomEmulator};
pub use relay::{Relay, RelayHal};
pub use system::{LockChange, System, SystemHal};

pub type HalResult<T> = Result<T, Code>;
