use yaap_protocol::{Code, Version, code::i2c as i2c_code};

use crate::hal::i2c::I2cTransfer;
use crate::hal::I2cHal;
use crate::registry::{Invocation, Method, Reply, YaapClass};

/// An I2C master on one of the board's buses.
pub struct I2cClass {
    hal: I2cHal,
}

impl I2cClass {
    pub fn new(hal: I2cHal) -> I2cClass {
        I2cClass { hal }
    }

    fn transfer(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| Ok((args.u32()?, args.u32()?, args.bytes()?, args.u32()?)))
            .and_then(|(addr8, write_len, data, read_len)| {
                let write = data
                    .get(..write_len as usize)
                    .ok_or(i2c_code::LENGTH_MISMATCH)?;
                // The wire address carries the R/W bit, the bus driver does not.
                let addr = (addr8 >> 1) as u8;
                log::trace!(
                    "I2C transfer to 0x{:02x}: write {}, read {}",
                    addr,
                    write.len(),
                    read_len
                );
                self.hal.i2c.transfer(addr, write, read_len as usize)
            });
        let (code, transfer) = match result {
            Ok(transfer) => (Code::SUCCESS, transfer),
            Err(code) => (code, I2cTransfer::default()),
        };
        Reply::new(code)
            .u32(transfer.written)
            .u32(transfer.read.len() as u32)
            .bytes(&transfer.read)
    }

    fn scl_frequency_get(&mut self, _inv: &mut Invocation<'_>) -> Reply {
        let result = match &self.hal.scl_frequency {
            Some(scl) => scl.scl_frequency(),
            None => Err(Code::NOT_IMPLEMENTED),
        };
        match result {
            Ok(hz) => Reply::ok().u32(hz),
            Err(code) => Reply::new(code).u32(0),
        }
    }

    fn scl_frequency_set(&mut self, inv: &mut Invocation<'_>) -> Reply {
        let result = inv
            .parse(|args| args.u32())
            .and_then(|hz| match &self.hal.scl_frequency {
                Some(scl) => scl.set_scl_frequency(hz).map(|_| ()),
                None => Err(Code::NOT_IMPLEMENTED),
            });
        Reply::status(result)
    }
}

impl YaapClass for I2cClass {
    const TYPE_NAME: &'static str = "i2c";
    const VERSION: Version = Version::new(1, 0, 9);

    fn methods(&self) -> Vec<Method<Self>> {
        let mut methods = vec![Method::locked(
            "transfer",
            "struct { int bytesWritten; int bytesRead; char [] readData; } i2c.transfer(int deviceAddr, int wrCnt, char [] wrData, int rdCnt)",
            I2cClass::transfer,
        )];
        if self.hal.scl_frequency.is_some() {
            methods.push(Method::locked(
                "optionSclFrequencyGet",
                "int i2c.optionSclFrequencyGet()",
                I2cClass::scl_frequency_get,
            ));
            methods.push(Method::locked(
                "optionSclFrequencySet",
                "void i2c.optionSclFrequencySet(int hz)",
                I2cClass::scl_frequency_set,
            ));
        }
        methods
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use yaap_protocol::{Code, code::i2c, payload::PayloadReader};

    use crate::classes::testing::Harness;
    use crate::hal::i2c::{I2c, I2cHal, I2cTransfer};
    use crate::hal::HalResult;

    use super::I2cClass;

    /// Echoes the written bytes back, and remembers the last address.
    #[derive(Default)]
    struct Echo {
        last_addr: Mutex<Option<u8>>,
    }

    impl I2c for Echo {
        fn transfer(&self, addr: u8, write: &[u8], read_len: usize) -> HalResult<I2cTransfer> {
            *self.last_addr.lock().unwrap() = Some(addr);
            if addr == 0x7f {
                return Err(i2c::ADDRESS_NAK);
            }
            Ok(I2cTransfer {
                written: write.len() as u32,
                read: write.iter().copied().cycle().take(read_len).collect(),
            })
        }
    }

    #[test]
    fn transfer_shifts_the_address() {
        let echo = Arc::new(Echo::default());
        let mut harness = Harness::new(I2cClass::new(I2cHal::new(echo.clone())));
        let reply = harness.call("transfer", |args| {
            args.u32(0xa0).u32(2).bytes(&[0x12, 0x34, 0x56]).u32(3);
        });
        assert_eq!(reply.code, Code::SUCCESS);
        assert_eq!(*echo.last_addr.lock().unwrap(), Some(0x50));
        let mut out = PayloadReader::new(&reply.data);
        assert_eq!(out.u32().unwrap(), 2);
        assert_eq!(out.u32().unwrap(), 3);
        assert_eq!(out.bytes().unwrap(), &[0x12, 0x34, 0x12]);
    }

    #[test]
    fn write_count_beyond_data_is_rejected() {
        let echo = Arc::new(Echo::default());
        let mut harness = Harness::new(I2cClass::new(I2cHal::new(echo.clone())));
        let reply = harness.call("transfer", |args| {
            args.u32(0xa0).u32(4).bytes(&[1]).u32(0);
        });
        assert_eq!(reply.code, i2c::LENGTH_MISMATCH);
        assert_eq!(&reply.data[..], &[0; 12]);
        assert_eq!(*echo.last_addr.lock().unwrap(), None);
    }

    #[test]
    fn nak_is_reported() {
        let mut harness = Harness::new(I2cClass::new(I2cHal::new(Arc::new(Echo::default()))));
        let reply = harness.call("transfer", |args| {
            args.u32(0xfe).u32(0).bytes(&[]).u32(1);
        });
        assert_eq!(reply.code, i2c::ADDRESS_NAK);
        assert!(harness.method_id("optionSclFrequencyGet").is_none());
    }
}
