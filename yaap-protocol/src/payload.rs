//! Primitive encodings used inside method payloads and method replies.
//!
//! | type             | encoding                          |
//! |------------------|-----------------------------------|
//! | `int`            | `u32`, big endian                 |
//! | `byte` / `bool`  | one byte                          |
//! | `long`           | `u64`, big endian                 |
//! | `double`         | IEEE-754 `f64`, big endian        |
//! | `string`, `byte[]` | `[count: u32][count bytes]`     |
use crate::{code::Code, error::ReadError};

/// Cursor over the payload of a single method call.
#[derive(Clone, Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> PayloadReader<'a> {
        PayloadReader { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        let available = self.remaining();
        if len > available {
            return Err(ReadError::Truncated {
                needed: len,
                available,
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ReadError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u32(&mut self) -> Result<u32, ReadError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, ReadError> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    pub fn f64(&mut self) -> Result<f64, ReadError> {
        Ok(f64::from_be_bytes(self.array()?))
    }

    pub fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.array::<1>()?[0])
    }

    /// Any nonzero byte is `true`.
    pub fn bool(&mut self) -> Result<bool, ReadError> {
        Ok(self.u8()? != 0)
    }

    pub fn code(&mut self) -> Result<Code, ReadError> {
        Ok(Code(self.u32()?))
    }

    /// A count prefixed byte array.
    pub fn bytes(&mut self) -> Result<&'a [u8], ReadError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// A count prefixed string as raw bytes, ending at the first NUL.
    pub fn c_str(&mut self) -> Result<&'a [u8], ReadError> {
        let raw = self.bytes()?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(&raw[..end])
    }

    /// A count prefixed string, see [PayloadReader::c_str]. Invalid UTF-8 is replaced.
    pub fn string(&mut self) -> Result<String, ReadError> {
        Ok(String::from_utf8_lossy(self.c_str()?).into_owned())
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

/// Builder for method payloads and method reply fields.
#[derive(Clone, Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> PayloadWriter {
        PayloadWriter::default()
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn f64(&mut self, value: f64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(u8::from(value))
    }

    /// Writes a count prefixed byte array. Arrays beyond `u32::MAX` bytes are not representable
    /// and are truncated, which cannot happen for messages bounded by the framing limit.
    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        let len = u32::try_from(value.len()).unwrap_or(u32::MAX);
        self.u32(len);
        self.buf.extend_from_slice(&value[..len as usize]);
        self
    }

    pub fn string(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod test {
    use super::{PayloadReader, PayloadWriter};
    use crate::error::ReadError;

    #[test]
    fn mixed_fields_are_read_back_in_order() {
        let mut writer = PayloadWriter::new();
        writer
            .u32(8)
            .bytes(&[0xAA])
            .bool(true)
            .u64(0x0102_0304_0506_0708)
            .f64(200e6)
            .string("alice");
        let data = writer.into_inner();

        let mut reader = PayloadReader::new(&data);
        assert_eq!(reader.u32().unwrap(), 8);
        assert_eq!(reader.bytes().unwrap(), &[0xAA]);
        assert!(reader.bool().unwrap());
        assert_eq!(reader.u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(reader.f64().unwrap(), 200e6);
        assert_eq!(reader.string().unwrap(), "alice");
        assert!(reader.is_empty());
        assert_eq!(reader.consumed(), data.len());
    }

    #[test]
    fn string_drops_trailing_nul() {
        let data = [0, 0, 0, 4, b'b', b'o', b'b', 0];
        assert_eq!(PayloadReader::new(&data).string().unwrap(), "bob");
    }

    #[test]
    fn string_ends_at_first_nul() {
        let data = [0, 0, 0, 5, b'b', b'o', b'b', 0, b'x'];
        let mut reader = PayloadReader::new(&data);
        assert_eq!(reader.string().unwrap(), "bob");
        assert!(reader.is_empty());
    }

    #[test]
    fn c_str_keeps_invalid_utf8() {
        let data = [0, 0, 0, 3, b'p', b'w', 0xff];
        assert_eq!(PayloadReader::new(&data).c_str().unwrap(), b"pw\xff");
    }

    #[test]
    fn array_longer_than_payload_is_truncated_error() {
        let data = [0, 0, 0, 9, 1, 2];
        match PayloadReader::new(&data).bytes() {
            Err(ReadError::Truncated { needed, available }) => {
                assert_eq!(needed, 9);
                assert_eq!(available, 2);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn integers_are_big_endian() {
        let mut writer = PayloadWriter::new();
        writer.u32(0x1234_5678);
        assert_eq!(writer.finish(), [0x12, 0x34, 0x56, 0x78]);
        assert!(writer.is_empty());
    }
}
