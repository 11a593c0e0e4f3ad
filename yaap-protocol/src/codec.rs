/// Blocking read and write implementations for the YAARP framing
use std::io::{self, Read, Write};

use crate::{
    code::Code,
    error::ReadError,
    protocol::{MethodCall, MethodReply, Request, Response, StatusEntry},
};

/// Largest message either side accepts by default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub(crate) fn to_u32(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("length {} does not fit into a 32 bit field", len),
        )
    })
}

fn read_u32(reader: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_bytes(reader: &mut impl Read, len: usize) -> io::Result<Box<[u8]>> {
    let mut buf = vec![0u8; len].into_boxed_slice();
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Size of an encoded status list, excluding the leading size field itself.
pub(crate) fn status_list_size(entries: &[StatusEntry]) -> usize {
    if entries.is_empty() {
        0
    } else {
        4 + entries
            .iter()
            .map(|entry| 8 + entry.message.len())
            .sum::<usize>()
    }
}

fn write_status_list(writer: &mut impl Write, entries: &[StatusEntry]) -> io::Result<()> {
    writer.write_all(&to_u32(status_list_size(entries))?.to_be_bytes())?;
    if entries.is_empty() {
        return Ok(());
    }
    writer.write_all(&to_u32(entries.len())?.to_be_bytes())?;
    for entry in entries {
        writer.write_all(&entry.code.raw().to_be_bytes())?;
        writer.write_all(&to_u32(entry.message.len())?.to_be_bytes())?;
        writer.write_all(entry.message.as_bytes())?;
    }
    Ok(())
}

fn read_status_list(
    reader: &mut impl Read,
    max_size: usize,
) -> Result<Vec<StatusEntry>, ReadError> {
    let size = read_u32(reader)? as usize;
    if size == 0 {
        return Ok(Vec::new());
    }
    if size > max_size {
        return Err(ReadError::TooManyBytes {
            max: max_size,
            got: size,
        });
    }
    let count = read_u32(reader)? as usize;
    let mut consumed = 4;
    let mut entries = Vec::new();
    for _ in 0..count {
        let code = Code(read_u32(reader)?);
        let len = read_u32(reader)? as usize;
        consumed += 8 + len;
        if consumed > size {
            return Err(ReadError::InvalidFormat(format!(
                "Status list overruns its declared size of {} bytes",
                size
            )));
        }
        let message = read_bytes(reader, len)?;
        entries.push(StatusEntry::new(
            code,
            String::from_utf8_lossy(&message).into_owned(),
        ));
    }
    if consumed != size {
        return Err(ReadError::InvalidFormat(format!(
            "Status list declared {} bytes but contained {}",
            size, consumed
        )));
    }
    Ok(entries)
}

impl Request {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.lock_id.to_be_bytes())?;
        writer.write_all(&to_u32(self.calls.len())?.to_be_bytes())?;
        for call in &self.calls {
            writer.write_all(&call.instance_id.to_be_bytes())?;
            writer.write_all(&call.method_id.to_be_bytes())?;
            writer.write_all(&to_u32(call.payload.len())?.to_be_bytes())?;
            writer.write_all(&call.payload)?;
        }
        Ok(())
    }

    /// Reads a complete request, rejecting it as soon as its declared size exceeds `max_size`.
    pub fn from_reader(reader: &mut impl Read, max_size: usize) -> Result<Request, ReadError> {
        let lock_id = read_u32(reader)?;
        let count = read_u32(reader)? as usize;
        let mut total = 8;
        let mut calls = Vec::new();
        for _ in 0..count {
            let instance_id = read_u32(reader)?;
            let method_id = read_u32(reader)?;
            let size = read_u32(reader)? as usize;
            total += 12 + size;
            if total > max_size {
                return Err(ReadError::TooManyBytes {
                    max: max_size,
                    got: total,
                });
            }
            let payload = read_bytes(reader, size)?;
            calls.push(MethodCall {
                instance_id,
                method_id,
                payload,
            });
        }
        Ok(Request { lock_id, calls })
    }
}

impl MethodReply {
    /// Number of bytes following the block size field.
    pub fn block_size(&self) -> usize {
        4 + self.data.len()
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&to_u32(self.block_size())?.to_be_bytes())?;
        writer.write_all(&self.code.raw().to_be_bytes())?;
        writer.write_all(&self.data)
    }
}

impl Response {
    /// Number of bytes this response occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        4 + status_list_size(&self.status)
            + 4
            + status_list_size(&self.errors)
            + 4
            + self
                .replies
                .iter()
                .map(|reply| 4 + reply.block_size())
                .sum::<usize>()
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        write_status_list(writer, &self.status)?;
        write_status_list(writer, &self.errors)?;
        writer.write_all(&to_u32(self.replies.len())?.to_be_bytes())?;
        for reply in &self.replies {
            reply.write_to(writer)?;
        }
        Ok(())
    }

    pub fn from_reader(reader: &mut impl Read, max_size: usize) -> Result<Response, ReadError> {
        let status = read_status_list(reader, max_size)?;
        let errors = read_status_list(reader, max_size)?;
        let count = read_u32(reader)? as usize;
        let mut replies = Vec::new();
        for _ in 0..count {
            let size = read_u32(reader)? as usize;
            if size < 4 {
                return Err(ReadError::InvalidFormat(format!(
                    "Method block of {} bytes cannot hold a return value",
                    size
                )));
            }
            if size > max_size {
                return Err(ReadError::TooManyBytes {
                    max: max_size,
                    got: size,
                });
            }
            let code = Code(read_u32(reader)?);
            let data = read_bytes(reader, size - 4)?;
            replies.push(MethodReply { code, data });
        }
        Ok(Response {
            status,
            errors,
            replies,
        })
    }
}

#[cfg(test)]
mod test {
    use super::DEFAULT_MAX_MESSAGE_SIZE;
    use crate::code::Code;
    use crate::error::ReadError;
    use crate::protocol::{MethodCall, MethodReply, Request, Response, StatusEntry};
    use std::io::Cursor;

    #[test]
    fn write_request() {
        let request = Request::new(7, vec![MethodCall::new(0, 10, vec![0xAA, 0xBB])]);
        let mut out = Vec::new();
        request.write_to(&mut out).unwrap();
        assert_eq!(
            out,
            [
                0, 0, 0, 7, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 10, 0, 0, 0, 2, 0xAA, 0xBB
            ]
        );
        assert_eq!(out.len(), request.encoded_len());
    }

    #[test]
    fn read_request() {
        let data = [
            0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 4, 0, 0, 0, 9, 0,
            0, 0, 1, 0x5A,
        ];
        let request = Request::from_reader(&mut Cursor::new(data), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();
        assert_eq!(request.lock_id, 1);
        assert_eq!(
            request.calls,
            vec![MethodCall::new(3, 8, Vec::<u8>::new()), MethodCall::new(4, 9, vec![0x5A])]
        );
    }

    #[test]
    fn oversized_request_is_rejected() {
        let request = Request::new(0, vec![MethodCall::new(0, 0, vec![0; 64])]);
        let mut out = Vec::new();
        request.write_to(&mut out).unwrap();
        match Request::from_reader(&mut Cursor::new(out), 32) {
            Err(ReadError::TooManyBytes { max, got }) => {
                assert_eq!(max, 32);
                assert_eq!(got, 84);
            }
            other => panic!("expected TooManyBytes, got {:?}", other),
        }
    }

    #[test]
    fn empty_response_is_three_zero_words() {
        let mut out = Vec::new();
        Response::default().write_to(&mut out).unwrap();
        assert_eq!(out, [0; 12]);
    }

    #[test]
    fn write_response_with_error_and_reply() {
        let response = Response {
            status: vec![],
            errors: vec![StatusEntry::new(Code::DEVICE_LOCKED, "alice")],
            replies: vec![MethodReply::new(Code::BAD_CREDENTIALS, Vec::<u8>::new())],
        };
        let mut out = Vec::new();
        response.write_to(&mut out).unwrap();

        let mut expected = vec![0, 0, 0, 0];
        expected.extend_from_slice(&(4u32 + 8 + 5).to_be_bytes());
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(&1001u32.to_be_bytes());
        expected.extend_from_slice(&5u32.to_be_bytes());
        expected.extend_from_slice(b"alice");
        expected.extend_from_slice(&1u32.to_be_bytes());
        expected.extend_from_slice(&4u32.to_be_bytes());
        expected.extend_from_slice(&1010u32.to_be_bytes());
        assert_eq!(out, expected);
        assert_eq!(out.len(), response.encoded_len());

        let parsed = Response::from_reader(&mut Cursor::new(out), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn inconsistent_status_size_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&2u32.to_be_bytes());
        data.extend_from_slice(b"ok");
        match Response::from_reader(&mut Cursor::new(data), DEFAULT_MAX_MESSAGE_SIZE) {
            Err(ReadError::InvalidFormat(_)) => {}
            other => panic!("expected InvalidFormat, got {:?}", other),
        }
    }

    #[test]
    fn truncated_request_is_io_error() {
        let data = [0, 0, 0, 1, 0, 0];
        let err = Request::from_reader(&mut Cursor::new(data), DEFAULT_MAX_MESSAGE_SIZE)
            .unwrap_err();
        assert!(err.is_disconnect());
    }
}
