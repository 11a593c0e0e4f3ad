//! Incremental framing for use with `tokio_util::codec`.
//!
//! A request may arrive split across any number of socket reads. The
//! [RequestDecoder] consumes whole fields as soon as they are available and
//! remembers where it stopped, so a field split between two reads is
//! reassembled without buffering the message twice.
use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    codec::DEFAULT_MAX_MESSAGE_SIZE,
    error::ReadError,
    protocol::{MethodCall, Request, Response},
};

/// The field the decoder expects next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeState {
    LockId,
    MethodCount,
    InstanceId,
    MethodId,
    PayloadSize,
    Payload,
    Done,
}

#[derive(Debug)]
pub struct RequestDecoder {
    max_size: usize,
    state: DecodeState,
    received: usize,
    lock_id: u32,
    calls_left: u32,
    instance_id: u32,
    method_id: u32,
    payload_size: usize,
    calls: Vec<MethodCall>,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        RequestDecoder::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl RequestDecoder {
    pub fn new(max_size: usize) -> RequestDecoder {
        RequestDecoder {
            max_size,
            state: DecodeState::LockId,
            received: 0,
            lock_id: 0,
            calls_left: 0,
            instance_id: 0,
            method_id: 0,
            payload_size: 0,
            calls: Vec::new(),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// True while no byte of the next message has been consumed.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::LockId && self.received == 0
    }

    fn account(&mut self, len: usize) -> Result<(), ReadError> {
        self.received = self.received.saturating_add(len);
        if self.received > self.max_size {
            return Err(ReadError::TooManyBytes {
                max: self.max_size,
                got: self.received,
            });
        }
        Ok(())
    }

    fn next_u32(&mut self, src: &mut BytesMut) -> Result<Option<u32>, ReadError> {
        if src.len() < 4 {
            return Ok(None);
        }
        self.account(4)?;
        Ok(Some(src.get_u32()))
    }

    fn finish_call(&mut self, payload: Box<[u8]>) {
        self.calls.push(MethodCall {
            instance_id: self.instance_id,
            method_id: self.method_id,
            payload,
        });
        self.calls_left -= 1;
        self.state = if self.calls_left == 0 {
            DecodeState::Done
        } else {
            DecodeState::InstanceId
        };
    }

    fn take_request(&mut self) -> Request {
        let request = Request {
            lock_id: self.lock_id,
            calls: std::mem::take(&mut self.calls),
        };
        self.state = DecodeState::LockId;
        self.received = 0;
        self.lock_id = 0;
        self.calls_left = 0;
        request
    }
}

impl Decoder for RequestDecoder {
    type Item = Request;
    type Error = ReadError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, ReadError> {
        loop {
            match self.state {
                DecodeState::LockId => {
                    let Some(lock_id) = self.next_u32(src)? else {
                        return Ok(None);
                    };
                    self.lock_id = lock_id;
                    self.state = DecodeState::MethodCount;
                }
                DecodeState::MethodCount => {
                    let Some(count) = self.next_u32(src)? else {
                        return Ok(None);
                    };
                    if count == 0 {
                        log::warn!("Received request without any method calls");
                        self.state = DecodeState::Done;
                    } else {
                        self.calls_left = count;
                        self.state = DecodeState::InstanceId;
                    }
                }
                DecodeState::InstanceId => {
                    let Some(instance_id) = self.next_u32(src)? else {
                        return Ok(None);
                    };
                    self.instance_id = instance_id;
                    self.state = DecodeState::MethodId;
                }
                DecodeState::MethodId => {
                    let Some(method_id) = self.next_u32(src)? else {
                        return Ok(None);
                    };
                    self.method_id = method_id;
                    self.state = DecodeState::PayloadSize;
                }
                DecodeState::PayloadSize => {
                    let Some(size) = self.next_u32(src)? else {
                        return Ok(None);
                    };
                    let size = size as usize;
                    self.account(size)?;
                    self.payload_size = size;
                    if size == 0 {
                        self.finish_call(Box::default());
                    } else {
                        self.state = DecodeState::Payload;
                    }
                }
                DecodeState::Payload => {
                    if src.len() < self.payload_size {
                        src.reserve(self.payload_size - src.len());
                        return Ok(None);
                    }
                    let payload = src.split_to(self.payload_size).to_vec().into_boxed_slice();
                    self.finish_call(payload);
                }
                DecodeState::Done => return Ok(Some(self.take_request())),
            }
        }
    }
}

/// Serializes responses into an outgoing buffer.
#[derive(Debug, Default)]
pub struct ResponseEncoder;

impl Encoder<&Response> for ResponseEncoder {
    type Error = io::Error;

    fn encode(&mut self, item: &Response, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(item.encoded_len());
        item.write_to(&mut dst.writer())
    }
}
