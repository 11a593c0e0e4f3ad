//! # YAAP Protocol Library
//!
//! This crate implements YAARP, the binary framing that carries YAAP method
//! calls between a debug host and a debug-access server, together with the
//! primitive encodings used inside method payloads.
//!
//! ## Overview
//!
//! A client sends a [`Request`] consisting of a session lock id and an ordered
//! batch of method calls. Each call names an object (instance id), a method of
//! that object (method id) and carries the encoded arguments. The server
//! answers with exactly one [`Response`] holding a status list, an error list
//! and one [`MethodReply`] per method that actually executed.
//!
//! This library allows you to:
//!
//! - Serialize and deserialize requests and responses over any `Read`/`Write`
//! - Encode and decode method arguments with [`payload::PayloadWriter`] and
//!   [`payload::PayloadReader`]
//! - Decode requests incrementally from partial socket reads (`tokio` feature)
//!
//! ## Basic Usage
//!
//! ### Writing a Request
//!
//! ```
//! use yaap_protocol::{MethodCall, Request, payload::PayloadWriter};
//!
//! // device.lock("alice", "s3cr3t") is method 10 of the device object (instance 0)
//! let mut args = PayloadWriter::new();
//! args.string("alice").string("s3cr3t");
//! let request = Request::new(0, vec![MethodCall::new(0, 10, args.into_inner())]);
//!
//! let mut buffer = Vec::new();
//! request.write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer.len(), request.encoded_len());
//! ```
//!
//! ### Reading a Response
//!
//! ```
//! use yaap_protocol::{Code, Response, codec::DEFAULT_MAX_MESSAGE_SIZE};
//! use std::io::Cursor;
//!
//! // no status, no errors, one reply carrying E_SUCCESS and a lock id of 42
//! let data = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 42];
//! let response = Response::from_reader(&mut Cursor::new(data), DEFAULT_MAX_MESSAGE_SIZE)
//!     .expect("Response should parse");
//! assert!(response.is_ok());
//! assert_eq!(response.replies[0].code, Code::SUCCESS);
//! assert_eq!(&response.replies[0].data[..], &[0, 0, 0, 42]);
//! ```
//!
//! ## Message Format
//!
//! All integers are 32 bit big endian.
//!
//! - **Request**: `[lockId][methodCount]{[instanceId][methodId][payloadSize][payload]}`
//! - **Response**: `[status list][error list][methodCount]{[blockSize][retval][fields]}`
//! - **Status list**: `[size]`, followed by `[count]{[code][len][text]}` if `size` is nonzero
//!
//! ## Error Handling
//!
//! Parsing errors are reported as [`error::ReadError`]. Result codes carried
//! inside the protocol are represented by [`Code`].

pub mod protocol;
pub use protocol::*;
pub mod code;
pub use code::Code;
pub mod codec;
pub mod error;
#[cfg(feature = "tokio")]
pub mod framing;
pub mod payload;
