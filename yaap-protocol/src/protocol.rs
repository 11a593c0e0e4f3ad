use std::fmt::Display;

use crate::code::Code;

/// Semantic version of a YAAP class or of the protocol itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    point: u32,
}

impl Version {
    /// Version 1.0.0 of the YAAP protocol
    pub const V1_0_0: Version = Version::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, point: u32) -> Version {
        Version {
            major,
            minor,
            point,
        }
    }

    /// Returns the protocol version spoken by this implementation
    pub fn latest() -> Version {
        Version::V1_0_0
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn point(&self) -> u32 {
        self.point
    }
}

#[test]
fn version_ordering() {
    assert!(Version::new(1, 0, 9) < Version::new(1, 1, 0));
    assert!(Version::new(2, 0, 0) > Version::new(1, 9, 9));
}

impl Default for Version {
    fn default() -> Self {
        Self::V1_0_0
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.point)
    }
}

/// A single method invocation inside a [Request].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodCall {
    /// The object the method is invoked on
    pub instance_id: u32,
    /// Index of the method within the object's method table
    pub method_id: u32,
    /// Encoded method arguments
    pub payload: Box<[u8]>,
}

impl MethodCall {
    pub fn new(instance_id: u32, method_id: u32, payload: impl Into<Box<[u8]>>) -> MethodCall {
        MethodCall {
            instance_id,
            method_id,
            payload: payload.into(),
        }
    }
}

/// A Request is transfered from the client to the server.
/// The server executes the contained calls strictly in order and answers every
/// request with exactly one [Response].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Request {
    /// The session lock presented by the client. `0` if the client does not hold a lock.
    pub lock_id: u32,
    pub calls: Vec<MethodCall>,
}

impl Request {
    pub fn new(lock_id: u32, calls: Vec<MethodCall>) -> Request {
        Request { lock_id, calls }
    }

    /// Number of bytes this request occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        8 + self
            .calls
            .iter()
            .map(|call| 12 + call.payload.len())
            .sum::<usize>()
    }
}

/// An entry of the status or the error list of a [Response].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusEntry {
    pub code: Code,
    pub message: String,
}

impl StatusEntry {
    pub fn new(code: Code, message: impl Into<String>) -> StatusEntry {
        StatusEntry {
            code,
            message: message.into(),
        }
    }
}

/// The output of one executed method: its return value followed by the method specific fields.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MethodReply {
    pub code: Code,
    pub data: Box<[u8]>,
}

impl MethodReply {
    pub fn new(code: Code, data: impl Into<Box<[u8]>>) -> MethodReply {
        MethodReply {
            code,
            data: data.into(),
        }
    }
}

/// The server's answer to a [Request].
///
/// Replies are only present for methods that actually executed, so a batch
/// that was aborted half way carries fewer replies than it had calls.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Response {
    pub status: Vec<StatusEntry>,
    pub errors: Vec<StatusEntry>,
    pub replies: Vec<MethodReply>,
}

impl Response {
    /// The first error entry, which is where clients stop processing a batch.
    pub fn first_error(&self) -> Option<&StatusEntry> {
        self.errors.first()
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
