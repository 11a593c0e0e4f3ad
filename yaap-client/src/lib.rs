//! # YAAP Client
//!
//! A blocking client for YAAP debug-access servers.
//!
//! ## Overview
//!
//! A client connection carries one request at a time. Each request is a batch
//! of method calls on server objects, stamped with the lock id the client
//! received from `device.lock`. The server answers with one reply block per
//! executed call and stops at the first failing call.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use yaap_client::YaapClient;
//!
//! let mut client = YaapClient::new("bmc.example:5555")?;
//! client.lock("alice", "secret")?;
//!
//! let relay = client.find("relay0")?.expect("board has relay0");
//! client.call_by_name(relay, "set", |args| {
//!     args.bool(true);
//! })?;
//!
//! client.unlock("alice", "secret")?;
//! ```
//!
//! Method ids are looked up by name through the `methods` built-in and cached
//! per object, so callers never hard code the numbering of a class.
use std::{
    collections::HashMap,
    io::{self, BufWriter, Write},
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use thiserror::Error;
use yaap_protocol::{
    MethodCall, MethodReply, Request, Response, StatusEntry,
    codec::DEFAULT_MAX_MESSAGE_SIZE,
    error::ReadError,
    payload::{PayloadReader, PayloadWriter},
};

/// Instance id of the device object.
pub const DEVICE_ID: u32 = 0;

const MEMBERS: u32 = 2;
const METHODS: u32 = 3;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The server aborted the batch; the first error entry is attached.
    #[error("Server rejected call with {}: {}", .0.code, .0.message)]
    Rejected(StatusEntry),
    #[error("Object {instance} has no method \"{name}\"")]
    UnknownMethod { instance: u32, name: String },
    #[error("Server returned {0} replies for a single call")]
    UnexpectedReplies(usize),
}

/// YAAP client for remote debug access.
pub struct YaapClient {
    tcp: TcpStream,
    lock_id: u32,
    max_message_size: usize,
    methods: HashMap<u32, Vec<(String, u32)>>,
}

impl YaapClient {
    pub fn new(addr: impl ToSocketAddrs) -> io::Result<YaapClient> {
        let tcp = TcpStream::connect(addr)?;
        tcp.set_nodelay(true)?;
        Ok(YaapClient {
            tcp,
            lock_id: 0,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            methods: HashMap::new(),
        })
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.tcp.set_read_timeout(timeout)?;
        self.tcp.set_write_timeout(timeout)
    }

    /// The lock id stamped on every request; 0 until [YaapClient::lock] succeeds.
    pub fn lock_id(&self) -> u32 {
        self.lock_id
    }

    pub fn set_lock_id(&mut self, lock_id: u32) {
        self.lock_id = lock_id;
    }

    /// Send `calls` as one request and wait for the response.
    pub fn execute(&mut self, calls: Vec<MethodCall>) -> Result<Response, ReadError> {
        let request = Request::new(self.lock_id, calls);
        log::trace!(
            "Sending request with lockId={:08X} and {} calls",
            request.lock_id,
            request.calls.len()
        );
        let mut writer = BufWriter::new(&self.tcp);
        request.write_to(&mut writer)?;
        writer.flush()?;
        drop(writer);
        Response::from_reader(&mut self.tcp, self.max_message_size)
    }

    /// Call a single method and return its reply if it succeeded.
    pub fn call(
        &mut self,
        instance: u32,
        method: u32,
        args: impl FnOnce(&mut PayloadWriter),
    ) -> Result<MethodReply, ClientError> {
        let mut writer = PayloadWriter::new();
        args(&mut writer);
        let mut response = self.execute(vec![MethodCall::new(
            instance,
            method,
            writer.into_inner(),
        )])?;
        if let Some(error) = response.errors.first() {
            return Err(ClientError::Rejected(error.clone()));
        }
        match response.replies.len() {
            1 => Ok(response.replies.remove(0)),
            n => Err(ClientError::UnexpectedReplies(n)),
        }
    }

    /// Method id of `name` on `instance`, fetched once per object.
    pub fn method_id(&mut self, instance: u32, name: &str) -> Result<u32, ClientError> {
        if !self.methods.contains_key(&instance) {
            let reply = self.call(instance, METHODS, |_| {})?;
            let table = read_name_table(&reply.data)?;
            self.methods.insert(instance, table);
        }
        self.methods
            .get(&instance)
            .and_then(|table| table.iter().find(|(method, _)| method == name))
            .map(|(_, id)| *id)
            .ok_or_else(|| ClientError::UnknownMethod {
                instance,
                name: name.to_owned(),
            })
    }

    pub fn call_by_name(
        &mut self,
        instance: u32,
        name: &str,
        args: impl FnOnce(&mut PayloadWriter),
    ) -> Result<MethodReply, ClientError> {
        let method = self.method_id(instance, name)?;
        self.call(instance, method, args)
    }

    /// Instance ids of the objects that are not a member of another object.
    pub fn root_members(&mut self) -> Result<Vec<(String, u32)>, ClientError> {
        let reply = self.call_by_name(DEVICE_ID, "rootMembers", |_| {})?;
        Ok(read_name_table(&reply.data)?)
    }

    /// Members of `instance`, as reported by the `members` built-in.
    pub fn members(&mut self, instance: u32) -> Result<Vec<(String, u32)>, ClientError> {
        let reply = self.call(instance, MEMBERS, |_| {})?;
        Ok(read_name_table(&reply.data)?)
    }

    /// Find an object by name, searching the root objects and their members.
    pub fn find(&mut self, name: &str) -> Result<Option<u32>, ClientError> {
        let mut pending = self.root_members()?;
        while let Some((candidate, id)) = pending.pop() {
            if candidate == name {
                return Ok(Some(id));
            }
            if id != DEVICE_ID {
                pending.extend(self.members(id)?);
            }
        }
        Ok(None)
    }

    /// Take the session lock and stamp the returned id on all further requests.
    pub fn lock(&mut self, user: &str, pass: &str) -> Result<u32, ClientError> {
        let reply = self.call_by_name(DEVICE_ID, "lock", |args| {
            args.string(user).string(pass);
        })?;
        let lock_id = PayloadReader::new(&reply.data).u32()?;
        log::debug!("Locked device as {} with lockId={:08X}", user, lock_id);
        self.lock_id = lock_id;
        Ok(lock_id)
    }

    pub fn unlock(&mut self, user: &str, pass: &str) -> Result<(), ClientError> {
        self.call_by_name(DEVICE_ID, "unlock", |args| {
            args.string(user).string(pass);
        })?;
        self.lock_id = 0;
        Ok(())
    }
}

/// Decode `int n, n × (string name, int id)`.
fn read_name_table(data: &[u8]) -> Result<Vec<(String, u32)>, ReadError> {
    let mut reader = PayloadReader::new(data);
    let count = reader.u32()?;
    let mut table = Vec::new();
    for _ in 0..count {
        let name = reader.string()?;
        let id = reader.u32()?;
        table.push((name, id));
    }
    Ok(table)
}

#[cfg(test)]
mod test {
    use yaap_protocol::payload::PayloadWriter;

    use super::read_name_table;

    #[test]
    fn name_table_decodes_in_order() {
        let mut writer = PayloadWriter::new();
        writer.u32(2).string("jtag").u32(3).string("hdt").u32(4);
        let table = read_name_table(&writer.into_inner()).unwrap();
        assert_eq!(
            table,
            vec![("jtag".to_owned(), 3), ("hdt".to_owned(), 4)]
        );
    }

    #[test]
    fn truncated_table_is_an_error() {
        let mut writer = PayloadWriter::new();
        writer.u32(2).string("jtag").u32(3);
        assert!(read_name_table(&writer.into_inner()).is_err());
    }
}
