//! The object directory and the method tables of every registered object.
//!
//! Objects receive their instance id in registration order. Id 0 always
//! belongs to the `device` object: if another object registers first, slot 0
//! is held by a placeholder until the device arrives. Every object carries
//! the eight built-in methods listed in [BUILTIN_METHODS] ahead of its own
//! methods, so class methods start at id 8.
use std::time::Instant;

use yaap_protocol::{
    Code, MethodReply, StatusEntry, Version, error::ReadError,
    payload::{PayloadReader, PayloadWriter},
};

use crate::hal::SystemHal;
use crate::lock::SessionLock;

/// Version of the built-in method set every object inherits.
pub const BASE_VERSION: Version = Version::new(1, 1, 0);

const PLACEHOLDER_TYPE: &str = "reserved";

/// Signature string, lock requirement and name of a method as reported by `methodsVerbose`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MethodInfo {
    pub name: &'static str,
    pub signature: &'static str,
    pub requires_lock: bool,
}

pub const BUILTIN_METHODS: [MethodInfo; 8] = [
    MethodInfo {
        name: "type",
        signature: "char [] type(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "version",
        signature: "struct { int major; int minor; int point; } version(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "members",
        signature: "struct { char [] name; int id; } [] members(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "methods",
        signature: "struct { char [] name; int id; } [] methods(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "methodsVerbose",
        signature: "struct { char [] name; int id; char [] signature; } [] methodsVerbose(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "available",
        signature: "struct { bool reserved; char [] name; char [] comment; } available(void)",
        requires_lock: false,
    },
    MethodInfo {
        name: "reserve",
        signature: "void reserve(char [] name, char [] comment)",
        requires_lock: true,
    },
    MethodInfo {
        name: "unreserve",
        signature: "void unreserve(void)",
        requires_lock: true,
    },
];

/// The output of one method: its return value and the encoded fields following it.
#[derive(Debug)]
pub struct Reply {
    code: Code,
    fields: PayloadWriter,
}

impl Reply {
    pub fn new(code: impl Into<Code>) -> Reply {
        Reply {
            code: code.into(),
            fields: PayloadWriter::new(),
        }
    }

    pub fn ok() -> Reply {
        Reply::new(Code::SUCCESS)
    }

    /// A reply with the return value taken from `result` and no fields.
    pub fn status(result: Result<(), Code>) -> Reply {
        Reply::new(result.err().unwrap_or(Code::SUCCESS))
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn fields(&mut self) -> &mut PayloadWriter {
        &mut self.fields
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.fields.u32(value);
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.fields.u64(value);
        self
    }

    pub fn f64(mut self, value: f64) -> Self {
        self.fields.f64(value);
        self
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.fields.u8(value);
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.fields.bool(value);
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.fields.bytes(value);
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        self.fields.string(value);
        self
    }

    pub fn into_method_reply(self) -> MethodReply {
        MethodReply::new(self.code, self.fields.into_inner())
    }
}

/// Everything a method handler may touch while it runs.
pub struct Invocation<'a> {
    pub(crate) args: PayloadReader<'a>,
    pub(crate) directory: &'a Directory,
    pub(crate) lock: &'a mut SessionLock,
    pub(crate) system: &'a SystemHal,
    pub(crate) errors: &'a mut Vec<StatusEntry>,
    pub(crate) reset_requested: &'a mut bool,
    pub(crate) now: Instant,
}

impl<'a> Invocation<'a> {
    /// Decode the method arguments. A truncated payload yields [Code::MALFORMED_REQUEST].
    pub fn parse<T>(
        &mut self,
        decode: impl FnOnce(&mut PayloadReader<'a>) -> Result<T, ReadError>,
    ) -> Result<T, Code> {
        decode(&mut self.args).map_err(|err| {
            log::error!("Input stream error: {}", err);
            Code::MALFORMED_REQUEST
        })
    }

    /// Add an entry to the response's error list.
    pub fn add_error(&mut self, code: Code, message: impl Into<String>) {
        self.errors.push(StatusEntry::new(code, message));
    }

    pub fn directory(&self) -> &Directory {
        self.directory
    }

    pub fn lock(&mut self) -> &mut SessionLock {
        self.lock
    }

    pub fn system(&self) -> &SystemHal {
        self.system
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Shut the server down once the current response has been sent.
    pub fn request_reset(&mut self) {
        *self.reset_requested = true;
    }
}

pub type Handler<T> = fn(&mut T, &mut Invocation<'_>) -> Reply;

pub struct Method<T> {
    pub info: MethodInfo,
    pub handler: Handler<T>,
}

impl<T> Method<T> {
    /// A method callable only by the holder of the session lock.
    pub fn locked(name: &'static str, signature: &'static str, handler: Handler<T>) -> Method<T> {
        Method {
            info: MethodInfo {
                name,
                signature,
                requires_lock: true,
            },
            handler,
        }
    }

    /// A method anyone may call.
    pub fn open(name: &'static str, signature: &'static str, handler: Handler<T>) -> Method<T> {
        Method {
            info: MethodInfo {
                name,
                signature,
                requires_lock: false,
            },
            handler,
        }
    }
}

/// A YAAP class: a type name, a version and a method table.
///
/// `methods` is called once at registration. Classes with optional hardware
/// capabilities decide there which methods they expose.
pub trait YaapClass: Send + Sized + 'static {
    const TYPE_NAME: &'static str;
    const VERSION: Version;

    fn methods(&self) -> Vec<Method<Self>>;
}

/// Type-erased access to a registered object.
pub trait Dispatch: Send {
    /// Invoke the class method at `index`, counted from the first method after the built-ins.
    fn invoke(&mut self, index: usize, inv: &mut Invocation<'_>) -> Reply;
}

struct Bound<T> {
    object: T,
    handlers: Vec<Handler<T>>,
}

impl<T: YaapClass> Dispatch for Bound<T> {
    fn invoke(&mut self, index: usize, inv: &mut Invocation<'_>) -> Reply {
        match self.handlers.get(index) {
            Some(handler) => handler(&mut self.object, inv),
            None => Reply::new(Code::INVALID_METHOD_ID),
        }
    }
}

/// Static description of a registered object.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub type_name: &'static str,
    pub version: Version,
    pub parent: Option<u32>,
    pub members: Vec<u32>,
    pub methods: Vec<MethodInfo>,
}

impl Node {
    fn placeholder() -> Node {
        Node {
            name: String::new(),
            type_name: PLACEHOLDER_TYPE,
            version: Version::new(0, 0, 0),
            parent: None,
            members: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn is_placeholder(&self) -> bool {
        self.type_name == PLACEHOLDER_TYPE
    }
}

#[derive(Debug, Default)]
pub struct Directory {
    nodes: Vec<Node>,
}

impl Directory {
    pub fn get(&self, id: u32) -> Option<&Node> {
        self.nodes
            .get(id as usize)
            .filter(|node| !node.is_placeholder())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn method(&self, id: u32, method_id: u32) -> Option<&MethodInfo> {
        self.get(id)?.methods.get(method_id as usize)
    }

    /// Objects that are not a member of another object.
    pub fn root_members(&self) -> impl Iterator<Item = (u32, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none() && !node.is_placeholder())
            .map(|(id, node)| (id as u32, node))
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.nodes
            .iter()
            .position(|node| node.name == name && !node.is_placeholder())
            .map(|id| id as u32)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Reservation {
    pub reserved: bool,
    pub name: String,
    pub comment: String,
}

/// Mutable per-object state: the advisory reservation and the object itself.
#[derive(Default)]
pub(crate) struct Slots {
    reservations: Vec<Reservation>,
    objects: Vec<Option<Box<dyn Dispatch>>>,
}

impl Slots {
    pub(crate) fn invoke(
        &mut self,
        id: u32,
        method_id: u32,
        inv: &mut Invocation<'_>,
    ) -> Reply {
        let id = id as usize;
        let method = method_id as usize;
        if method < BUILTIN_METHODS.len() {
            let Some(reservation) = self.reservations.get_mut(id) else {
                return Reply::new(Code::INVALID_INSTANCE_ID);
            };
            return invoke_builtin(id as u32, method, reservation, inv);
        }
        match self.objects.get_mut(id) {
            Some(Some(object)) => object.invoke(method - BUILTIN_METHODS.len(), inv),
            _ => Reply::new(Code::INVALID_INSTANCE_ID),
        }
    }
}

fn member_list(reply: &mut Reply, directory: &Directory, ids: &[u32]) {
    let out = reply.fields();
    out.u32(ids.len() as u32);
    for id in ids {
        let name = directory.get(*id).map(|node| node.name.as_str());
        out.string(name.unwrap_or_default()).u32(*id);
    }
}

fn invoke_builtin(
    id: u32,
    method: usize,
    reservation: &mut Reservation,
    inv: &mut Invocation<'_>,
) -> Reply {
    let directory = inv.directory;
    let Some(node) = directory.get(id) else {
        return Reply::new(Code::INVALID_INSTANCE_ID);
    };
    match method {
        0 => Reply::ok().string(node.type_name),
        1 => Reply::ok()
            .u32(node.version.major())
            .u32(node.version.minor())
            .u32(node.version.point()),
        2 => {
            let mut reply = Reply::ok();
            member_list(&mut reply, directory, &node.members);
            reply
        }
        3 | 4 => {
            let mut reply = Reply::ok();
            let out = reply.fields();
            out.u32(node.methods.len() as u32);
            for (idx, info) in node.methods.iter().enumerate() {
                out.string(info.name).u32(idx as u32);
                if method == 4 {
                    out.string(info.signature);
                }
            }
            reply
        }
        5 => Reply::ok()
            .bool(reservation.reserved)
            .string(&reservation.name)
            .string(&reservation.comment),
        6 => {
            let (name, comment) = match inv.parse(|args| Ok((args.string()?, args.string()?))) {
                Ok(args) => args,
                Err(code) => return Reply::new(code),
            };
            if reservation.reserved {
                return Reply::new(Code::ALREADY_RESERVED);
            }
            log::info!("{} reserved by \"{}\" ({})", node.name, name, comment);
            *reservation = Reservation {
                reserved: true,
                name,
                comment,
            };
            Reply::ok()
        }
        7 => {
            let code = if reservation.reserved {
                Code::SUCCESS
            } else {
                Code::NOT_RESERVED
            };
            *reservation = Reservation::default();
            Reply::new(code)
        }
        _ => Reply::new(Code::INVALID_METHOD_ID),
    }
}

/// All YAAP objects of the server.
#[derive(Default)]
pub struct Registry {
    pub(crate) directory: Directory,
    pub(crate) slots: Slots,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    fn entry<T: YaapClass>(name: &str, object: T) -> (Node, Box<dyn Dispatch>) {
        let methods = object.methods();
        let mut infos = BUILTIN_METHODS.to_vec();
        infos.extend(methods.iter().map(|method| method.info.clone()));
        log::debug!(
            "Registering {} \"{}\" v{} with {} methods",
            T::TYPE_NAME,
            name,
            T::VERSION,
            infos.len()
        );
        let node = Node {
            name: name.to_owned(),
            type_name: T::TYPE_NAME,
            version: T::VERSION,
            parent: None,
            members: Vec::new(),
            methods: infos,
        };
        let bound = Bound {
            object,
            handlers: methods.into_iter().map(|method| method.handler).collect(),
        };
        (node, Box::new(bound))
    }

    /// Register an object and return its instance id. Never returns 0.
    pub fn register<T: YaapClass>(&mut self, name: &str, object: T) -> u32 {
        if self.directory.nodes.is_empty() {
            self.push(Node::placeholder(), None);
        }
        let (node, dispatch) = Registry::entry(name, object);
        self.push(node, Some(dispatch))
    }

    /// Register the device object, which always receives id 0.
    pub fn register_device<T: YaapClass>(&mut self, name: &str, device: T) -> u32 {
        let (node, dispatch) = Registry::entry(name, device);
        if self.directory.nodes.is_empty() {
            return self.push(node, Some(dispatch));
        }
        if !self.directory.nodes[0].is_placeholder() {
            log::warn!(
                "Replacing device object \"{}\" with \"{}\"",
                self.directory.nodes[0].name,
                name
            );
        }
        self.directory.nodes[0] = node;
        self.slots.reservations[0] = Reservation::default();
        self.slots.objects[0] = Some(dispatch);
        0
    }

    fn push(&mut self, node: Node, object: Option<Box<dyn Dispatch>>) -> u32 {
        let id = self.directory.nodes.len() as u32;
        self.directory.nodes.push(node);
        self.slots.reservations.push(Reservation::default());
        self.slots.objects.push(object);
        id
    }

    /// Make `member` a member of `parent`. Returns false if either id is unknown.
    pub fn add_member(&mut self, parent: u32, member: u32) -> bool {
        if self.directory.get(parent).is_none() || self.directory.get(member).is_none() {
            return false;
        }
        self.directory.nodes[member as usize].parent = Some(parent);
        self.directory.nodes[parent as usize].members.push(member);
        true
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use yaap_protocol::{Code, Version, payload::PayloadReader};

    use super::{Invocation, Method, Registry, Reply, YaapClass};
    use crate::hal::{HalResult, System, SystemHal};
    use crate::lock::SessionLock;

    struct Counter {
        count: u32,
    }

    impl Counter {
        fn bump(&mut self, _inv: &mut Invocation<'_>) -> Reply {
            self.count += 1;
            Reply::ok().u32(self.count)
        }
    }

    impl YaapClass for Counter {
        const TYPE_NAME: &'static str = "counter";
        const VERSION: Version = Version::new(1, 0, 0);

        fn methods(&self) -> Vec<Method<Self>> {
            vec![Method::locked("bump", "int counter.bump(void)", Counter::bump)]
        }
    }

    struct Device;

    impl YaapClass for Device {
        const TYPE_NAME: &'static str = "device";
        const VERSION: Version = Version::new(1, 0, 9);

        fn methods(&self) -> Vec<Method<Self>> {
            Vec::new()
        }
    }

    struct NoSystem;

    impl System for NoSystem {
        fn device_name(&self) -> HalResult<String> {
            Ok(String::new())
        }

        fn yaap_key(&self) -> HalResult<[u8; 16]> {
            Err(Code::NOT_IMPLEMENTED)
        }

        fn config_mux(&self, _enable: bool) -> HalResult<()> {
            Ok(())
        }
    }

    fn call(registry: &mut Registry, id: u32, method: u32, payload: &[u8]) -> Reply {
        let system = SystemHal::new(std::sync::Arc::new(NoSystem));
        let mut lock = SessionLock::new(Duration::from_secs(1), Instant::now());
        let mut errors = Vec::new();
        let mut reset = false;
        let Registry { directory, slots } = registry;
        let mut inv = Invocation {
            args: PayloadReader::new(payload),
            directory,
            lock: &mut lock,
            system: &system,
            errors: &mut errors,
            reset_requested: &mut reset,
            now: Instant::now(),
        };
        slots.invoke(id, method, &mut inv)
    }

    #[test]
    fn device_gets_id_zero_even_when_registered_late() {
        let mut registry = Registry::new();
        let counter = registry.register("counter", Counter { count: 0 });
        assert_eq!(counter, 1);
        assert!(registry.directory().get(0).is_none());
        assert_eq!(registry.register_device("dev", Device), 0);
        assert_eq!(registry.directory().get(0).unwrap().type_name, "device");
        assert_eq!(registry.register("other", Counter { count: 0 }), 2);
    }

    #[test]
    fn class_methods_follow_builtins() {
        let mut registry = Registry::new();
        registry.register_device("dev", Device);
        let id = registry.register("counter", Counter { count: 0 });
        let node = registry.directory().get(id).unwrap();
        assert_eq!(node.methods.len(), 9);
        assert_eq!(node.methods[8].name, "bump");
        let reply = call(&mut registry, id, 8, &[]).into_method_reply();
        assert_eq!(&reply.data[..], &[0, 0, 0, 1]);
        let reply = call(&mut registry, id, 0, &[]).into_method_reply();
        assert_eq!(&reply.data[..], b"\0\0\0\x07counter");
    }

    #[test]
    fn reservation_cycle() {
        let mut registry = Registry::new();
        let id = registry.register("counter", Counter { count: 0 });
        let mut args = yaap_protocol::payload::PayloadWriter::new();
        args.string("alice").string("debugging");
        let args = args.into_inner();
        assert_eq!(call(&mut registry, id, 6, &args).code(), Code::SUCCESS);
        assert_eq!(call(&mut registry, id, 6, &args).code(), Code::ALREADY_RESERVED);
        let reply = call(&mut registry, id, 5, &[]).into_method_reply();
        assert_eq!(reply.data[0], 1);
        assert_eq!(call(&mut registry, id, 7, &[]).code(), Code::SUCCESS);
        assert_eq!(call(&mut registry, id, 7, &[]).code(), Code::NOT_RESERVED);
        assert_eq!(call(&mut registry, id, 6, &[0, 0]).code(), Code::MALFORMED_REQUEST);
    }

    #[test]
    fn members_and_roots() {
        let mut registry = Registry::new();
        registry.register_device("dev", Device);
        let group = registry.register("group", Counter { count: 0 });
        let child = registry.register("child", Counter { count: 0 });
        assert!(registry.add_member(group, child));
        assert!(!registry.add_member(group, 42));
        let roots: Vec<u32> = registry
            .directory()
            .root_members()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(roots, vec![0, group]);
        let reply = call(&mut registry, group, 2, &[]).into_method_reply();
        assert_eq!(&reply.data[..4], &[0, 0, 0, 1]);
    }
}
