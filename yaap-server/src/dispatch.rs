//! Execution of one request against the object registry.
use std::time::Instant;

use yaap_protocol::{Code, Request, Response, StatusEntry, payload::PayloadReader};

use crate::hal::SystemHal;
use crate::lock::SessionLock;
use crate::registry::{Invocation, Registry};

/// The state every request is executed against.
///
/// Exactly one `Context` exists per server and it is only ever touched by one
/// request at a time, which serializes the session lock and all hardware access.
pub struct Context {
    pub(crate) registry: Registry,
    pub(crate) lock: SessionLock,
    pub(crate) system: SystemHal,
    reset_requested: bool,
}

impl Context {
    pub fn new(registry: Registry, lock: SessionLock, system: SystemHal) -> Context {
        Context {
            registry,
            lock,
            system,
            reset_requested: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn lock(&self) -> &SessionLock {
        &self.lock
    }

    pub fn system(&self) -> &SystemHal {
        &self.system
    }

    /// Whether a method asked for the server to shut down.
    pub fn reset_requested(&self) -> bool {
        self.reset_requested
    }

    /// Run the calls of `request` in order, stopping at the first failing one.
    pub fn execute(&mut self, request: &Request, now: Instant) -> Response {
        let mut response = Response::default();
        let Context {
            registry: Registry { directory, slots },
            lock,
            system,
            reset_requested,
        } = self;

        for (idx, call) in request.calls.iter().enumerate() {
            let Some(node) = directory.get(call.instance_id) else {
                log::error!(
                    "Bad instance ID ({}) in method call {}",
                    call.instance_id,
                    idx
                );
                response.errors.push(StatusEntry::new(
                    Code::INVALID_INSTANCE_ID,
                    format!("Bad instance ID ({}) in method call {}", call.instance_id, idx),
                ));
                break;
            };
            let Some(info) = node.methods.get(call.method_id as usize) else {
                log::error!(
                    "Bad method ID ({}:{}) in method call {}",
                    call.instance_id,
                    call.method_id,
                    idx
                );
                response.errors.push(StatusEntry::new(
                    Code::INVALID_METHOD_ID,
                    format!(
                        "Bad method ID ({}.{}) in method call {}",
                        call.instance_id, call.method_id, idx
                    ),
                ));
                break;
            };

            let check = lock.check(request.lock_id, info.requires_lock, now, &*system);
            if check.is_locked && !check.lock_id_matches && check.lock_required {
                let holder = lock.holder().unwrap_or_default().into_owned();
                log::info!(
                    "{}.{} refused, device is locked by \"{}\"",
                    node.name,
                    info.name,
                    holder
                );
                response
                    .errors
                    .push(StatusEntry::new(Code::DEVICE_LOCKED, holder));
                break;
            }
            if check.lock_timed_out && check.lock_required {
                response.errors.push(StatusEntry::new(
                    Code::LOCK_MISMATCH,
                    "Your lock has timed out and another user locked the device in the meantime",
                ));
                break;
            }
            if !check.ok_to_execute {
                response.errors.push(StatusEntry::new(
                    Code::LOCK_MISMATCH,
                    "You do not hold the lock on the device",
                ));
                break;
            }

            log::debug!(
                "Calling {}.{} ({}.{})",
                node.name,
                info.name,
                call.instance_id,
                call.method_id
            );
            let mut inv = Invocation {
                args: PayloadReader::new(&call.payload),
                directory: &*directory,
                lock: &mut *lock,
                system: &*system,
                errors: &mut response.errors,
                reset_requested: &mut *reset_requested,
                now,
            };
            let reply = slots.invoke(call.instance_id, call.method_id, &mut inv);
            let unread = inv.args.remaining();
            let code = reply.code();
            let reply = reply.into_method_reply();
            let oversized = u32::try_from(reply.block_size()).is_err();
            response.replies.push(reply);

            if !code.is_success() {
                log::error!(
                    "Method returned {}; terminating multicall; {} of {} methods executed",
                    code,
                    idx + 1,
                    request.calls.len()
                );
                response.errors.push(StatusEntry::new(
                    Code::METHOD_ERROR,
                    "Method returned nonzero value",
                ));
                break;
            }
            if unread != 0 {
                log::warn!("{} unread payload bytes after call {}", unread, idx);
                response.errors.push(StatusEntry::new(
                    Code::MALFORMED_REQUEST,
                    "Method consumed wrong amount of input data",
                ));
                break;
            }
            if oversized {
                log::warn!("Output of call {} does not fit a method block", idx);
                response.errors.push(StatusEntry::new(
                    Code::SERVER_ERROR,
                    "Error in output stream after method call",
                ));
                break;
            }
        }
        response
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use yaap_protocol::{Code, MethodCall, Request, Version, payload::PayloadWriter};

    use super::Context;
    use crate::classes::Device;
    use crate::hal::{HalResult, LockChange, System, SystemHal};
    use crate::lock::SessionLock;
    use crate::registry::{Invocation, Method, Registry, Reply, YaapClass};

    #[derive(Default)]
    struct Board {
        changes: Mutex<Vec<LockChange>>,
    }

    impl System for Board {
        fn device_name(&self) -> HalResult<String> {
            Ok("board".to_owned())
        }

        fn yaap_key(&self) -> HalResult<[u8; 16]> {
            Ok([7; 16])
        }

        fn lock_changed(&self, change: LockChange) -> HalResult<()> {
            self.changes.lock().unwrap().push(change);
            Ok(())
        }

        fn config_mux(&self, _enable: bool) -> HalResult<()> {
            Ok(())
        }
    }

    /// Records the order of calls and fails on demand.
    struct Probe {
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl Probe {
        fn mark(&mut self, inv: &mut Invocation<'_>) -> Reply {
            match inv.parse(|args| args.u32()) {
                Ok(value) => {
                    self.log.lock().unwrap().push(value);
                    if value == 0 {
                        Reply::new(Code::UNSPECIFIED_HW_ERROR)
                    } else {
                        Reply::ok()
                    }
                }
                Err(code) => Reply::new(code),
            }
        }

        fn peek(&mut self, _inv: &mut Invocation<'_>) -> Reply {
            Reply::ok().u32(self.log.lock().unwrap().len() as u32)
        }
    }

    impl YaapClass for Probe {
        const TYPE_NAME: &'static str = "probe";
        const VERSION: Version = Version::new(1, 0, 0);

        fn methods(&self) -> Vec<Method<Self>> {
            vec![
                Method::locked("mark", "void probe.mark(int value)", Probe::mark),
                Method::open("peek", "int probe.peek(void)", Probe::peek),
            ]
        }
    }

    const DEVICE: u32 = 0;
    const LOCK: u32 = 10;
    const MARK: u32 = 8;
    const PEEK: u32 = 9;

    fn context() -> (Context, Arc<Mutex<Vec<u32>>>, u32) {
        let board = Arc::new(Board::default());
        let system = SystemHal::new(board);
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.register_device("device", Device::new(system.clone()));
        let probe = registry.register("probe", Probe { log: log.clone() });
        let lock = SessionLock::new(Duration::from_secs(60), Instant::now());
        (Context::new(registry, lock, system), log, probe)
    }

    fn args(build: impl FnOnce(&mut PayloadWriter)) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        build(&mut writer);
        writer.into_inner()
    }

    fn lock_as(ctx: &mut Context, user: &str) -> Result<u32, Code> {
        let call = MethodCall::new(
            DEVICE,
            LOCK,
            args(|w| {
                w.string(user).string("pw");
            }),
        );
        let response = ctx.execute(&Request::new(0, vec![call]), Instant::now());
        match response.first_error() {
            Some(entry) => Err(entry.code),
            None => Ok(u32::from_be_bytes(
                response.replies[0].data[..4].try_into().unwrap(),
            )),
        }
    }

    fn mark(probe: u32, value: u32) -> MethodCall {
        MethodCall::new(
            probe,
            MARK,
            args(|w| {
                w.u32(value);
            }),
        )
    }

    #[test]
    fn calls_run_in_order_and_stop_at_first_failure() {
        let (mut ctx, log, probe) = context();
        let lock_id = lock_as(&mut ctx, "alice").unwrap();
        let request = Request::new(
            lock_id,
            vec![mark(probe, 1), mark(probe, 2), mark(probe, 0), mark(probe, 3)],
        );
        let response = ctx.execute(&request, Instant::now());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 0]);
        assert_eq!(response.replies.len(), 3);
        assert_eq!(response.replies[2].code, Code::UNSPECIFIED_HW_ERROR);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, Code::METHOD_ERROR);
    }

    #[test]
    fn locked_method_needs_the_lock() {
        let (mut ctx, log, probe) = context();
        let response = ctx.execute(&Request::new(0, vec![mark(probe, 1)]), Instant::now());
        assert_eq!(response.errors[0].code, Code::LOCK_MISMATCH);
        assert_eq!(response.errors[0].message, "You do not hold the lock on the device");
        assert!(response.replies.is_empty());

        lock_as(&mut ctx, "alice").unwrap();
        let request = Request::new(
            0,
            vec![MethodCall::new(probe, PEEK, Vec::<u8>::new()), mark(probe, 1)],
        );
        let response = ctx.execute(&request, Instant::now());
        assert_eq!(response.replies.len(), 1);
        assert_eq!(response.errors[0].code, Code::DEVICE_LOCKED);
        assert_eq!(response.errors[0].message, "alice");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn second_holder_is_told_who_has_the_lock() {
        let (mut ctx, _, _) = context();
        lock_as(&mut ctx, "alice").unwrap();
        let call = MethodCall::new(
            DEVICE,
            LOCK,
            args(|w| {
                w.string("bob").string("x");
            }),
        );
        let response = ctx.execute(&Request::new(0, vec![call]), Instant::now());
        assert_eq!(response.errors[0].code, Code::DEVICE_LOCKED);
        assert_eq!(response.errors[0].message, "alice");
        assert_eq!(response.errors[1].code, Code::METHOD_ERROR);
        assert_eq!(response.replies[0].code, Code::BAD_CREDENTIALS);
        assert_eq!(ctx.lock().holder().as_deref(), Some("alice"));
    }

    #[test]
    fn bad_ids_are_reported() {
        let (mut ctx, _, probe) = context();
        let response = ctx.execute(
            &Request::new(0, vec![MethodCall::new(99, 0, Vec::<u8>::new())]),
            Instant::now(),
        );
        assert_eq!(response.errors[0].code, Code::INVALID_INSTANCE_ID);
        assert_eq!(response.errors[0].message, "Bad instance ID (99) in method call 0");

        let request = Request::new(
            0,
            vec![
                MethodCall::new(probe, 0, Vec::<u8>::new()),
                MethodCall::new(probe, 42, Vec::<u8>::new()),
            ],
        );
        let response = ctx.execute(&request, Instant::now());
        assert_eq!(response.replies.len(), 1);
        assert_eq!(response.errors[0].code, Code::INVALID_METHOD_ID);
        assert_eq!(
            response.errors[0].message,
            format!("Bad method ID ({}.42) in method call 1", probe)
        );
    }

    #[test]
    fn payload_must_be_consumed_exactly() {
        let (mut ctx, _, probe) = context();
        let lock_id = lock_as(&mut ctx, "alice").unwrap();
        let long = MethodCall::new(probe, MARK, vec![0, 0, 0, 5, 0xff]);
        let response = ctx.execute(&Request::new(lock_id, vec![long]), Instant::now());
        assert_eq!(response.replies.len(), 1);
        assert_eq!(response.errors[0].code, Code::MALFORMED_REQUEST);

        let short = MethodCall::new(probe, MARK, vec![0, 0]);
        let response = ctx.execute(&Request::new(lock_id, vec![short]), Instant::now());
        assert_eq!(response.replies[0].code, Code::MALFORMED_REQUEST);
        assert_eq!(response.errors[0].code, Code::METHOD_ERROR);
    }

    #[test]
    fn expired_lock_refuses_foreign_id() {
        let (mut ctx, log, probe) = context();
        let stale = lock_as(&mut ctx, "alice").unwrap();
        let other = stale.wrapping_add(1).max(1);
        let later = Instant::now() + Duration::from_secs(120);
        let response = ctx.execute(&Request::new(other, vec![mark(probe, 1)]), later);
        assert!(response.replies.is_empty());
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].code, Code::LOCK_MISMATCH);
        assert_eq!(
            response.errors[0].message,
            "Your lock has timed out and another user locked the device in the meantime"
        );
        assert!(log.lock().unwrap().is_empty());
        assert!(!ctx.lock().is_locked());
    }

    #[test]
    fn wrong_binary_password_cannot_take_over() {
        let (mut ctx, _, _) = context();
        let lock = |pass: &'static [u8]| {
            MethodCall::new(
                DEVICE,
                LOCK,
                args(|w| {
                    w.string("alice").bytes(pass);
                }),
            )
        };
        let response = ctx.execute(&Request::new(0, vec![lock(b"pw\xff")]), Instant::now());
        assert!(response.is_ok());
        let alice = u32::from_be_bytes(response.replies[0].data[..4].try_into().unwrap());

        let response = ctx.execute(&Request::new(0, vec![lock(b"pw\xfe")]), Instant::now());
        assert_eq!(response.replies[0].code, Code::BAD_CREDENTIALS);
        assert_eq!(*response.replies[0].data, 0u32.to_be_bytes());
        assert_eq!(response.errors[0].code, Code::DEVICE_LOCKED);
        assert_eq!(response.errors[0].message, "alice");
        assert_eq!(ctx.lock().lock_id(), alice);
    }

    #[test]
    fn stale_id_after_takeover_sees_new_holder() {
        let (mut ctx, _, probe) = context();
        let stale = lock_as(&mut ctx, "alice").unwrap();
        let later = Instant::now() + Duration::from_secs(120);
        // bob arrives after the timeout and gets the device
        let call = MethodCall::new(
            DEVICE,
            LOCK,
            args(|w| {
                w.string("bob").string("pw");
            }),
        );
        let response = ctx.execute(&Request::new(0, vec![call]), later);
        assert!(response.is_ok());
        assert_eq!(ctx.lock().holder().as_deref(), Some("bob"));

        let response = ctx.execute(&Request::new(stale, vec![mark(probe, 1)]), later);
        assert_eq!(response.errors[0].code, Code::DEVICE_LOCKED);
        assert_eq!(response.errors[0].message, "bob");
    }
}
