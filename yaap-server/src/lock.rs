//! The device-wide session lock.
//!
//! Exactly one credential pair may hold the device at a time. The lock is
//! identified on the wire by a random, nonzero `lockId` that the holder
//! presents with every request. A lock that has not been used for longer
//! than the lock timeout is not released eagerly; it is resolved lazily by
//! the next call that checks it.
use std::borrow::Cow;
use std::time::{Duration, Instant};

use yaap_protocol::Code;

use crate::hal::{LockChange, SystemHal};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Credentials are stored in fixed 32 byte buffers including the terminator.
const CREDENTIAL_LEN: usize = 31;

fn truncate(value: &[u8]) -> &[u8] {
    &value[..value.len().min(CREDENTIAL_LEN)]
}

fn printable(value: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(value)
}

/// Credentials are raw bytes; clients may send any encoding.
#[derive(Clone, Debug, Eq, PartialEq)]
struct Credentials {
    sid: Vec<u8>,
    pass: Vec<u8>,
}

impl Credentials {
    fn new(sid: &[u8], pass: &[u8]) -> Credentials {
        Credentials {
            sid: truncate(sid).to_vec(),
            pass: truncate(pass).to_vec(),
        }
    }

    /// The session id is compared ASCII case-insensitively, the password byte for byte.
    fn matches(&self, sid: &[u8], pass: &[u8]) -> bool {
        self.sid.eq_ignore_ascii_case(truncate(sid)) && self.pass == truncate(pass)
    }
}

/// Outcome of authorizing a single method call against the session lock.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct LockCheck {
    pub ok_to_execute: bool,
    pub is_locked: bool,
    pub lock_id_matches: bool,
    pub lock_required: bool,
    pub lock_restored: bool,
    pub lock_timed_out: bool,
}

#[derive(Debug)]
pub struct SessionLock {
    timeout: Duration,
    locked: bool,
    lock_id: u32,
    owner: Option<Credentials>,
    last_access: Instant,
}

impl SessionLock {
    pub fn new(timeout: Duration, now: Instant) -> SessionLock {
        SessionLock {
            timeout,
            locked: false,
            lock_id: 0,
            owner: None,
            last_access: now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// The id handed out by the most recent successful `lock`, or 0 if none was ever issued.
    pub fn lock_id(&self) -> u32 {
        self.lock_id
    }

    /// Session id of the current holder, with invalid UTF-8 replaced for display.
    pub fn holder(&self) -> Option<Cow<'_, str>> {
        if self.locked {
            self.owner.as_ref().map(|owner| printable(&owner.sid))
        } else {
            None
        }
    }

    fn new_lock_id(&self) -> u32 {
        loop {
            let id: u32 = rand::random();
            if id != 0 && id != self.lock_id {
                return id;
            }
        }
    }

    /// Acquire the lock, returning the lock id to present with later requests.
    ///
    /// Locking again with the credentials of the current holder returns the
    /// same id. Any other credentials fail with [Code::BAD_CREDENTIALS] while
    /// the device is locked.
    pub fn lock(
        &mut self,
        sid: impl AsRef<[u8]>,
        pass: impl AsRef<[u8]>,
        now: Instant,
        system: &SystemHal,
    ) -> Result<u32, Code> {
        let (sid, pass) = (sid.as_ref(), pass.as_ref());
        if self.locked {
            let same_holder = self
                .owner
                .as_ref()
                .is_some_and(|owner| owner.matches(sid, pass));
            if !same_holder {
                log::info!(
                    "Lock failed for session ID \"{}\"; already locked by \"{}\"",
                    printable(sid),
                    self.holder().unwrap_or_default()
                );
                return Err(Code::BAD_CREDENTIALS);
            }
            log::info!(
                "Session ID \"{}\" locked again, lockId={:08X}",
                printable(sid),
                self.lock_id
            );
            self.last_access = now;
            system.config_mux(true);
            return Ok(self.lock_id);
        }

        self.owner = Some(Credentials::new(sid, pass));
        self.lock_id = self.new_lock_id();
        self.locked = true;
        self.last_access = now;
        log::info!(
            "Lock acquired by session ID \"{}\", lockId={:08X}",
            printable(sid),
            self.lock_id
        );
        system.notify(LockChange::Locked, true);
        Ok(self.lock_id)
    }

    /// Release the lock. Unlocking an unlocked device succeeds without side effects.
    pub fn unlock(
        &mut self,
        sid: impl AsRef<[u8]>,
        pass: impl AsRef<[u8]>,
        system: &SystemHal,
    ) -> Result<(), Code> {
        let (sid, pass) = (sid.as_ref(), pass.as_ref());
        if !self.locked {
            return Ok(());
        }
        let matches = self
            .owner
            .as_ref()
            .is_some_and(|owner| owner.matches(sid, pass));
        if !matches {
            log::info!(
                "Wrong credentials to unlock; session ID \"{}\", but locked by \"{}\"",
                printable(sid),
                self.holder().unwrap_or_default()
            );
            return Err(Code::BAD_CREDENTIALS);
        }
        log::info!("Lock released by session ID \"{}\"", printable(sid));
        self.locked = false;
        system.notify(LockChange::Unlocked, false);
        Ok(())
    }

    /// Authorize one call presenting `lock_id` to a method that does or does not
    /// `require` the lock.
    pub fn check(
        &mut self,
        lock_id: u32,
        required: bool,
        now: Instant,
        system: &SystemHal,
    ) -> LockCheck {
        let mut check = LockCheck {
            lock_required: required,
            ..LockCheck::default()
        };

        if self.locked && now.saturating_duration_since(self.last_access) > self.timeout {
            if lock_id == self.lock_id {
                log::info!(
                    "Restoring timed-out lock, lockId={:08X}, for session ID \"{}\"",
                    self.lock_id,
                    self.holder().unwrap_or_default()
                );
                self.last_access = now;
                check.lock_restored = true;
                system.notify(LockChange::LockRestored, true);
            } else {
                log::info!(
                    "Lock, lockId={:08X}, timed out for session ID \"{}\"",
                    self.lock_id,
                    self.holder().unwrap_or_default()
                );
                self.locked = false;
                check.lock_timed_out = true;
            }
        }

        if self.locked && lock_id == self.lock_id {
            self.last_access = now;
            check.lock_id_matches = true;
            check.ok_to_execute = true;
        } else if !self.locked && self.lock_id != 0 && lock_id == self.lock_id {
            // A released or expired id is accepted again as long as nobody
            // locked the device in between. This keeps reconnecting clients
            // working but also revives explicitly unlocked sessions.
            log::info!(
                "Restoring last used lockId={:08X} for session ID \"{}\"",
                self.lock_id,
                self.owner
                    .as_ref()
                    .map(|owner| printable(&owner.sid))
                    .unwrap_or_default()
            );
            self.locked = true;
            self.last_access = now;
            check.lock_id_matches = true;
            check.ok_to_execute = true;
            system.config_mux(true);
        } else if !required {
            check.ok_to_execute = true;
        }

        check.is_locked = self.locked;
        check
    }
}
