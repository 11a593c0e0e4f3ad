//! Bookkeeping of the open client connections.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Connection ids are handed out by the server in accept order.
pub type ConnectionId = u64;

#[derive(Debug)]
struct Entry<T> {
    id: ConnectionId,
    last_access: Instant,
    peer: T,
}

/// The open connections, least recently served first.
///
/// A connection is moved to the back whenever it is served. The order only
/// serves idle bookkeeping and does not pick which request runs next: the
/// server handles requests in arrival order from a bounded channel, whose
/// waiting senders are queued first come first served.
#[derive(Debug)]
pub struct ConnectionSet<T> {
    idle_timeout: Duration,
    entries: VecDeque<Entry<T>>,
}

impl<T> ConnectionSet<T> {
    pub fn new(idle_timeout: Duration) -> ConnectionSet<T> {
        ConnectionSet {
            idle_timeout,
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, id: ConnectionId, peer: T, now: Instant) {
        self.entries.push_back(Entry {
            id,
            last_access: now,
            peer,
        });
    }

    fn position(&self, id: ConnectionId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Mark `id` as served at `now` and rotate it to the back, behind every
    /// connection that waited longer.
    ///
    /// Returns the peer, or `None` if the connection is gone.
    pub fn touch(&mut self, id: ConnectionId, now: Instant) -> Option<&mut T> {
        let idx = self.position(id)?;
        let mut entry = self.entries.remove(idx)?;
        entry.last_access = now;
        self.entries.push_back(entry);
        self.entries.back_mut().map(|entry| &mut entry.peer)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut T> {
        let idx = self.position(id)?;
        self.entries.get_mut(idx).map(|entry| &mut entry.peer)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<T> {
        let idx = self.position(id)?;
        self.entries.remove(idx).map(|entry| entry.peer)
    }

    /// Remove every connection that has been idle for at least the idle timeout.
    pub fn evict_idle(&mut self, now: Instant) -> Vec<(ConnectionId, T)> {
        let timeout = self.idle_timeout;
        let (idle, active): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| now.saturating_duration_since(entry.last_access) >= timeout);
        self.entries = active.into();
        idle.into_iter().map(|entry| (entry.id, entry.peer)).collect()
    }

    /// The instant at which the next connection becomes idle.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .map(|entry| entry.last_access + self.idle_timeout)
            .min()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }
}
