//! Host-keyed pool of idle, reusable connections.
//!
//! Locking strategy: one `Mutex` guards the whole idle set. Lookup, insert
//! and eviction all happen under it, so pool→worker and worker→pool
//! ownership transfer is atomic with respect to anyone querying pool state.
//! Connections are closed only after the lock is released; no operation
//! blocks on I/O while holding it, and none takes any other lock.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Config;
use crate::connection::Connection;
use crate::host::HostPort;
use crate::transport::Connector;

/// Hands out a connection per host (pooled or freshly constructed) and takes
/// finished connections back for reuse.
///
/// At most one idle connection is kept per host; the overall idle set is
/// bounded by `max_idle_connections`, with least-recently-used eviction when
/// the bound is hit.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    max_idle: usize,
    idle_timeout: Duration,
    // front = least recently used
    idle: Mutex<VecDeque<Connection>>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>, config: &Config) -> Self {
        Self {
            connector,
            max_idle: config.max_idle_connections,
            idle_timeout: config.idle_timeout(),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Return a connection for `host`: a pooled idle one if available and
    /// still fresh, otherwise a newly constructed one. Never blocks on I/O.
    pub fn get_connection(&self, host: &HostPort) -> Connection {
        let mut idle = self.idle.lock().unwrap();
        if let Some(pos) = idle.iter().position(|c| c.host() == host) {
            // remove() cannot fail here, the position was just found
            let connection = idle.remove(pos).unwrap();
            let occupancy = idle.len();
            drop(idle);

            if connection.last_used().elapsed() < self.idle_timeout {
                tracing::debug!(
                    "Reusing pooled connection {} for {}. Idle pool: {}/{}",
                    connection.id(),
                    host,
                    occupancy,
                    self.max_idle
                );
                return connection;
            }

            tracing::debug!(
                "Pooled connection {} for {} sat idle too long, opening a fresh one",
                connection.id(),
                host
            );
            let mut stale = connection;
            stale.close();
        } else {
            drop(idle);
        }

        Connection::new(host.clone(), self.connector.new_transport())
    }

    /// Offer a finished connection back to the idle pool.
    ///
    /// Refused connections are handed back (`Some`) and must be closed by the
    /// caller: non-persistent channels and zero-capacity pools are never
    /// pooled. If the pool already holds an idle connection for the same
    /// host, the staler of the two is closed and the fresher kept; if the
    /// insert overflows the capacity, the least-recently-used idle entry is
    /// evicted. Never blocks on I/O.
    pub fn recycle_connection(&self, connection: Connection) -> Option<Connection> {
        if !connection.can_persist() || self.max_idle == 0 {
            return Some(connection);
        }

        let mut evicted = Vec::new();
        let mut idle = self.idle.lock().unwrap();

        if let Some(pos) = idle.iter().position(|c| c.host() == connection.host()) {
            let existing = idle.remove(pos).unwrap();
            // The incoming connection just finished a request, so it is the
            // fresher of the two.
            tracing::debug!(
                "Replacing idle connection {} for {} with fresher connection {}",
                existing.id(),
                existing.host(),
                connection.id()
            );
            evicted.push(existing);
        } else if idle.len() == self.max_idle {
            let lru = idle.pop_front().unwrap();
            tracing::debug!(
                "Idle pool full, evicting least-recently-used connection {} for {}",
                lru.id(),
                lru.host()
            );
            evicted.push(lru);
        }

        tracing::debug!(
            "Recycled connection {} for {}. Idle pool: {}/{}",
            connection.id(),
            connection.host(),
            idle.len() + 1,
            self.max_idle
        );
        idle.push_back(connection);
        drop(idle);

        for mut connection in evicted {
            connection.close();
        }
        None
    }

    /// Close and drop idle connections unused for longer than the idle
    /// timeout. Returns how many were expired.
    pub fn expire_idle(&self) -> usize {
        let mut idle = self.idle.lock().unwrap();
        let mut expired = Vec::new();
        let mut i = 0;
        while i < idle.len() {
            if idle[i].last_used().elapsed() >= self.idle_timeout {
                expired.push(idle.remove(i).unwrap());
            } else {
                i += 1;
            }
        }
        drop(idle);

        let count = expired.len();
        for mut connection in expired {
            connection.close();
        }
        if count > 0 {
            tracing::debug!("Expired {} idle connection(s)", count);
        }
        count
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    pub fn has_idle(&self, host: &HostPort) -> bool {
        self.idle.lock().unwrap().iter().any(|c| c.host() == host)
    }
}
