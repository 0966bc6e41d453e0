use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::error::TransportError;
use crate::host::HostPort;
use crate::transport::{Reply, Transport};
use crate::worker::WorkerId;

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A live channel to exactly one remote host.
///
/// A connection is owned by at most one worker at any instant: either a
/// worker holds it exclusively while a request is in flight, or it sits in
/// the manager's idle pool. The owning-worker back-reference exists purely
/// for introspection and is guarded by a per-instance lock so a racing
/// introspector never observes a half-updated value.
pub struct Connection {
    id: u64,
    host: HostPort,
    transport: Box<dyn Transport>,
    opened: bool,
    can_persist: bool,
    last_used: Instant,
    worker: Mutex<Option<WorkerId>>,
}

impl Connection {
    pub(crate) fn new(host: HostPort, transport: Box<dyn Transport>) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            host,
            transport,
            opened: false,
            can_persist: false,
            last_used: Instant::now(),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> &HostPort {
        &self.host
    }

    /// Drive one request through the underlying channel, opening it on first
    /// use. Refreshes the persistence flag from the reply's keep-alive
    /// signal; any failure clears it so the channel can never be recycled.
    pub fn process_request(&mut self, payload: &[u8]) -> Result<Reply, TransportError> {
        if !self.opened {
            self.transport.open(&self.host)?;
            self.opened = true;
            tracing::debug!("Opened connection {} to {}", self.id, self.host);
        }

        let result = self
            .transport
            .write(payload)
            .and_then(|()| self.transport.read());

        match &result {
            Ok(reply) => {
                self.can_persist = reply.keep_alive;
                self.last_used = Instant::now();
            }
            Err(_) => self.can_persist = false,
        }

        result
    }

    /// Whether the channel may serve another request to the same host. Only
    /// meaningful after `process_request` has returned.
    pub fn can_persist(&self) -> bool {
        self.can_persist
    }

    pub(crate) fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Release the underlying channel. Idempotent.
    pub fn close(&mut self) {
        if !self.opened {
            return;
        }
        self.opened = false;
        if let Err(err) = self.transport.close() {
            tracing::debug!("Closing connection {} to {} failed: {}", self.id, self.host, err);
        }
    }

    /// Record or clear the owning worker. Called set-before-use and
    /// clear-after by the worker driving this connection.
    pub(crate) fn set_worker(&self, worker: Option<WorkerId>) {
        *self.worker.lock().unwrap() = worker;
    }

    /// The worker currently driving this connection, if any.
    pub fn worker(&self) -> Option<WorkerId> {
        *self.worker.lock().unwrap()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("opened", &self.opened)
            .field("can_persist", &self.can_persist)
            .finish()
    }
}
