use std::fmt;
use std::sync::mpsc;

use crate::error::TransportError;
use crate::host::HostPort;
use crate::transport::Reply;
use crate::worker::WorkerId;

/// Scheduling class for a request. Higher classes are handed to workers
/// first; within a class, submission order is preserved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// What a request's completion channel eventually receives.
pub type Outcome = Result<Reply, TransportError>;

/// One unit of work for the pool: an opaque payload bound for a host, plus
/// the caller's completion callback.
///
/// Requests are transient. They make a single pass through a single worker
/// and are consumed when the outcome is delivered; nothing else mutates them
/// in flight.
pub struct Request {
    host: HostPort,
    payload: Vec<u8>,
    priority: Priority,
    callback: Box<dyn FnOnce(Outcome) + Send + 'static>,
    assigned_worker: Option<WorkerId>,
}

impl Request {
    pub fn new(
        host: HostPort,
        payload: Vec<u8>,
        priority: Priority,
        callback: impl FnOnce(Outcome) + Send + 'static,
    ) -> Self {
        Self {
            host,
            payload,
            priority,
            callback: Box::new(callback),
            assigned_worker: None,
        }
    }

    /// Build a request whose outcome is delivered over a channel, for callers
    /// that want to block on completion instead of supplying a callback.
    pub fn with_channel(
        host: HostPort,
        payload: Vec<u8>,
        priority: Priority,
    ) -> (Self, mpsc::Receiver<Outcome>) {
        let (sender, receiver) = mpsc::channel();
        let request = Self::new(host, payload, priority, move |outcome| {
            let _ = sender.send(outcome);
        });
        (request, receiver)
    }

    pub fn host(&self) -> &HostPort {
        &self.host
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The worker this request was handed to directly, skipping the queue.
    /// `None` for requests that went through the shared queue.
    pub fn assigned_worker(&self) -> Option<WorkerId> {
        self.assigned_worker
    }

    pub(crate) fn set_assigned_worker(&mut self, worker: WorkerId) {
        self.assigned_worker = Some(worker);
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Deliver the outcome to the caller. Consumes the request; the callback
    /// runs exactly once, on the calling thread.
    pub(crate) fn complete(self, outcome: Outcome) {
        (self.callback)(outcome);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("host", &self.host)
            .field("priority", &self.priority)
            .field("payload_len", &self.payload.len())
            .field("assigned_worker", &self.assigned_worker)
            .finish()
    }
}
