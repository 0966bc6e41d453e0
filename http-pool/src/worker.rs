//! The worker loop: pull a request, acquire a connection for its host, drive
//! the exchange, then recycle or tear the connection down.
//!
//! Each worker cycles through three states: waiting on the feeder,
//! resolving a connection for a freshly taken request, and processing. A
//! stop sentinel from the feeder is the only way out of the loop. A panic
//! inside request processing kills just that worker; the pool keeps running
//! with one slot fewer and is not repaired.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::feeder::RequestFeeder;
use crate::host::HostPort;
use crate::manager::ConnectionManager;

pub type WorkerId = usize;

/// Introspection handle for one worker: which host it is currently serving.
pub struct WorkerHandle {
    id: WorkerId,
    current_host: Mutex<Option<HostPort>>,
}

impl WorkerHandle {
    pub(crate) fn new(id: WorkerId) -> Self {
        Self {
            id,
            current_host: Mutex::new(None),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn current_host(&self) -> Option<HostPort> {
        self.current_host.lock().unwrap().clone()
    }

    fn set_current_host(&self, host: Option<HostPort>) {
        *self.current_host.lock().unwrap() = host;
    }
}

/// Counts live workers so `shutdown` knows when the pool has fully drained.
pub(crate) struct Lifecycle {
    running: Mutex<usize>,
    stopped: Condvar,
}

impl Lifecycle {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            running: Mutex::new(workers),
            stopped: Condvar::new(),
        }
    }

    fn worker_stopped(&self) {
        *self.running.lock().unwrap() -= 1;
        self.stopped.notify_all();
    }

    /// Block until every worker has stopped or `timeout` elapses. Returns
    /// whether the pool fully drained.
    pub(crate) fn wait_all_stopped(&self, timeout: Duration) -> bool {
        let running = self.running.lock().unwrap();
        let (_running, result) = self
            .stopped
            .wait_timeout_while(running, timeout, |running| *running > 0)
            .unwrap();
        !result.timed_out()
    }

    pub(crate) fn running(&self) -> usize {
        *self.running.lock().unwrap()
    }
}

/// Marks the worker stopped on every exit path, including a panicking one,
/// so `shutdown` never waits on a worker that is already gone.
struct StopGuard {
    lifecycle: Arc<Lifecycle>,
    handle: Arc<WorkerHandle>,
}

impl Drop for StopGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::warn!(
                "Worker {} died processing a request; the pool continues with fewer workers",
                self.handle.id()
            );
        }
        self.handle.set_current_host(None);
        self.lifecycle.worker_stopped();
    }
}

pub(crate) fn run(
    id: WorkerId,
    feeder: Arc<RequestFeeder>,
    manager: Arc<ConnectionManager>,
    handle: Arc<WorkerHandle>,
    lifecycle: Arc<Lifecycle>,
) {
    let _guard = StopGuard {
        lifecycle,
        handle: handle.clone(),
    };

    while let Some(request) = feeder.take(id) {
        handle.set_current_host(Some(request.host().clone()));

        let mut connection = manager.get_connection(request.host());
        connection.set_worker(Some(id));
        let outcome = connection.process_request(request.payload());
        connection.set_worker(None);

        match outcome {
            Ok(reply) => {
                if connection.can_persist() {
                    if let Some(mut refused) = manager.recycle_connection(connection) {
                        refused.close();
                    }
                } else {
                    connection.close();
                }
                handle.set_current_host(None);
                request.complete(Ok(reply));
            }
            Err(err) => {
                // A broken channel never goes back to the pool.
                tracing::debug!(
                    "Request to {} failed on connection {}: {}",
                    request.host(),
                    connection.id(),
                    err
                );
                connection.close();
                handle.set_current_host(None);
                request.complete(Err(err));
            }
        }
    }

    tracing::debug!("Worker {} stopped", id);
}
