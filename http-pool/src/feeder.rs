//! Blocking, priority-ordered mailbox between the dispatcher and the
//! workers.
//!
//! One `Mutex` + `Condvar` pair guards all feeder state: the pending heap,
//! the per-worker direct-assignment slots, and the idle-worker registry.
//! Nothing here takes any other lock, so lock acquisition is never nested
//! across the feeder, the connection manager, or a connection.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::sync::{Condvar, Mutex};

use crate::request::{Priority, Request};
use crate::worker::WorkerId;

/// Where `submit` placed a request.
#[derive(Debug)]
pub enum Dispatch {
    /// Handed straight to an idle worker, skipping the queue.
    Direct(WorkerId),
    Queued,
    /// The feeder has been stopped; the request is handed back untouched.
    Rejected(Request),
}

struct Pending {
    priority: Priority,
    seq: u64,
    request: Request,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence number (FIFO
        // among equal priority).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    queue: BinaryHeap<Pending>,
    direct: HashMap<WorkerId, Request>,
    idle: BTreeSet<WorkerId>,
    next_seq: u64,
    stopped: bool,
}

/// Thread-safe pending-request set with blocking hand-off.
pub struct RequestFeeder {
    state: Mutex<State>,
    available: Condvar,
}

impl RequestFeeder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: BinaryHeap::new(),
                direct: HashMap::new(),
                idle: BTreeSet::new(),
                next_seq: 0,
                stopped: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Make a request visible to the workers and wake one of them.
    ///
    /// Fast path: while the queue is empty, the request may be handed
    /// straight to a waiting worker. The queue-empty guard keeps the bypass
    /// from overtaking a queued higher-priority request; beyond that the
    /// bypass is best-effort and preserves only the eventual-processing
    /// guarantee.
    pub fn submit(&self, mut request: Request) -> Dispatch {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            return Dispatch::Rejected(request);
        }

        if state.queue.is_empty() {
            let idle_worker = state.idle.iter().next().copied();
            if let Some(worker) = idle_worker {
                state.idle.remove(&worker);
                request.set_assigned_worker(worker);
                state.direct.insert(worker, request);
                // notify_one could wake the wrong waiter; every waiter
                // rechecks its own slot, so wake them all.
                self.available.notify_all();
                return Dispatch::Direct(worker);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(Pending {
            priority: request.priority(),
            seq,
            request,
        });
        self.available.notify_one();
        Dispatch::Queued
    }

    /// Block until a request is available for `worker`, preferring a direct
    /// assignment over the shared queue. Returns `None` once the feeder has
    /// been stopped — the signal for the worker to terminate.
    pub fn take(&self, worker: WorkerId) -> Option<Request> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(request) = state.direct.remove(&worker) {
                state.idle.remove(&worker);
                return Some(request);
            }
            if state.stopped {
                state.idle.remove(&worker);
                return None;
            }
            if let Some(pending) = state.queue.pop() {
                state.idle.remove(&worker);
                return Some(pending.request);
            }
            state.idle.insert(worker);
            state = self.available.wait(state).unwrap();
        }
    }

    /// Stop the feeder: wake every blocked `take` with the stop sentinel and
    /// hand back all requests that never reached a worker.
    pub fn stop(&self) -> Vec<Request> {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        let mut orphaned: Vec<Request> = state.direct.drain().map(|(_, r)| r).collect();
        orphaned.extend(state.queue.drain().map(|p| p.request));
        self.available.notify_all();
        orphaned
    }

    /// Number of workers currently blocked waiting for a request.
    pub fn idle_workers(&self) -> usize {
        self.state.lock().unwrap().idle.len()
    }

    /// Number of requests waiting in the shared queue.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }
}

impl Default for RequestFeeder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::host::HostPort;

    fn request(name: &str, priority: Priority) -> Request {
        Request::new(
            HostPort::new(name, 80),
            Vec::new(),
            priority,
            |_outcome| {},
        )
    }

    fn host_of(request: &Request) -> String {
        request.host().host.clone()
    }

    /// Spin until `worker` is registered idle, i.e. blocked inside `take`.
    fn wait_until_idle(feeder: &RequestFeeder) {
        for _ in 0..200 {
            if feeder.idle_workers() > 0 {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("worker never went idle");
    }

    #[test]
    fn equal_priority_is_fifo() {
        let feeder = RequestFeeder::new();
        for name in ["r1", "r2", "r3"] {
            assert!(matches!(
                feeder.submit(request(name, Priority::Normal)),
                Dispatch::Queued
            ));
        }

        assert_eq!(host_of(&feeder.take(0).unwrap()), "r1");
        assert_eq!(host_of(&feeder.take(0).unwrap()), "r2");
        assert_eq!(host_of(&feeder.take(0).unwrap()), "r3");
    }

    #[test]
    fn higher_priority_wins_over_earlier_submission() {
        let feeder = RequestFeeder::new();
        feeder.submit(request("low", Priority::Low));
        feeder.submit(request("normal", Priority::Normal));
        feeder.submit(request("high", Priority::High));
        feeder.submit(request("normal2", Priority::Normal));

        assert_eq!(host_of(&feeder.take(0).unwrap()), "high");
        assert_eq!(host_of(&feeder.take(0).unwrap()), "normal");
        assert_eq!(host_of(&feeder.take(0).unwrap()), "normal2");
        assert_eq!(host_of(&feeder.take(0).unwrap()), "low");
    }

    #[test]
    fn stop_wakes_blocked_taker_with_sentinel() {
        let feeder = std::sync::Arc::new(RequestFeeder::new());
        let taker = {
            let feeder = feeder.clone();
            thread::spawn(move || feeder.take(0))
        };

        wait_until_idle(&feeder);
        let orphaned = feeder.stop();
        assert!(orphaned.is_empty());
        assert_eq!(taker.join().unwrap().map(|r| host_of(&r)), None);
    }

    #[test]
    fn stop_hands_back_queued_requests() {
        let feeder = RequestFeeder::new();
        feeder.submit(request("a", Priority::Normal));
        feeder.submit(request("b", Priority::High));

        let orphaned = feeder.stop();
        assert_eq!(orphaned.len(), 2);
        assert!(matches!(
            feeder.submit(request("c", Priority::Normal)),
            Dispatch::Rejected(_)
        ));
    }

    #[test]
    fn direct_assignment_targets_idle_worker() {
        let feeder = std::sync::Arc::new(RequestFeeder::new());
        let (sender, receiver) = mpsc::channel();
        let taker = {
            let feeder = feeder.clone();
            thread::spawn(move || {
                let request = feeder.take(7).unwrap();
                sender.send(request.assigned_worker()).unwrap();
            })
        };

        wait_until_idle(&feeder);
        assert!(matches!(
            feeder.submit(request("direct", Priority::Normal)),
            Dispatch::Direct(7)
        ));
        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(1)).unwrap(),
            Some(7)
        );
        taker.join().unwrap();
    }

    #[test]
    fn no_direct_assignment_without_idle_worker() {
        let feeder = RequestFeeder::new();
        assert!(matches!(
            feeder.submit(request("a", Priority::Normal)),
            Dispatch::Queued
        ));
        assert_eq!(feeder.pending(), 1);
    }

    #[test]
    fn take_prefers_direct_slot_over_queue() {
        let feeder = std::sync::Arc::new(RequestFeeder::new());
        let (sender, receiver) = mpsc::channel();
        let taker = {
            let feeder = feeder.clone();
            thread::spawn(move || {
                sender.send(host_of(&feeder.take(5).unwrap())).unwrap();
            })
        };

        wait_until_idle(&feeder);
        // Direct-assigned at Normal, then queued at High. The direct
        // assignment consumed the only idle worker, so the second submit
        // must queue; the worker still picks its own slot over the queued
        // higher-priority request.
        assert!(matches!(
            feeder.submit(request("direct", Priority::Normal)),
            Dispatch::Direct(5)
        ));
        assert!(matches!(
            feeder.submit(request("queued", Priority::High)),
            Dispatch::Queued
        ));

        assert_eq!(
            receiver.recv_timeout(Duration::from_secs(1)).unwrap(),
            "direct"
        );
        taker.join().unwrap();
        assert_eq!(host_of(&feeder.take(9).unwrap()), "queued");
    }
}
