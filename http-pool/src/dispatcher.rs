//! The composition root of the pool: owns the feeder, the connection
//! manager, and every thread it spawns. There is no global state; callers
//! construct a [`Dispatcher`] and pass it around by reference.

use std::cmp;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::feeder::{Dispatch, RequestFeeder};
use crate::host::HostPort;
use crate::manager::ConnectionManager;
use crate::request::Request;
use crate::transport::{Connector, TcpConnector};
use crate::worker::{self, Lifecycle, WorkerHandle};

/// Cooperative stop signal for the idle-reaper thread.
struct ReaperSignal {
    raised: Mutex<bool>,
    changed: Condvar,
}

impl ReaperSignal {
    fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            changed: Condvar::new(),
        }
    }

    fn raise(&self) {
        *self.raised.lock().unwrap() = true;
        self.changed.notify_all();
    }

    /// Sleep until the signal is raised or `timeout` elapses. Returns
    /// whether it was raised.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let raised = self.raised.lock().unwrap();
        let (raised, _) = self
            .changed
            .wait_timeout_while(raised, timeout, |raised| !*raised)
            .unwrap();
        *raised
    }
}

/// A fixed-size pool of worker threads pulling prioritized requests from a
/// shared feeder onto host-keyed reusable connections.
pub struct Dispatcher {
    feeder: Arc<RequestFeeder>,
    manager: Arc<ConnectionManager>,
    workers: Vec<Arc<WorkerHandle>>,
    lifecycle: Arc<Lifecycle>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    reaper: Mutex<Option<JoinHandle<()>>>,
    reaper_signal: Arc<ReaperSignal>,
}

impl Dispatcher {
    /// Spawn the worker pool and the idle reaper.
    pub fn new(config: Config, connector: Box<dyn Connector>) -> Result<Self> {
        let feeder = Arc::new(RequestFeeder::new());
        let manager = Arc::new(ConnectionManager::new(connector, &config));
        let lifecycle = Arc::new(Lifecycle::new(config.workers));

        let mut workers = Vec::with_capacity(config.workers);
        let mut threads = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let handle = Arc::new(WorkerHandle::new(id));
            workers.push(handle.clone());

            let thread = thread::Builder::new()
                .name(format!("http-pool-worker-{id}"))
                .spawn({
                    let feeder = feeder.clone();
                    let manager = manager.clone();
                    let lifecycle = lifecycle.clone();
                    move || worker::run(id, feeder, manager, handle, lifecycle)
                })
                .with_context(|| format!("Failed to spawn worker thread {id}"));
            match thread {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    // Unblock whatever did spawn before bailing out.
                    feeder.stop();
                    return Err(err);
                }
            }
        }

        let reaper_signal = Arc::new(ReaperSignal::new());
        let reaper = thread::Builder::new()
            .name("http-pool-reaper".to_owned())
            .spawn({
                let manager = manager.clone();
                let signal = reaper_signal.clone();
                let interval = cmp::max(config.idle_timeout() / 2, Duration::from_secs(1));
                move || {
                    while !signal.wait_timeout(interval) {
                        manager.expire_idle();
                    }
                }
            })
            .context("Failed to spawn idle-reaper thread");
        let reaper = match reaper {
            Ok(reaper) => reaper,
            Err(err) => {
                feeder.stop();
                return Err(err);
            }
        };

        info!(
            workers = config.workers,
            max_idle = config.max_idle_connections,
            "Request pool started"
        );

        Ok(Self {
            feeder,
            manager,
            workers,
            lifecycle,
            threads: Mutex::new(threads),
            reaper: Mutex::new(Some(reaper)),
            reaper_signal,
        })
    }

    /// Spawn a pool backed by plain TCP transports.
    pub fn tcp(config: Config) -> Result<Self> {
        let connector = Box::new(TcpConnector::new(&config));
        Self::new(config, connector)
    }

    /// Submit a request for processing. Fire-and-forget: this queues the
    /// request (or hands it straight to an idle worker) and returns
    /// immediately; the outcome arrives on the request's completion channel.
    /// After shutdown has started, the request fails with `PoolShutDown`.
    pub fn submit(&self, request: Request) {
        match self.feeder.submit(request) {
            Dispatch::Direct(worker) => {
                tracing::debug!("Handed request straight to idle worker {}", worker);
            }
            Dispatch::Queued => {}
            Dispatch::Rejected(request) => {
                tracing::debug!("Pool is shut down, failing request to {}", request.host());
                request.complete(Err(TransportError::PoolShutDown));
            }
        }
    }

    /// Graceful shutdown: workers finish their in-flight request, then stop.
    /// Requests still waiting in the feeder are completed with
    /// `PoolShutDown`. Blocks until every worker has stopped or `timeout`
    /// elapses; returns whether the pool fully drained. Idempotent.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        for request in self.feeder.stop() {
            request.complete(Err(TransportError::PoolShutDown));
        }
        self.reaper_signal.raise();

        let drained = self.lifecycle.wait_all_stopped(timeout);
        if drained {
            for thread in self.threads.lock().unwrap().drain(..) {
                let _ = thread.join();
            }
            if let Some(reaper) = self.reaper.lock().unwrap().take() {
                let _ = reaper.join();
            }
            info!("Request pool shut down");
        } else {
            warn!(
                "Shutdown timed out after {:?} with {} worker(s) still busy",
                timeout,
                self.lifecycle.running()
            );
        }
        drained
    }

    /// Hosts currently being served by a worker.
    pub fn active_hosts(&self) -> Vec<HostPort> {
        self.workers
            .iter()
            .filter_map(|worker| worker.current_host())
            .collect()
    }

    /// Number of idle connections currently pooled for reuse.
    pub fn idle_connections(&self) -> usize {
        self.manager.idle_count()
    }

    /// Number of requests waiting in the feeder.
    pub fn pending_requests(&self) -> usize {
        self.feeder.pending()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Signal only; worker threads exit on their own once they observe
        // the stop sentinel.
        for request in self.feeder.stop() {
            request.complete(Err(TransportError::PoolShutDown));
        }
        self.reaper_signal.raise();
    }
}
