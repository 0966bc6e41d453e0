//! Bounded worker-thread pool with host-keyed HTTP connection reuse.
//!
//! A fixed number of worker threads pull prioritized requests from a shared
//! [`feeder::RequestFeeder`], map each request to a persistent
//! [`connection::Connection`] keyed by host, and hand the connection back to
//! the [`manager::ConnectionManager`] for reuse — or tear it down when the
//! exchange says the channel cannot persist.
//!
//! The caller-facing surface is small: build a [`Dispatcher`], `submit`
//! requests (fire-and-forget, outcomes arrive on a per-request completion
//! channel), and `shutdown` when done. Submitting never blocks on request
//! processing; a submitted request is either handed straight to an idle
//! worker or queued highest-priority-first, FIFO within a priority class.
//!
//! Locking strategy
//! ----------------
//! * **Feeder lock** — pending heap, direct-assignment slots and the
//!   idle-worker registry, with a condvar for the blocking hand-off.
//! * **Manager lock** — the idle-connection pool (lookup, insert, evict).
//! * **Per-connection lock** — the owning-worker back-reference, for
//!   introspection only.
//!
//! No code path holds more than one of these at a time, so acquisition is
//! never nested across them.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod feeder;
pub mod host;
pub mod manager;
pub mod request;
pub mod transport;
pub mod worker;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::TransportError;
pub use host::HostPort;
pub use request::{Outcome, Priority, Request};
pub use transport::{Connector, Reply, TcpConnector, TcpTransport, Transport};
pub use worker::{WorkerHandle, WorkerId};
