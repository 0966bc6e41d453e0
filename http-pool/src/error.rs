use std::io;

/// Failures surfaced to a request's completion channel.
///
/// Everything here is recovered locally by the worker that hit it: the broken
/// connection is closed (never recycled) and the worker keeps serving
/// subsequent requests. Pool-internal bookkeeping outcomes (eviction,
/// recycle refusal) are deliberately not represented; callers never see them.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to resolve {host}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to connect to {host}")]
    Connect {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("transport i/o failed")]
    Io(#[from] io::Error),
    #[error("transport timed out")]
    Timeout,
    #[error("connection closed by peer")]
    Closed,
    #[error("request pool is shut down")]
    PoolShutDown,
}
