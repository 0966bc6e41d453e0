//! The seam between the pool and the externally-owned wire client.
//!
//! The pool is a scheduling layer; it models no HTTP semantics of its own.
//! A [`Transport`] carries opaque bytes to one host and reports, per
//! exchange, whether the channel may serve another request — that keep-alive
//! signal is an input to the pool, not something it derives.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::Config;
use crate::error::TransportError;
use crate::host::HostPort;

/// Bytes handed back by the wire client for one exchange, plus whether the
/// channel may be reused for a further request to the same host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub body: Vec<u8>,
    pub keep_alive: bool,
}

/// One socket-like channel to a single host.
pub trait Transport: Send {
    fn open(&mut self, host: &HostPort) -> Result<(), TransportError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
    fn read(&mut self) -> Result<Reply, TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Constructs fresh, unopened transports. The connection manager calls this
/// on every pool miss.
pub trait Connector: Send + Sync {
    fn new_transport(&self) -> Box<dyn Transport>;
}

/// Plain blocking TCP transport with connect and i/o timeouts.
pub struct TcpTransport {
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
            stream: None,
        }
    }
}

fn map_io(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}

impl Transport for TcpTransport {
    fn open(&mut self, host: &HostPort) -> Result<(), TransportError> {
        let addrs = (host.host.as_str(), host.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Dns {
                host: host.to_string(),
                source,
            })?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout))?;
                    stream.set_write_timeout(Some(self.io_timeout))?;
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(TransportError::Connect {
            host: host.to_string(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
            }),
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        stream.write_all(bytes).map_err(map_io)
    }

    fn read(&mut self) -> Result<Reply, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; 64 * 1024];
        let n = stream.read(&mut buf).map_err(map_io)?;
        if n == 0 {
            return Err(TransportError::Closed);
        }
        buf.truncate(n);
        Ok(Reply {
            body: buf,
            keep_alive: true,
        })
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            // NotConnected here just means the peer already went away.
            let _ = stream.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}

/// Default [`Connector`] producing [`TcpTransport`]s with the configured
/// timeouts.
pub struct TcpConnector {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
        }
    }
}

impl Connector for TcpConnector {
    fn new_transport(&self) -> Box<dyn Transport> {
        Box::new(TcpTransport::new(self.connect_timeout, self.io_timeout))
    }
}
