use std::fmt;
use std::str::FromStr;

/// Network endpoint identity (hostname + port) used as the pooling key for
/// connection reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("expected `host:port`, got `{0}`")]
pub struct InvalidHostPort(String);

impl FromStr for HostPort {
    type Err = InvalidHostPort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| InvalidHostPort(s.to_owned()))?;
        if host.is_empty() {
            return Err(InvalidHostPort(s.to_owned()));
        }
        let port = port.parse().map_err(|_| InvalidHostPort(s.to_owned()))?;
        Ok(Self::new(host, port))
    }
}
