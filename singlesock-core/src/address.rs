//! Transport address parsing.
//!
//! Provides unified addressing for TCP, IPC and in-process transports.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// TCP transport: `tcp://host:port` (`host` may be `*` when binding)
    Tcp { host: String, port: u16 },
    /// IPC transport (Unix domain socket): `ipc:///path/to/socket`
    #[cfg(unix)]
    Ipc(PathBuf),
    /// In-process transport: `inproc://name`
    Inproc(String),
}

impl Address {
    /// Parse an address from a string.
    ///
    /// Supported formats:
    /// - `tcp://127.0.0.1:5555`, `tcp://*:5555`, `tcp://[::1]:5555`
    /// - `ipc:///tmp/socket.sock` (Unix only)
    /// - `inproc://name`
    ///
    /// # Examples
    ///
    /// ```
    /// use singlesock_core::address::Address;
    ///
    /// let address = Address::parse("tcp://*:5555").unwrap();
    /// assert!(address.is_tcp());
    ///
    /// let address = Address::parse("inproc://bank").unwrap();
    /// assert_eq!(address.inproc_name(), Some("bank"));
    /// ```
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        s.parse()
    }

    /// Returns true if this is a TCP address.
    pub fn is_tcp(&self) -> bool {
        matches!(self, Address::Tcp { .. })
    }

    /// Returns true if this is an IPC address.
    #[cfg(unix)]
    pub fn is_ipc(&self) -> bool {
        matches!(self, Address::Ipc(_))
    }

    /// Returns true if this is an inproc address.
    pub fn is_inproc(&self) -> bool {
        matches!(self, Address::Inproc(_))
    }

    /// Name part of an inproc address.
    pub fn inproc_name(&self) -> Option<&str> {
        match self {
            Address::Inproc(name) => Some(name),
            _ => None,
        }
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| AddressError::InvalidTcpAddress(addr.to_string()))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| AddressError::InvalidTcpAddress(addr.to_string()))?;
            if host.is_empty() {
                return Err(AddressError::InvalidTcpAddress(addr.to_string()));
            }
            Ok(Address::Tcp {
                host: host.to_string(),
                port,
            })
        } else if let Some(path) = s.strip_prefix("ipc://") {
            #[cfg(unix)]
            {
                Ok(Address::Ipc(PathBuf::from(path)))
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                Err(AddressError::IpcNotSupported)
            }
        } else if let Some(name) = s.strip_prefix("inproc://") {
            if name.is_empty() {
                Err(AddressError::InvalidInprocName(
                    "inproc name cannot be empty".to_string(),
                ))
            } else {
                Ok(Address::Inproc(name.to_string()))
            }
        } else {
            Err(AddressError::InvalidScheme(s.to_string()))
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            #[cfg(unix)]
            Address::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Address::Inproc(name) => write!(f, "inproc://{}", name),
        }
    }
}

/// Errors that can occur when parsing addresses.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("Invalid scheme in address: {0} (expected tcp://, ipc://, or inproc://)")]
    InvalidScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidTcpAddress(String),

    #[error("Invalid inproc name: {0}")]
    InvalidInprocName(String),

    #[error("IPC transport not supported on this platform")]
    IpcNotSupported,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_ipv4() {
        let address = Address::parse("tcp://127.0.0.1:5555").unwrap();
        assert!(address.is_tcp());
        assert_eq!(address.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn test_parse_tcp_wildcard_and_ipv6() {
        let address = Address::parse("tcp://*:5580").unwrap();
        assert_eq!(
            address,
            Address::Tcp {
                host: "*".to_string(),
                port: 5580
            }
        );
        assert!(Address::parse("tcp://[::1]:5555").unwrap().is_tcp());
    }

    #[cfg(unix)]
    #[test]
    fn test_parse_ipc() {
        let address = Address::parse("ipc:///tmp/test.sock").unwrap();
        assert!(address.is_ipc());
        assert_eq!(address.to_string(), "ipc:///tmp/test.sock");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = Address::parse("http://127.0.0.1:5555");
        assert!(matches!(result, Err(AddressError::InvalidScheme(_))));
    }

    #[test]
    fn test_invalid_tcp_address() {
        assert!(matches!(
            Address::parse("tcp://localhost:port"),
            Err(AddressError::InvalidTcpAddress(_))
        ));
        assert!(matches!(
            Address::parse("tcp://5555"),
            Err(AddressError::InvalidTcpAddress(_))
        ));
    }

    #[test]
    fn test_parse_inproc() {
        let address = Address::parse("inproc://innerChannel").unwrap();
        assert_eq!(address.inproc_name(), Some("innerChannel"));
        assert_eq!(address.to_string(), "inproc://innerChannel");
    }

    #[test]
    fn test_invalid_inproc_empty() {
        let result = Address::parse("inproc://");
        assert!(matches!(result, Err(AddressError::InvalidInprocName(_))));
    }
}
