use std::fmt;
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::ByteStream;

/// Textual transport address.
///
/// Accepted forms: `unix:<path>`, `tcp:<host:port>`, or a bare filesystem
/// path (treated as `unix:`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let endpoint = if let Some(path) = s.strip_prefix("unix:") {
            Endpoint::Unix(PathBuf::from(path))
        } else if let Some(addr) = s.strip_prefix("tcp:") {
            if !addr.contains(':') {
                return Err(TransportError::InvalidEndpoint(s.to_string()));
            }
            Endpoint::Tcp(addr.to_string())
        } else if s.contains('/') {
            Endpoint::Unix(PathBuf::from(s))
        } else {
            return Err(TransportError::InvalidEndpoint(s.to_string()));
        };

        match &endpoint {
            Endpoint::Unix(path) if path.as_os_str().is_empty() => {
                Err(TransportError::InvalidEndpoint(s.to_string()))
            }
            _ => Ok(endpoint),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

impl Endpoint {
    /// Connect to the endpoint (blocking).
    pub fn connect(&self) -> Result<ByteStream> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => crate::uds::UnixDomainSocket::connect(path),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(self.to_string())),
            Endpoint::Tcp(addr) => {
                let stream =
                    TcpStream::connect(addr.as_str()).map_err(|source| TransportError::Connect {
                        endpoint: self.to_string(),
                        source,
                    })?;
                stream.set_nodelay(true)?;
                debug!(%addr, "connected to tcp endpoint");
                Ok(stream.into())
            }
        }
    }

    /// Bind the endpoint for accepting connections.
    pub fn bind(&self) -> Result<Acceptor> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Acceptor::Unix(crate::uds::UnixDomainSocket::bind(path)?)),
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(TransportError::Unsupported(self.to_string())),
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr.as_str()).map_err(|source| TransportError::Bind {
                        endpoint: self.to_string(),
                        source,
                    })?;
                info!(%addr, "listening on tcp endpoint");
                Ok(Acceptor::Tcp(listener))
            }
        }
    }
}

/// A bound endpoint waiting for connections.
pub enum Acceptor {
    #[cfg(unix)]
    Unix(crate::uds::UnixDomainSocket),
    Tcp(TcpListener),
}

impl Acceptor {
    /// Accept one connection (blocking).
    pub fn accept(&self) -> Result<ByteStream> {
        match self {
            #[cfg(unix)]
            Acceptor::Unix(socket) => socket.accept(),
            Acceptor::Tcp(listener) => {
                let (stream, peer) = listener.accept().map_err(TransportError::Accept)?;
                stream.set_nodelay(true)?;
                debug!(%peer, "accepted tcp connection");
                Ok(stream.into())
            }
        }
    }

    /// Accept one connection, giving up once `keep_waiting` returns false.
    ///
    /// The listener is polled every `poll` while idle and left blocking
    /// again on return. Returns `None` when the wait was abandoned. The
    /// accepted stream is always in blocking mode.
    pub fn accept_while(
        &self,
        keep_waiting: impl Fn() -> bool,
        poll: Duration,
    ) -> Result<Option<ByteStream>> {
        self.set_nonblocking(true)?;
        let accepted = loop {
            if !keep_waiting() {
                break Ok(None);
            }
            match self.accept() {
                Ok(stream) => break Ok(Some(stream)),
                Err(TransportError::Accept(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) =>
                {
                    thread::sleep(poll);
                }
                Err(err) => break Err(err),
            }
        };
        self.set_nonblocking(false)?;

        let stream = accepted?;
        if let Some(stream) = &stream {
            stream.set_nonblocking(false)?;
        }
        Ok(stream)
    }

    /// Switch the listener in or out of non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self {
            #[cfg(unix)]
            Acceptor::Unix(socket) => socket.set_nonblocking(nonblocking),
            Acceptor::Tcp(listener) => listener.set_nonblocking(nonblocking).map_err(Into::into),
        }
    }

    /// The endpoint actually bound; resolves an ephemeral TCP port.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match self {
            #[cfg(unix)]
            Acceptor::Unix(socket) => Ok(Endpoint::Unix(socket.path().to_path_buf())),
            Acceptor::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn parses_endpoint_forms() {
        assert_eq!(
            "unix:/tmp/dev1.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/tmp/dev1.sock"))
        );
        assert_eq!(
            "/run/dev2.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Unix(PathBuf::from("/run/dev2.sock"))
        );
        assert_eq!(
            "tcp:127.0.0.1:7000".parse::<Endpoint>().unwrap(),
            Endpoint::Tcp("127.0.0.1:7000".to_string())
        );
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for bad in ["", "unix:", "tcp:localhost", "serial0"] {
            assert!(
                matches!(
                    bad.parse::<Endpoint>(),
                    Err(TransportError::InvalidEndpoint(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_through_parse() {
        let endpoint = Endpoint::Tcp("localhost:9".to_string());
        assert_eq!(endpoint.to_string(), "tcp:localhost:9");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
    }

    #[test]
    fn tcp_bind_accept_connect() {
        let acceptor = Endpoint::Tcp("127.0.0.1:0".to_string()).bind().unwrap();
        let local = acceptor.local_endpoint().unwrap();
        assert!(matches!(&local, Endpoint::Tcp(addr) if !addr.ends_with(":0")));

        let client = std::thread::spawn(move || {
            let mut stream = local.connect().unwrap();
            stream.write_all(b"hi").unwrap();
        });

        let mut server = acceptor.accept().unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
        client.join().unwrap();
    }

    #[test]
    fn accept_while_gives_up_when_told_to_stop() {
        let acceptor = Endpoint::Tcp("127.0.0.1:0".to_string()).bind().unwrap();
        let polls = std::sync::atomic::AtomicUsize::new(0);

        let accepted = acceptor
            .accept_while(
                || polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 3,
                Duration::from_millis(5),
            )
            .unwrap();
        assert!(accepted.is_none());
        assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[test]
    fn accept_while_returns_a_blocking_stream() {
        let acceptor = Endpoint::Tcp("127.0.0.1:0".to_string()).bind().unwrap();
        let local = acceptor.local_endpoint().unwrap();

        let client = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let mut stream = local.connect().unwrap();
            std::thread::sleep(Duration::from_millis(50));
            stream.write_all(b"late").unwrap();
        });

        let mut server = acceptor
            .accept_while(|| true, Duration::from_millis(5))
            .unwrap()
            .expect("a connection should be accepted");
        // A non-blocking stream would fail here with WouldBlock before the
        // client writes.
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"late");
        client.join().unwrap();
    }
}
