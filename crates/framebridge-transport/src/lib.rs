//! Byte-stream transports for framebridge.
//!
//! This is the lowest layer: it hands out connected duplex byte streams
//! ([`ByteStream`]) over Unix domain sockets or TCP, addressed by a textual
//! [`Endpoint`]. Framing lives one layer up in `framebridge-frame`.

pub mod endpoint;
pub mod error;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Acceptor, Endpoint};
pub use error::{Result, TransportError};
pub use stream::ByteStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
