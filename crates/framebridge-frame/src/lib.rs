//! Length-prefixed framing for framebridge.
//!
//! Every frame on the wire is:
//! - a 2-byte magic number ("FB") for stream synchronization
//! - a 4-byte little-endian payload length
//! - the payload
//!
//! The payload is opaque. On top of the codec sits the [`FrameStream`]
//! abstraction consumed by nodes, with a socket-backed implementation
//! ([`FramedStream`]) and an in-memory one ([`LoopbackStream`]).

pub mod codec;
pub mod error;
pub mod loopback;
pub mod reader;
pub mod stream;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use loopback::LoopbackStream;
pub use reader::FrameReader;
pub use stream::{FrameStream, FramedStream};
pub use writer::FrameWriter;
