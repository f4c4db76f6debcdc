//! Frame-oriented event bridge.
//!
//! framebridge reads discrete frames from byte-stream transports, republishes
//! each one as an event tagged with the node it came from, and writes events
//! addressed to a node back onto that node's transport.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams, endpoints and Unix domain sockets
//! - [`frame`]: length-prefixed framing and the `FrameStream` abstraction
//! - [`node`]: background-reader nodes, the node registry and the event router

/// Re-export transport types.
pub mod transport {
    pub use framebridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framebridge_frame::*;
}

/// Re-export node and router types.
pub mod node {
    pub use framebridge_node::*;
}
