//! Event bridge nodes.
//!
//! A node owns exactly one [`FrameStream`](framebridge_frame::FrameStream),
//! runs a background reader that turns every inbound frame into a
//! [`FrameBroadcast`] tagged with the node's name, and writes outbound
//! broadcasts back onto its stream. The [`EventRouter`] connects nodes to
//! each other.

pub mod broadcast;
pub mod error;
pub mod node;
pub mod registry;
pub mod router;

pub use broadcast::FrameBroadcast;
pub use error::{NodeError, Result};
pub use node::{EventCallback, EventNode, StreamNode};
pub use registry::NodeRegistry;
pub use router::{EventRouter, EventSink, Publisher, RouterConfig, DEFAULT_JOIN_TIMEOUT};
