use framebridge_frame::FrameError;

/// Errors raised by nodes, the registry and the router.
///
/// Stream errors are carried through unchanged in [`NodeError::Frame`].
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A reader is still alive for this node.
    #[error("node '{0}' is already listening")]
    AlreadyListening(String),

    /// The OS refused to start a thread.
    #[error("failed to spawn {what} thread: {source}")]
    Spawn {
        what: String,
        source: std::io::Error,
    },

    /// A node with this name is already registered.
    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    /// No node with this name is registered.
    #[error("no node named '{0}'")]
    UnknownNode(String),

    /// The router has been shut down.
    #[error("event router is shut down")]
    RouterClosed,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, NodeError>;
