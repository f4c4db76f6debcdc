/// Errors produced by frame streams and the codec.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header did not start with the magic number.
    #[error("invalid frame magic (expected 0x4642 \"FB\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote end closed the connection.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The stream was closed locally; no further reads or writes happen.
    #[error("stream closed")]
    Closed,
}

impl FrameError {
    /// Whether this error means the stream can never produce data again.
    pub fn is_terminal(&self) -> bool {
        match self {
            FrameError::ConnectionClosed | FrameError::Closed => true,
            FrameError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            FrameError::InvalidMagic | FrameError::PayloadTooLarge { .. } => false,
        }
    }

    /// Whether this error is a read or write timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err)
                if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
        )
    }
}

impl From<framebridge_transport::TransportError> for FrameError {
    fn from(err: framebridge_transport::TransportError) -> Self {
        use framebridge_transport::TransportError;
        match err {
            TransportError::Io(io) | TransportError::Accept(io) => FrameError::Io(io),
            TransportError::Bind { source, .. } | TransportError::Connect { source, .. } => {
                FrameError::Io(source)
            }
            other => FrameError::Io(std::io::Error::other(other.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
