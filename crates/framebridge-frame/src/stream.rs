use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use framebridge_transport::ByteStream;
use tracing::debug;

use crate::codec::{Frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::FrameReader;
use crate::writer::FrameWriter;

/// A closable duplex channel of frames.
///
/// `read` and `write` may be called concurrently from different threads;
/// implementations serialize each direction on their own. `close` must not
/// wait for an in-flight `read`; it should make that read return promptly
/// where the medium allows it.
pub trait FrameStream: Send + Sync {
    /// Read the next frame (blocking).
    fn read(&self) -> Result<Frame>;

    /// Write one frame. Fails with [`FrameError::Closed`] after `close`.
    fn write(&self, frame: &Frame) -> Result<()>;

    /// Close the stream. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Whether the stream is closed, locally or because the remote end went away.
    fn is_closed(&self) -> bool;
}

impl<S: FrameStream + ?Sized> FrameStream for Arc<S> {
    fn read(&self) -> Result<Frame> {
        (**self).read()
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        (**self).write(frame)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

impl<S: FrameStream + ?Sized> FrameStream for Box<S> {
    fn read(&self) -> Result<Frame> {
        (**self).read()
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        (**self).write(frame)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// [`FrameStream`] over a connected [`ByteStream`].
///
/// Reads and writes go through independent handles and locks, so a reader
/// blocked on the socket never holds up a writer. `close` shuts the socket
/// down, which wakes the blocked reader with end-of-stream. End-of-stream or
/// a dead connection observed by `read` also marks the stream closed.
pub struct FramedStream {
    reader: Mutex<FrameReader<ByteStream>>,
    writer: Mutex<FrameWriter<ByteStream>>,
    control: ByteStream,
    closed: AtomicBool,
}

impl FramedStream {
    pub fn new(stream: ByteStream) -> Result<Self> {
        Self::with_config(stream, FrameConfig::default())
    }

    /// Split `stream` into read, write, and control handles and apply the
    /// configured timeouts.
    pub fn with_config(stream: ByteStream, config: FrameConfig) -> Result<Self> {
        let read_half = stream.try_clone()?;
        let control = stream.try_clone()?;
        read_half.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;

        Ok(Self {
            reader: Mutex::new(FrameReader::with_config(read_half, config.clone())),
            writer: Mutex::new(FrameWriter::with_config(stream, config)),
            control,
            closed: AtomicBool::new(false),
        })
    }

    /// Transport kind of the wrapped byte stream.
    pub fn kind(&self) -> &'static str {
        self.control.kind()
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(kind = self.kind(), "framed stream reached end of stream");
            let _ = self.control.shutdown(Shutdown::Both);
        }
    }
}

impl FrameStream for FramedStream {
    fn read(&self) -> Result<Frame> {
        if self.is_closed() {
            return Err(FrameError::Closed);
        }

        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        match reader.read_frame() {
            Ok(frame) => Ok(frame),
            Err(_) if self.is_closed() => Err(FrameError::Closed),
            Err(err) => {
                if err.is_terminal() {
                    self.mark_closed();
                }
                Err(err)
            }
        }
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        if self.is_closed() {
            return Err(FrameError::Closed);
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_frame(frame)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        debug!(kind = self.kind(), "closing framed stream");
        match self.control.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(FrameError::Io(err)),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FramedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("kind", &self.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}
