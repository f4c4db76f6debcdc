use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use framebridge_frame::{FrameConfig, FrameError, FrameStream, FramedStream};
use framebridge_transport::ByteStream;
use tracing::{debug, error, trace, warn};

use crate::broadcast::FrameBroadcast;
use crate::error::{NodeError, Result};

/// Callback invoked on the reader thread for every inbound frame.
pub type EventCallback = Box<dyn FnMut(FrameBroadcast) + Send + 'static>;

/// Something that exchanges frames with the event fabric.
///
/// Every method may be called from any thread, concurrently with the
/// node's own reader and with each other.
pub trait EventNode: Send + Sync {
    /// Unique name of the node.
    fn name(&self) -> &str;

    /// Start the background reader. `on_event` runs on the reader thread,
    /// once per frame, in stream order.
    ///
    /// Fails with [`NodeError::AlreadyListening`] while a previous reader is
    /// still alive; nothing is started in that case.
    fn listen(&self, on_event: EventCallback) -> Result<()>;

    /// Write `event.frame()` to the node's stream. The stream's error is
    /// returned unchanged. `event.device_name()` is not inspected.
    fn send(&self, event: &FrameBroadcast) -> framebridge_frame::Result<()>;

    /// Close the stream without waiting for the reader to exit.
    fn close(&self) -> framebridge_frame::Result<()>;

    /// True iff no reader thread is alive, including when none was started.
    fn is_closed(&self) -> bool;

    /// Close, then wait up to `timeout` for the reader to exit
    /// (`Duration::ZERO` waits without bound).
    ///
    /// Returns `true` iff the reader is **still running** afterwards. A node
    /// that never started a reader returns `false` immediately.
    fn join(&self, timeout: Duration) -> bool;

    /// Entry point for the fabric: send, logging instead of returning failure.
    fn deliver(&self, event: &FrameBroadcast) {
        if let Err(err) = self.send(event) {
            warn!(
                node = self.name(),
                origin = event.device_name(),
                error = %err,
                "dropping frame the node could not send"
            );
        }
    }
}

/// Completion flag raised when a reader thread finishes.
#[derive(Default)]
struct ExitSignal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl ExitSignal {
    fn is_set(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self) {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.cond.notify_all();
    }

    /// Wait for the flag; `None` waits forever. Returns whether it is set.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            None => *self
                .cond
                .wait_while(done, |done| !*done)
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (done, _) = self
                    .cond
                    .wait_timeout_while(done, timeout, |done| !*done)
                    .unwrap_or_else(PoisonError::into_inner);
                *done
            }
        }
    }
}

/// Raises the exit signal when the reader thread unwinds or returns.
struct ExitGuard(Arc<ExitSignal>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.set();
    }
}

struct Reader {
    handle: Option<JoinHandle<()>>,
    exit: Arc<ExitSignal>,
}

impl Reader {
    fn is_alive(&self) -> bool {
        !self.exit.is_set()
    }

    fn is_current_thread(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Join a reader whose exit signal is already set.
    fn reap(&mut self, node: &str) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(node, "reader thread panicked");
            }
        }
    }
}

/// [`EventNode`] over any [`FrameStream`].
///
/// The transport kind is whatever stream the node is constructed with:
/// [`FramedStream`] for sockets, `LoopbackStream` in-process, or a test
/// double. Dropping the node closes its stream so a detached reader cannot
/// outlive it for long.
pub struct StreamNode<S: FrameStream + 'static> {
    name: String,
    stream: Arc<S>,
    reader: Mutex<Option<Reader>>,
}

impl<S: FrameStream + 'static> StreamNode<S> {
    pub fn new(name: impl Into<String>, stream: S) -> Self {
        Self {
            name: name.into(),
            stream: Arc::new(stream),
            reader: Mutex::new(None),
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    fn lock_reader(&self) -> MutexGuard<'_, Option<Reader>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamNode<FramedStream> {
    /// Build a node that frames a connected socket with `config`.
    pub fn from_byte_stream(
        name: impl Into<String>,
        stream: ByteStream,
        config: FrameConfig,
    ) -> Result<Self> {
        Ok(Self::new(name, FramedStream::with_config(stream, config)?))
    }
}

impl<S: FrameStream + 'static> EventNode for StreamNode<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn listen(&self, mut on_event: EventCallback) -> Result<()> {
        // Held across spawn: two racing calls cannot both start a reader.
        let mut slot = self.lock_reader();
        if slot.as_ref().is_some_and(Reader::is_alive) {
            return Err(NodeError::AlreadyListening(self.name.clone()));
        }
        if let Some(mut finished) = slot.take() {
            finished.reap(&self.name);
        }

        let exit = Arc::new(ExitSignal::default());
        let guard = ExitGuard(Arc::clone(&exit));
        let stream = Arc::clone(&self.stream);
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("fb-reader:{}", self.name.replace('\0', "")))
            .spawn(move || {
                let _guard = guard;
                read_loop(&name, &*stream, &mut on_event);
            })
            .map_err(|source| NodeError::Spawn {
                what: format!("reader for node '{}'", self.name),
                source,
            })?;

        *slot = Some(Reader {
            handle: Some(handle),
            exit,
        });
        debug!(node = %self.name, "reader started");
        Ok(())
    }

    fn send(&self, event: &FrameBroadcast) -> framebridge_frame::Result<()> {
        self.stream.write(event.frame())
    }

    fn close(&self) -> framebridge_frame::Result<()> {
        debug!(node = %self.name, "closing node stream");
        self.stream.close()
    }

    fn is_closed(&self) -> bool {
        !self.lock_reader().as_ref().is_some_and(Reader::is_alive)
    }

    fn join(&self, timeout: Duration) -> bool {
        if let Err(err) = self.close() {
            warn!(node = %self.name, error = %err, "close failed during join");
        }

        let exit = {
            let slot = self.lock_reader();
            match slot.as_ref() {
                None => return false,
                Some(reader) if reader.is_current_thread() => {
                    warn!(node = %self.name, "join called from the node's own reader");
                    return reader.is_alive();
                }
                Some(reader) => Arc::clone(&reader.exit),
            }
        };

        let wait_for = (!timeout.is_zero()).then_some(timeout);
        if !exit.wait(wait_for) {
            debug!(node = %self.name, ?timeout, "reader still running after join timeout");
            return true;
        }

        let mut slot = self.lock_reader();
        if let Some(reader) = slot.as_mut().filter(|r| Arc::ptr_eq(&r.exit, &exit)) {
            reader.reap(&self.name);
        }
        false
    }
}

impl<S: FrameStream + 'static> Drop for StreamNode<S> {
    fn drop(&mut self) {
        if let Err(err) = self.stream.close() {
            debug!(node = %self.name, error = %err, "close on drop failed");
        }
    }
}

fn read_loop<S>(name: &str, stream: &S, on_event: &mut (dyn FnMut(FrameBroadcast) + Send))
where
    S: FrameStream + ?Sized,
{
    debug!(node = name, "read loop started");
    while !stream.is_closed() {
        match stream.read() {
            Ok(frame) => on_event(FrameBroadcast::new(name, frame)),
            Err(err) if err.is_timeout() => trace!(node = name, "read timed out"),
            Err(FrameError::Closed) => {}
            Err(err) if err.is_terminal() => {
                debug!(node = name, error = %err, "stream ended");
            }
            Err(err) => warn!(node = name, error = %err, "frame read failed"),
        }
    }
    debug!(node = name, "read loop exited");
}
