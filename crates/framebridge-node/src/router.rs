use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broadcast::FrameBroadcast;
use crate::error::{NodeError, Result};
use crate::node::EventNode;
use crate::registry::NodeRegistry;

/// Default time `detach` and `shutdown` wait for each reader.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a node's reader hands inbound events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: FrameBroadcast) -> Result<()>;
}

enum Envelope {
    /// To every node except the one named in the event.
    Broadcast(FrameBroadcast),
    /// To the one node named in the event.
    Addressed(FrameBroadcast),
    Stop,
}

/// Cloneable handle for feeding events into an [`EventRouter`].
///
/// Publishing fails with [`NodeError::RouterClosed`] once the router's
/// dispatcher has stopped.
#[derive(Clone)]
pub struct Publisher {
    tx: Sender<Envelope>,
}

impl Publisher {
    /// Queue `event` for delivery to the node named by `event.device_name()`.
    pub fn dispatch_to(&self, event: FrameBroadcast) -> Result<()> {
        self.tx
            .send(Envelope::Addressed(event))
            .map_err(|_| NodeError::RouterClosed)
    }
}

impl EventSink for Publisher {
    fn publish(&self, event: FrameBroadcast) -> Result<()> {
        self.tx
            .send(Envelope::Broadcast(event))
            .map_err(|_| NodeError::RouterClosed)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// How long `detach` and `shutdown` wait for each node's reader, and how
    /// long `shutdown` waits for queued deliveries. `Duration::ZERO` waits
    /// for readers without bound; the delivery wait then falls back to
    /// [`DEFAULT_JOIN_TIMEOUT`].
    pub join_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Handle on the dispatcher thread. `done` disconnects once the dispatch
/// loop has returned, including by panic.
struct Dispatcher {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl Dispatcher {
    /// Wait up to `timeout` for the dispatch loop to return.
    fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    fn finish(self, timeout: Duration) {
        if !self.wait(timeout) {
            warn!("router dispatcher still running after shutdown");
            return;
        }
        if self.handle.join().is_err() {
            warn!("router dispatcher panicked");
        }
    }
}

/// In-process event fabric.
///
/// Attached nodes publish every inbound frame into the router. A single
/// dispatcher thread delivers events in the order they were published, so
/// frames from one node reach each subscriber in stream order. Delivery
/// uses [`EventNode::deliver`]; a failing node never stops the dispatcher.
pub struct EventRouter {
    registry: Arc<NodeRegistry>,
    tx: Mutex<Option<Sender<Envelope>>>,
    dispatcher: Mutex<Option<Dispatcher>>,
    config: RouterConfig,
}

impl EventRouter {
    pub fn new() -> Result<Self> {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Result<Self> {
        let registry = Arc::new(NodeRegistry::new());
        let (tx, rx) = mpsc::channel();
        let (done_tx, done) = mpsc::channel::<()>();

        let handle = {
            let registry = Arc::clone(&registry);
            thread::Builder::new()
                .name("fb-dispatch".to_string())
                .spawn(move || {
                    let _done = done_tx;
                    dispatch_loop(&registry, rx);
                })
                .map_err(|source| NodeError::Spawn {
                    what: "router dispatcher".to_string(),
                    source,
                })?
        };
        let dispatcher = Dispatcher { handle, done };

        Ok(Self {
            registry,
            tx: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            config,
        })
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn publisher(&self) -> Result<Publisher> {
        self.lock_tx()
            .as_ref()
            .map(|tx| Publisher { tx: tx.clone() })
            .ok_or(NodeError::RouterClosed)
    }

    /// Register `node` and start its reader, publishing every frame it reads.
    ///
    /// If the reader cannot be started the node is unregistered again and
    /// the error returned.
    pub fn attach(&self, node: Arc<dyn EventNode>) -> Result<()> {
        // Held until the reader runs so `shutdown` sees either no node or a
        // registered, listening one.
        let tx = self.lock_tx();
        let publisher = tx
            .as_ref()
            .map(|tx| Publisher { tx: tx.clone() })
            .ok_or(NodeError::RouterClosed)?;
        self.registry.insert(Arc::clone(&node))?;

        let name = node.name().to_string();
        let on_event = Box::new(move |event: FrameBroadcast| {
            if let Err(err) = publisher.publish(event) {
                debug!(node = %name, error = %err, "dropping inbound frame");
            }
        });

        if let Err(err) = node.listen(on_event) {
            self.registry.remove(node.name());
            return Err(err);
        }
        drop(tx);
        info!(node = node.name(), "node attached");
        Ok(())
    }

    /// Unregister a node, close it and wait for its reader.
    ///
    /// Returns whether the reader was still running when the wait ended.
    pub fn detach(&self, name: &str) -> Result<bool> {
        let node = self
            .registry
            .remove(name)
            .ok_or_else(|| NodeError::UnknownNode(name.to_string()))?;
        let still_running = node.join(self.config.join_timeout);
        if still_running {
            warn!(node = name, "reader still running after detach");
        } else {
            info!(node = name, "node detached");
        }
        Ok(still_running)
    }

    /// Fan `event` out to every node except its origin.
    pub fn publish(&self, event: FrameBroadcast) -> Result<()> {
        self.send(Envelope::Broadcast(event))
    }

    /// Deliver `event` to the node named by `event.device_name()` only.
    /// Unknown names are logged and dropped by the dispatcher.
    pub fn dispatch_to(&self, event: FrameBroadcast) -> Result<()> {
        self.send(Envelope::Addressed(event))
    }

    /// Stop the router.
    ///
    /// Events queued before the call are delivered if the dispatcher drains
    /// them within the join timeout. Then every node is unregistered and
    /// closed, which fails any delivery still blocked on a stalled peer, and
    /// each reader is joined. Returns the names of nodes whose reader was
    /// still running after the join timeout. Later calls return an empty
    /// list.
    pub fn shutdown(&self) -> Vec<String> {
        let Some(tx) = self.lock_tx().take() else {
            return Vec::new();
        };
        let _ = tx.send(Envelope::Stop);
        drop(tx);

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let wait = self.dispatcher_timeout();
        if let Some(dispatcher) = &dispatcher {
            if !dispatcher.wait(wait) {
                warn!(?wait, "dispatcher still delivering; closing nodes");
            }
        }

        let nodes = self.registry.drain();
        for node in &nodes {
            if let Err(err) = node.close() {
                debug!(node = node.name(), error = %err, "close failed during shutdown");
            }
        }
        if let Some(dispatcher) = dispatcher {
            dispatcher.finish(wait);
        }

        let mut stuck = Vec::new();
        for node in nodes {
            if node.join(self.config.join_timeout) {
                warn!(node = node.name(), "reader still running after shutdown");
                stuck.push(node.name().to_string());
            }
        }
        debug!(stuck = stuck.len(), "router shut down");
        stuck
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_tx().is_none()
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        self.lock_tx()
            .as_ref()
            .ok_or(NodeError::RouterClosed)?
            .send(envelope)
            .map_err(|_| NodeError::RouterClosed)
    }

    /// Bound on each wait for the dispatcher; never unbounded, since a
    /// stalled delivery only ends once its node is closed.
    fn dispatcher_timeout(&self) -> Duration {
        if self.config.join_timeout.is_zero() {
            DEFAULT_JOIN_TIMEOUT
        } else {
            self.config.join_timeout
        }
    }

    fn lock_tx(&self) -> MutexGuard<'_, Option<Sender<Envelope>>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for EventRouter {
    fn publish(&self, event: FrameBroadcast) -> Result<()> {
        EventRouter::publish(self, event)
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn dispatch_loop(registry: &NodeRegistry, rx: Receiver<Envelope>) {
    debug!("dispatcher started");
    for envelope in rx {
        match envelope {
            Envelope::Broadcast(event) => {
                for node in registry.snapshot() {
                    if node.name() != event.device_name() {
                        node.deliver(&event);
                    }
                }
            }
            Envelope::Addressed(event) => match registry.get(event.device_name()) {
                Some(node) => node.deliver(&event),
                None => warn!(node = event.device_name(), "no such node; dropping frame"),
            },
            Envelope::Stop => break,
        }
    }
    debug!("dispatcher stopped");
}
