use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{NodeError, Result};
use crate::node::EventNode;

/// Name-indexed set of nodes. Names are unique.
#[derive(Default)]
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<String, Arc<dyn EventNode>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `node` under its own name.
    ///
    /// Fails with [`NodeError::DuplicateNode`] if the name is taken; the
    /// registered node is left untouched.
    pub fn insert(&self, node: Arc<dyn EventNode>) -> Result<()> {
        let mut nodes = self.write();
        let name = node.name().to_string();
        if nodes.contains_key(&name) {
            return Err(NodeError::DuplicateNode(name));
        }
        nodes.insert(name, node);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn EventNode>> {
        self.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EventNode>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Point-in-time copy of the registered nodes, sorted by name. Delivery
    /// iterates a snapshot so no lock is held while writing to streams.
    pub fn snapshot(&self) -> Vec<Arc<dyn EventNode>> {
        self.read().values().cloned().collect()
    }

    /// Remove and return every node.
    pub fn drain(&self) -> Vec<Arc<dyn EventNode>> {
        std::mem::take(&mut *self.write()).into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<dyn EventNode>>> {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<dyn EventNode>>> {
        self.nodes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.names())
            .finish()
    }
}
