use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::model::{AccessControlList, NodeId};

use super::{AclReader, EngineError, HierarchyReader, LockSession, NodeLocker};

#[derive(Default)]
struct TreeState {
    parents: HashMap<NodeId, Option<NodeId>>,
    acls: HashMap<NodeId, AccessControlList>,
}

/// In-memory hierarchy that records every `lock_nodes` batch.
#[derive(Clone, Default)]
pub(crate) struct TestStore {
    tree: Arc<Mutex<TreeState>>,
    lock_calls: Arc<Mutex<Vec<Vec<NodeId>>>>,
    block_locks: bool,
}

pub(crate) fn n(id: u64) -> NodeId {
    NodeId::new(id)
}

impl TestStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A store whose lock batches never complete.
    pub(crate) fn with_blocked_locks(mut self) -> Self {
        self.block_locks = true;
        self
    }

    pub(crate) fn add_node(&self, id: u64, parent: Option<u64>) -> &Self {
        self.tree
            .lock()
            .unwrap()
            .parents
            .insert(n(id), parent.map(n));
        self
    }

    pub(crate) fn add_acl(&self, acl: AccessControlList) -> &Self {
        self.tree
            .lock()
            .unwrap()
            .acls
            .insert(acl.resource_id, acl);
        self
    }

    pub(crate) fn add_empty_acl(&self, id: u64) -> &Self {
        self.add_acl(AccessControlList::new(n(id)))
    }

    pub(crate) fn remove_acl(&self, id: u64) {
        self.tree.lock().unwrap().acls.remove(&n(id));
    }

    pub(crate) fn set_parent(&self, id: u64, parent: u64) {
        self.tree
            .lock()
            .unwrap()
            .parents
            .insert(n(id), Some(n(parent)));
    }

    pub(crate) fn lock_calls(&self) -> Vec<Vec<NodeId>> {
        self.lock_calls.lock().unwrap().clone()
    }
}

impl HierarchyReader for TestStore {
    async fn get_parent(&self, node: NodeId) -> Result<Option<NodeId>, EngineError> {
        self.tree
            .lock()
            .unwrap()
            .parents
            .get(&node)
            .copied()
            .ok_or(EngineError::NodeNotFound(node))
    }

    async fn get_children(&self, node: NodeId) -> Result<Vec<NodeId>, EngineError> {
        let tree = self.tree.lock().unwrap();
        let mut children: Vec<NodeId> = tree
            .parents
            .iter()
            .filter(|(_, parent)| **parent == Some(node))
            .map(|(child, _)| *child)
            .collect();
        children.sort();
        Ok(children)
    }
}

impl AclReader for TestStore {
    async fn get_acl(&self, node: NodeId) -> Result<Option<AccessControlList>, EngineError> {
        Ok(self.tree.lock().unwrap().acls.get(&node).cloned())
    }
}

pub(crate) struct TestSession {
    lock_calls: Arc<Mutex<Vec<Vec<NodeId>>>>,
    block_locks: bool,
}

impl LockSession for TestSession {
    async fn lock_nodes(&mut self, ids: &[NodeId]) -> Result<(), EngineError> {
        self.lock_calls.lock().unwrap().push(ids.to_vec());
        if self.block_locks {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl NodeLocker for TestStore {
    type Session = TestSession;

    fn begin(&self) -> TestSession {
        TestSession {
            lock_calls: Arc::clone(&self.lock_calls),
            block_locks: self.block_locks,
        }
    }
}
