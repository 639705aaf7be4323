use std::sync::Arc;

use crate::model::NodeId;

use super::{
    AclReader, BenefactorCache, EngineConfig, EngineError, HierarchyReader, LockSession,
    NodeLocker,
};

/// Computes the benefactor of a node and keeps the shared cache consistent
/// while the hierarchy is restructured.
///
/// Reads go through the cache without locking. Every mutation takes two
/// lock batches, always in the same order:
///
/// 1. the mutated node and its (new) parent,
/// 2. the benefactors before and after the change.
///
/// Both batches are sorted before the call so that two concurrent movers
/// never request the same pair of keys in opposite orders.
pub struct BenefactorResolver<S> {
    store: Arc<S>,
    cache: Arc<BenefactorCache>,
    config: EngineConfig,
}

impl<S> BenefactorResolver<S>
where
    S: HierarchyReader + AclReader + NodeLocker,
{
    pub fn new(store: Arc<S>, cache: Arc<BenefactorCache>, config: EngineConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<BenefactorCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Cached lookup. On a miss the parent chain is walked until a node with
    /// an ACL (or a root) is found, and every visited node is memoized.
    pub async fn resolve(&self, node: NodeId) -> Result<NodeId, EngineError> {
        if let Some(benefactor) = self.cache.get(node) {
            return Ok(benefactor);
        }

        let mut visited = Vec::new();
        let mut current = node;
        let benefactor = loop {
            if visited.len() > self.config.max_depth {
                return Err(EngineError::MaxDepthExceeded {
                    node,
                    depth: self.config.max_depth,
                });
            }
            if current != node
                && let Some(cached) = self.cache.get(current)
            {
                break cached;
            }

            let parent = self.store.get_parent(current).await?;
            visited.push(current);
            if self.store.has_acl(current).await? {
                break current;
            }
            match parent {
                Some(parent) => current = parent,
                None => break current,
            }
        };

        tracing::debug!(
            node = %node,
            benefactor = %benefactor,
            visited = visited.len(),
            "benefactor cache miss resolved"
        );
        for visited_node in visited {
            self.cache.set_if_absent(visited_node, benefactor);
        }
        Ok(benefactor)
    }

    /// Walks the store without consulting or populating the cache. Only
    /// meaningful while the locks covering the walked chain are held.
    pub async fn resolve_uncached(&self, node: NodeId) -> Result<NodeId, EngineError> {
        let mut current = node;
        for _ in 0..=self.config.max_depth {
            let parent = self.store.get_parent(current).await?;
            if self.store.has_acl(current).await? {
                return Ok(current);
            }
            match parent {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(EngineError::MaxDepthExceeded {
            node,
            depth: self.config.max_depth,
        })
    }

    /// Restores cache consistency after `node` was reparented under
    /// `new_parent`. The new edge must already be recorded in the store.
    ///
    /// `old_benefactor` is the benefactor `resolve` returned before the edge
    /// was rewritten. It only selects which lock to take and may be stale,
    /// but it cannot be derived here: the store already holds the new edge.
    pub async fn on_parent_changed(
        &self,
        node: NodeId,
        old_benefactor: NodeId,
        new_parent: NodeId,
    ) -> Result<NodeId, EngineError> {
        // Unknown nodes fail before any lock is taken.
        self.store.get_parent(node).await?;
        let new_parent_benefactor = self.resolve(new_parent).await?;

        let mut session = self.store.begin();
        self.lock_batch(&mut session, &[node, new_parent]).await?;
        self.lock_batch(&mut session, &[old_benefactor, new_parent_benefactor])
            .await?;

        if self.store.has_acl(node).await? {
            // Own ACL: the move changes nothing below this node.
            self.cache.set(node, node);
            return Ok(node);
        }

        let new_benefactor = self.resolve_uncached(new_parent).await?;
        let updated = self.propagate(node, new_benefactor).await?;

        tracing::debug!(
            node = %node,
            new_parent = %new_parent,
            old_benefactor = %old_benefactor,
            new_benefactor = %new_benefactor,
            updated,
            "benefactors updated after parent change"
        );
        Ok(new_benefactor)
    }

    /// Assigns the benefactor of a freshly created, childless node.
    pub async fn on_node_created(&self, node: NodeId) -> Result<NodeId, EngineError> {
        let parent = self.store.get_parent(node).await?;
        let has_acl = self.store.has_acl(node).await?;
        let Some(parent) = parent.filter(|_| !has_acl) else {
            self.cache.set(node, node);
            return Ok(node);
        };

        let parent_benefactor = self.resolve(parent).await?;

        let mut session = self.store.begin();
        self.lock_batch(&mut session, &[node, parent]).await?;
        self.lock_batch(&mut session, &[parent_benefactor]).await?;

        let benefactor = self.resolve_uncached(parent).await?;
        self.cache.set(node, benefactor);
        Ok(benefactor)
    }

    /// Restores cache consistency after an ACL was created on, or deleted
    /// from, `node`.
    pub async fn on_acl_changed(&self, node: NodeId) -> Result<NodeId, EngineError> {
        let old_benefactor = self.resolve(node).await?;
        let parent = self.store.get_parent(node).await?;
        let new_benefactor_hint = if self.store.has_acl(node).await? {
            node
        } else {
            match parent {
                Some(parent) => self.resolve(parent).await?,
                None => node,
            }
        };

        let mut first_batch = vec![node];
        first_batch.extend(parent);

        let mut session = self.store.begin();
        self.lock_batch(&mut session, &first_batch).await?;
        self.lock_batch(&mut session, &[old_benefactor, new_benefactor_hint])
            .await?;

        let new_benefactor = if self.store.has_acl(node).await? {
            node
        } else {
            match self.store.get_parent(node).await? {
                Some(parent) => self.resolve_uncached(parent).await?,
                None => node,
            }
        };
        let updated = self.propagate(node, new_benefactor).await?;

        tracing::debug!(
            node = %node,
            old_benefactor = %old_benefactor,
            new_benefactor = %new_benefactor,
            updated,
            "benefactors updated after acl change"
        );
        Ok(new_benefactor)
    }

    async fn lock_batch(
        &self,
        session: &mut S::Session,
        ids: &[NodeId],
    ) -> Result<(), EngineError> {
        let mut keys = ids.to_vec();
        keys.sort();
        keys.dedup();

        let acquired =
            tokio::time::timeout(self.config.lock_timeout, session.lock_nodes(&keys)).await;
        match acquired {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    keys = ?keys,
                    timeout_ms = self.config.lock_timeout.as_millis() as u64,
                    "timed out acquiring node locks"
                );
                Err(EngineError::LockTimeout {
                    keys,
                    timeout: self.config.lock_timeout,
                })
            }
        }
    }

    /// Writes `benefactor` for `root` and every descendant that inherits
    /// through it. Subtrees below a node with its own ACL are skipped.
    async fn propagate(&self, root: NodeId, benefactor: NodeId) -> Result<usize, EngineError> {
        let mut pending = vec![(root, 0usize)];
        let mut updated = 0;

        while let Some((current, depth)) = pending.pop() {
            if depth > self.config.max_depth {
                return Err(EngineError::MaxDepthExceeded {
                    node: current,
                    depth: self.config.max_depth,
                });
            }
            self.cache.set(current, benefactor);
            updated += 1;

            for child in self.store.get_children(current).await? {
                if !self.store.has_acl(child).await? {
                    pending.push((child, depth + 1));
                }
            }
        }

        Ok(updated)
    }
}
