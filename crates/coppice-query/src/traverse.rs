use crate::error::QueryError;
use crate::index::TreeIndex;
use coppice_model::{ContentNode, File, FileId, NodeId, NodeKind};
use coppice_store::ChannelPartition;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Channel-scoped read-only traversal over one `(TreeIndex, ChannelPartition)`
/// pair. All walks are iterative: explicit stacks and queues bound the depth,
/// and visited sets make the cycle handling explicit per relation. The parent
/// tree must be acyclic (violation is fatal); prerequisite cycles are
/// tolerated and simply not revisited.
pub struct TraversalEngine {
    index: Arc<TreeIndex>,
    partition: Arc<ChannelPartition>,
}

impl TraversalEngine {
    #[must_use]
    pub fn new(index: Arc<TreeIndex>, partition: Arc<ChannelPartition>) -> Self {
        Self { index, partition }
    }

    #[must_use]
    pub fn partition(&self) -> &ChannelPartition {
        &self.partition
    }

    fn require(&self, node: &NodeId) -> Result<(), QueryError> {
        if self.index.contains(node) {
            Ok(())
        } else {
            Err(QueryError::node_not_found(node))
        }
    }

    fn resolve(&self, ids: &[NodeId]) -> Result<Vec<ContentNode>, QueryError> {
        Ok(self.partition.get_nodes(ids)?)
    }

    /// Full ancestor chain restricted to topic-kind nodes, in strict
    /// root-to-immediate-parent order. Empty when the node is the root or has
    /// no topic ancestors.
    pub fn ancestor_topics(&self, node: &NodeId) -> Result<Vec<ContentNode>, QueryError> {
        self.require(node)?;
        let mut visited: HashSet<&NodeId> = HashSet::new();
        visited.insert(node);
        let mut chain: Vec<NodeId> = Vec::new();
        let mut current = node;
        while let Some(parent) = self.index.parent(current) {
            if !visited.insert(parent) {
                return Err(QueryError::cycle_detected(parent));
            }
            if self.index.kind(parent) == Some(NodeKind::Topic) {
                chain.push(parent.clone());
            }
            current = parent;
        }
        chain.reverse();
        self.resolve(&chain)
    }

    /// Children straight from the index, in sibling order. Empty for leaves
    /// and childless topics.
    pub fn immediate_children(&self, node: &NodeId) -> Result<Vec<ContentNode>, QueryError> {
        self.require(node)?;
        self.resolve(self.index.children(node))
    }

    /// All leaf-kind descendants in document order: children visited in
    /// sibling order, depth first. A leaf node yields itself as the sole
    /// result.
    pub fn leaves(&self, node: &NodeId) -> Result<Vec<ContentNode>, QueryError> {
        self.require(node)?;
        let mut leaves = Vec::new();
        self.walk_subtree(node, |id, kind| {
            if kind == NodeKind::Leaf {
                leaves.push(id.clone());
            }
        })?;
        self.resolve(&leaves)
    }

    /// Transitive closure of the prerequisite relation, excluding the start
    /// node even when a cycle reaches back to it. Cycles are tolerated by the
    /// visited set; the result is the finite closure ordered by node id.
    pub fn all_prerequisites(&self, node: &NodeId) -> Result<Vec<ContentNode>, QueryError> {
        self.require(node)?;
        let mut visited: HashSet<&NodeId> = HashSet::new();
        visited.insert(node);
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        queue.push_back(node);
        let mut closure: Vec<NodeId> = Vec::new();
        while let Some(current) = queue.pop_front() {
            for target in self.index.prerequisites(current) {
                if visited.insert(target) {
                    closure.push(target.clone());
                    queue.push_back(target);
                }
            }
        }
        closure.sort();
        self.resolve(&closure)
    }

    /// Single-hop related lookup. Relatedness is not treated as transitive;
    /// closure over it is caller policy, not engine behavior.
    pub fn all_related(&self, node: &NodeId) -> Result<Vec<ContentNode>, QueryError> {
        self.require(node)?;
        let related: Vec<NodeId> = self.index.related(node).iter().cloned().collect();
        self.resolve(&related)
    }

    /// File records under the full subtree (every descendant, the start node
    /// included) whose blob is unavailable, deduplicated by file id, in
    /// document order of the owning nodes.
    pub fn missing_files(&self, node: &NodeId) -> Result<Vec<File>, QueryError> {
        self.require(node)?;
        let mut subtree = Vec::new();
        self.walk_subtree(node, |id, _| subtree.push(id.clone()))?;

        let probe_blobs = self.partition.has_blob_store();
        let mut seen: HashSet<FileId> = HashSet::new();
        let mut missing = Vec::new();
        for owner in &subtree {
            for file in self.partition.files_for(owner)? {
                let absent = !file.available || (probe_blobs && !self.partition.blob_present(&file));
                if absent && seen.insert(file.id.clone()) {
                    missing.push(file);
                }
            }
        }
        Ok(missing)
    }

    /// Document-order depth-first walk over the subtree rooted at `node`,
    /// surfacing `CycleDetected` on any revisit instead of looping.
    fn walk_subtree<F>(&self, node: &NodeId, mut visit: F) -> Result<(), QueryError>
    where
        F: FnMut(&NodeId, NodeKind),
    {
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut stack: Vec<&NodeId> = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                return Err(QueryError::cycle_detected(current));
            }
            let kind = self
                .index
                .kind(current)
                .ok_or_else(|| QueryError::node_not_found(current))?;
            visit(current, kind);
            for child in self.index.children(current).iter().rev() {
                stack.push(child);
            }
        }
        Ok(())
    }
}
