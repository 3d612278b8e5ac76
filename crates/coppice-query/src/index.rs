use crate::error::{QueryError, QueryErrorCode};
use coppice_model::{ChannelId, NodeId, NodeKind};
use coppice_store::{ChannelPartition, Topology};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

/// Immutable per-channel adjacency: parent/children in sibling order plus the
/// prerequisite and related relations. Built once from a partition topology
/// and reused across requests.
pub struct TreeIndex {
    root: NodeId,
    parent: HashMap<NodeId, NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
    kinds: HashMap<NodeId, NodeKind>,
    prerequisites: HashMap<NodeId, BTreeSet<NodeId>>,
    related: HashMap<NodeId, BTreeSet<NodeId>>,
    empty_children: Vec<NodeId>,
    empty_relation: BTreeSet<NodeId>,
}

impl TreeIndex {
    pub fn build(topology: &Topology) -> Result<Self, QueryError> {
        let mut kinds = HashMap::with_capacity(topology.nodes.len());
        let mut parent = HashMap::new();
        let mut ordered: HashMap<NodeId, Vec<(i64, NodeId)>> = HashMap::new();

        for node in &topology.nodes {
            kinds.insert(node.id.clone(), node.kind);
            if let Some(parent_id) = &node.parent_id {
                parent.insert(node.id.clone(), parent_id.clone());
                ordered
                    .entry(parent_id.clone())
                    .or_default()
                    .push((node.sort_order, node.id.clone()));
            }
        }
        if !kinds.contains_key(&topology.root_id) {
            return Err(QueryError::new(
                QueryErrorCode::Corrupt,
                format!("root node {} missing from partition", topology.root_id),
            ));
        }

        let mut children = HashMap::with_capacity(ordered.len());
        for (parent_id, mut siblings) in ordered {
            siblings.sort();
            children.insert(
                parent_id,
                siblings.into_iter().map(|(_, id)| id).collect(),
            );
        }

        let mut prerequisites: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for (src, dst) in &topology.prerequisites {
            prerequisites
                .entry(src.clone())
                .or_default()
                .insert(dst.clone());
        }
        let mut related: HashMap<NodeId, BTreeSet<NodeId>> = HashMap::new();
        for (src, dst) in &topology.related {
            related.entry(src.clone()).or_default().insert(dst.clone());
        }

        Ok(Self {
            root: topology.root_id.clone(),
            parent,
            children,
            kinds,
            prerequisites,
            related,
            empty_children: Vec::new(),
            empty_relation: BTreeSet::new(),
        })
    }

    #[must_use]
    pub const fn root(&self) -> &NodeId {
        &self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.kinds.contains_key(node)
    }

    #[must_use]
    pub fn kind(&self, node: &NodeId) -> Option<NodeKind> {
        self.kinds.get(node).copied()
    }

    #[must_use]
    pub fn parent(&self, node: &NodeId) -> Option<&NodeId> {
        self.parent.get(node)
    }

    /// Children in sibling order (sort_order, then id).
    #[must_use]
    pub fn children(&self, node: &NodeId) -> &[NodeId] {
        self.children.get(node).unwrap_or(&self.empty_children)
    }

    #[must_use]
    pub fn prerequisites(&self, node: &NodeId) -> &BTreeSet<NodeId> {
        self.prerequisites.get(node).unwrap_or(&self.empty_relation)
    }

    #[must_use]
    pub fn related(&self, node: &NodeId) -> &BTreeSet<NodeId> {
        self.related.get(node).unwrap_or(&self.empty_relation)
    }
}

/// Per-channel cache of built indexes. First access per channel builds the
/// index; concurrent first access is coalesced through a per-channel build
/// lock so one build is elected. The underlying topology is immutable, so a
/// rebuild after eviction is deterministic.
pub struct IndexCache {
    indexes: RwLock<HashMap<ChannelId, Arc<TreeIndex>>>,
    build_locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl IndexCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indexes: RwLock::new(HashMap::new()),
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn index_for(&self, partition: &ChannelPartition) -> Result<Arc<TreeIndex>, QueryError> {
        let channel = partition.channel_id();
        if let Some(found) = self.cached(channel) {
            return Ok(found);
        }

        let build_lock = {
            let mut locks = self
                .build_locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(channel.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = build_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(found) = self.cached(channel) {
            return Ok(found);
        }

        let topology = partition.load_topology()?;
        let index = Arc::new(TreeIndex::build(&topology)?);
        info!(channel = %channel, nodes = index.len(), "built channel tree index");
        self.indexes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(channel.clone(), Arc::clone(&index));
        Ok(index)
    }

    fn cached(&self, channel: &ChannelId) -> Option<Arc<TreeIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    /// Drops the cached index; paired with partition eviction on re-import.
    pub fn invalidate(&self, channel: &ChannelId) -> bool {
        self.indexes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(channel)
            .is_some()
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new()
    }
}
