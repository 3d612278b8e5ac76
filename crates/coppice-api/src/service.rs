use crate::convert::{channel_dto, file_dto, node_dto};
use crate::dto::{ChannelDto, FileDto, NodeDto};
use crate::error::ApiError;
use crate::params::{NodeListParams, SkipField};
use coppice_model::{ChannelId, FileId, NodeId};
use coppice_query::{IndexCache, TraversalEngine};
use coppice_store::{ChannelPartition, PartitionRegistry};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// The catalog facade. Owns the partition registry and the per-channel
/// index cache; every read operation of the catalog goes through here.
///
/// Identifiers arrive as raw strings from the outer surface and are
/// validated before any partition is touched.
pub struct CatalogService {
    registry: PartitionRegistry,
    indexes: IndexCache,
}

impl CatalogService {
    #[must_use]
    pub fn new(data_root: PathBuf) -> Self {
        Self {
            registry: PartitionRegistry::new(data_root),
            indexes: IndexCache::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &PartitionRegistry {
        &self.registry
    }

    /// Drops the cached handle and index for a channel, forcing a reopen on
    /// next access. Used after a partition is replaced on disk.
    pub fn invalidate(&self, channel: &ChannelId) {
        self.indexes.invalidate(channel);
        self.registry.evict(channel);
        info!(channel = %channel, "catalog caches invalidated");
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelDto>, ApiError> {
        let mut channels = Vec::new();
        for channel_id in self.registry.list_channels()? {
            let partition = self.registry.partition(&channel_id)?;
            channels.push(channel_dto(&partition.channel()?));
        }
        Ok(channels)
    }

    pub fn get_channel(&self, channel: &str) -> Result<ChannelDto, ApiError> {
        let partition = self.partition(channel)?;
        Ok(channel_dto(&partition.channel()?))
    }

    pub fn get_node(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<NodeDto, ApiError> {
        let node_id = parse_node(node)?;
        let partition = self.partition(channel)?;
        let record = partition.get_node(&node_id)?;
        node_dto(&partition, &record, skip)
    }

    pub fn list_nodes(
        &self,
        channel: &str,
        params: &NodeListParams,
    ) -> Result<Vec<NodeDto>, ApiError> {
        let partition = self.partition(channel)?;
        let nodes = partition.list_nodes(&params.filter)?;
        nodes
            .iter()
            .map(|n| node_dto(&partition, n, &params.skip))
            .collect()
    }

    pub fn get_file(&self, channel: &str, file: &str) -> Result<FileDto, ApiError> {
        let file_id = FileId::parse(file)
            .map_err(|e| ApiError::invalid_identifier("file_id", file, &e.0))?;
        let partition = self.partition(channel)?;
        Ok(file_dto(&partition.get_file(&file_id)?))
    }

    pub fn list_files(&self, channel: &str, node: &str) -> Result<Vec<FileDto>, ApiError> {
        let node_id = parse_node(node)?;
        let partition = self.partition(channel)?;
        let files = partition.list_files(&node_id)?;
        Ok(files.iter().map(file_dto).collect())
    }

    /// Topic ancestors of a node, root first.
    pub fn ancestor_topics(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<Vec<NodeDto>, ApiError> {
        self.traverse(channel, node, skip, TraversalEngine::ancestor_topics)
    }

    /// Direct children of a node in sibling order.
    pub fn immediate_children(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<Vec<NodeDto>, ApiError> {
        self.traverse(channel, node, skip, TraversalEngine::immediate_children)
    }

    /// Every leaf in the subtree of a node, document order.
    pub fn leaves(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<Vec<NodeDto>, ApiError> {
        self.traverse(channel, node, skip, TraversalEngine::leaves)
    }

    /// Transitive prerequisite closure of a node, ordered by node id.
    pub fn all_prerequisites(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<Vec<NodeDto>, ApiError> {
        self.traverse(channel, node, skip, TraversalEngine::all_prerequisites)
    }

    /// Directly related nodes, ordered by node id.
    pub fn all_related(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
    ) -> Result<Vec<NodeDto>, ApiError> {
        self.traverse(channel, node, skip, TraversalEngine::all_related)
    }

    /// Files in the subtree of a node that cannot currently be served.
    pub fn missing_files(&self, channel: &str, node: &str) -> Result<Vec<FileDto>, ApiError> {
        let node_id = parse_node(node)?;
        let engine = self.engine(channel)?;
        let files = engine.missing_files(&node_id)?;
        debug!(channel, node, missing = files.len(), "missing file scan served");
        Ok(files.iter().map(file_dto).collect())
    }

    fn partition(&self, channel: &str) -> Result<Arc<ChannelPartition>, ApiError> {
        let channel_id = ChannelId::parse(channel)
            .map_err(|e| ApiError::invalid_identifier("channel_id", channel, &e.0))?;
        Ok(self.registry.partition(&channel_id)?)
    }

    fn engine(&self, channel: &str) -> Result<TraversalEngine, ApiError> {
        let partition = self.partition(channel)?;
        let index = self.indexes.index_for(&partition)?;
        Ok(TraversalEngine::new(index, partition))
    }

    fn traverse<F>(
        &self,
        channel: &str,
        node: &str,
        skip: &BTreeSet<SkipField>,
        op: F,
    ) -> Result<Vec<NodeDto>, ApiError>
    where
        F: Fn(
            &TraversalEngine,
            &NodeId,
        ) -> Result<Vec<coppice_model::ContentNode>, coppice_query::QueryError>,
    {
        let node_id = parse_node(node)?;
        let engine = self.engine(channel)?;
        let nodes = op(&engine, &node_id)?;
        debug!(channel, node, results = nodes.len(), "traversal served");
        nodes
            .iter()
            .map(|n| node_dto(engine.partition(), n, skip))
            .collect()
    }
}

fn parse_node(node: &str) -> Result<NodeId, ApiError> {
    NodeId::parse(node).map_err(|e| ApiError::invalid_identifier("node_id", node, &e.0))
}
