use crate::error::StoreError;
use crate::partition::ChannelPartition;
use crate::paths::{partition_path, PARTITION_FILE};
use coppice_model::ChannelId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Lazy-opening cache of channel partitions. One handle per channel, opened
/// on first use and reused until eviction or shutdown. Concurrent first
/// access is coalesced through a per-channel open lock so exactly one caller
/// opens the sqlite file.
pub struct PartitionRegistry {
    root: PathBuf,
    partitions: RwLock<HashMap<ChannelId, Arc<ChannelPartition>>>,
    open_locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl PartitionRegistry {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            partitions: RwLock::new(HashMap::new()),
            open_locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition(&self, channel: &ChannelId) -> Result<Arc<ChannelPartition>, StoreError> {
        if let Some(found) = self.cached(channel) {
            return Ok(found);
        }

        let open_lock = {
            let mut locks = self
                .open_locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(channel.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        let _guard = open_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // A racing caller may have opened the partition while this one waited.
        if let Some(found) = self.cached(channel) {
            return Ok(found);
        }

        let partition = Arc::new(ChannelPartition::open(&self.root, channel.clone())?);
        info!(channel = %channel, "opened channel partition");
        self.partitions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(channel.clone(), Arc::clone(&partition));
        Ok(partition)
    }

    fn cached(&self, channel: &ChannelId) -> Option<Arc<ChannelPartition>> {
        self.partitions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(channel)
            .cloned()
    }

    /// True when the channel has a partition on disk, opened or not.
    #[must_use]
    pub fn channel_exists(&self, channel: &ChannelId) -> bool {
        partition_path(&self.root, channel).is_file()
    }

    /// Sorted ids of every channel with a partition under the root. A missing
    /// root directory is an empty catalog, not an error.
    pub fn list_channels(&self) -> Result<Vec<ChannelId>, StoreError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::new(crate::StoreErrorCode::Io, e.to_string())),
        };
        let mut channels = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::new(crate::StoreErrorCode::Io, e.to_string()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(channel) = ChannelId::parse(name) else {
                continue;
            };
            if entry.path().join(PARTITION_FILE).is_file() {
                channels.push(channel);
            }
        }
        channels.sort();
        Ok(channels)
    }

    /// Drops the cached handle; the next access reopens from disk. Paired
    /// with index invalidation on content re-import.
    pub fn evict(&self, channel: &ChannelId) -> bool {
        let removed = self
            .partitions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(channel)
            .is_some();
        if removed {
            debug!(channel = %channel, "evicted channel partition");
        }
        removed
    }

    pub fn close_all(&self) {
        let mut partitions = self
            .partitions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let count = partitions.len();
        partitions.clear();
        if count > 0 {
            info!(count, "closed all channel partitions");
        }
    }

    /// Opened channel ids, sorted. Debug surface only.
    #[must_use]
    pub fn cached_channels(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self
            .partitions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
