#![forbid(unsafe_code)]

mod error;
mod import;
mod partition;
mod paths;
mod registry;

pub use error::{StoreError, StoreErrorCode};
pub use import::{import_channel, stage_blob, validate_manifest, ChannelManifest};
pub use partition::{
    ChannelPartition, NodeFilter, Topology, TopologyNode, RELATION_PREREQUISITE, RELATION_RELATED,
    SQLITE_SCHEMA_VERSION,
};
pub use paths::{blob_path, channel_dir, partition_path, BLOBS_DIR, PARTITION_FILE};
pub use registry::PartitionRegistry;

pub const CRATE_NAME: &str = "coppice-store";
