use coppice_model::{ChannelId, File};
use std::path::{Path, PathBuf};

pub const PARTITION_FILE: &str = "channel.sqlite";
pub const BLOBS_DIR: &str = "blobs";

#[must_use]
pub fn channel_dir(root: &Path, channel: &ChannelId) -> PathBuf {
    root.join(channel.as_str())
}

#[must_use]
pub fn partition_path(root: &Path, channel: &ChannelId) -> PathBuf {
    channel_dir(root, channel).join(PARTITION_FILE)
}

/// Content-addressed blob location with a two-character fan-out directory,
/// `<channel>/blobs/<cc>/<checksum>.<extension>`.
#[must_use]
pub fn blob_path(channel_dir: &Path, file: &File) -> PathBuf {
    let fanout = &file.checksum[..2.min(file.checksum.len())];
    channel_dir
        .join(BLOBS_DIR)
        .join(fanout)
        .join(file.blob_name())
}
