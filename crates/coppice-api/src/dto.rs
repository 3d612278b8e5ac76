use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelDto {
    pub id: String,
    pub name: String,
    pub root_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDto {
    pub id: String,
    pub node_id: String,
    pub available: bool,
    pub checksum: String,
    pub extension: String,
    pub file_size: u64,
}

/// A content node with its embeddable sections. A `None` section was
/// skipped on request; an empty `Vec` means the section was computed and
/// is genuinely empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDto {
    pub id: String,
    pub channel_id: String,
    pub kind: String,
    pub title: String,
    pub description: String,
    pub parent_id: Option<String>,
    pub sort_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileDto>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prerequisite_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelListDto {
    pub channels: Vec<ChannelDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeListDto {
    pub nodes: Vec<NodeDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileListDto {
    pub files: Vec<FileDto>,
}
