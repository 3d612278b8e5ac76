use crate::dto::{ChannelDto, FileDto, NodeDto};
use crate::error::ApiError;
use crate::params::SkipField;
use coppice_model::{Channel, ContentNode, File, NodeId};
use coppice_store::ChannelPartition;
use std::collections::BTreeSet;

pub fn channel_dto(channel: &Channel) -> ChannelDto {
    ChannelDto {
        id: channel.id.as_str().to_string(),
        name: channel.name.clone(),
        root_id: channel.root_id.as_str().to_string(),
    }
}

pub fn file_dto(file: &File) -> FileDto {
    FileDto {
        id: file.id.as_str().to_string(),
        node_id: file.node_id.as_str().to_string(),
        available: file.available,
        checksum: file.checksum.clone(),
        extension: file.extension.clone(),
        file_size: file.file_size,
    }
}

pub fn node_dto(
    partition: &ChannelPartition,
    node: &ContentNode,
    skip: &BTreeSet<SkipField>,
) -> Result<NodeDto, ApiError> {
    let files = if skip.contains(&SkipField::Files) {
        None
    } else {
        let files = partition.files_for(&node.id)?;
        Some(files.iter().map(file_dto).collect())
    };
    let prerequisite_ids = if skip.contains(&SkipField::Prerequisites) {
        None
    } else {
        Some(id_strings(&node.prerequisite_ids))
    };
    let related_ids = if skip.contains(&SkipField::Related) {
        None
    } else {
        Some(id_strings(&node.related_ids))
    };

    Ok(NodeDto {
        id: node.id.as_str().to_string(),
        channel_id: node.channel_id.as_str().to_string(),
        kind: node.kind.as_str().to_string(),
        title: node.title.clone(),
        description: node.description.clone(),
        parent_id: node.parent_id.as_ref().map(|p| p.as_str().to_string()),
        sort_order: node.sort_order,
        files,
        prerequisite_ids,
        related_ids,
    })
}

fn id_strings(ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|id| id.as_str().to_string()).collect()
}
