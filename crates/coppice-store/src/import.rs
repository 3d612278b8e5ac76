use crate::error::{StoreError, StoreErrorCode};
use crate::partition::{SQLITE_SCHEMA_VERSION, RELATION_PREREQUISITE, RELATION_RELATED};
use crate::paths::{blob_path, channel_dir, partition_path};
use coppice_core::sha256_hex;
use coppice_model::{Channel, ChannelId, ContentNode, File, FileId, NodeId};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Interchange format consumed by the import path. One manifest describes one
/// complete channel partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelManifest {
    pub channel: Channel,
    pub nodes: Vec<ContentNode>,
    pub files: Vec<File>,
}

fn validation(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Validation, message)
}

/// Static checks for the tree invariants: unique ids, a single root that
/// matches the channel metadata, parents that exist and are topics, relation
/// targets inside the channel, and an acyclic parent graph.
pub fn validate_manifest(manifest: &ChannelManifest) -> Result<(), StoreError> {
    let channel = &manifest.channel;

    let mut by_id: HashMap<&NodeId, &ContentNode> = HashMap::new();
    for node in &manifest.nodes {
        node.validate().map_err(|e| validation(e.to_string()))?;
        if node.channel_id != channel.id {
            return Err(validation(format!(
                "node {} belongs to channel {}, manifest is for {}",
                node.id, node.channel_id, channel.id
            )));
        }
        if by_id.insert(&node.id, node).is_some() {
            return Err(validation(format!("duplicate node id {}", node.id)));
        }
    }

    let roots: Vec<&NodeId> = manifest
        .nodes
        .iter()
        .filter(|n| n.parent_id.is_none())
        .map(|n| &n.id)
        .collect();
    if roots.len() != 1 || roots[0] != &channel.root_id {
        return Err(validation(format!(
            "channel {} must have exactly one root node {}",
            channel.id, channel.root_id
        )));
    }

    for node in &manifest.nodes {
        if let Some(parent_id) = &node.parent_id {
            let parent = by_id.get(parent_id).ok_or_else(|| {
                validation(format!("node {} has unknown parent {parent_id}", node.id))
            })?;
            if !parent.kind.is_topic() {
                return Err(validation(format!(
                    "node {} has leaf parent {parent_id}; only topics have children",
                    node.id
                )));
            }
        }
        for target in node.prerequisite_ids.iter().chain(&node.related_ids) {
            if !by_id.contains_key(target) {
                return Err(validation(format!(
                    "node {} references unknown node {target}",
                    node.id
                )));
            }
        }
    }

    // Every node must reach the root in at most |nodes| parent steps.
    for node in &manifest.nodes {
        let mut current = node;
        let mut steps = 0_usize;
        while let Some(parent_id) = &current.parent_id {
            steps += 1;
            if steps > manifest.nodes.len() {
                return Err(validation(format!(
                    "parent chain of node {} never reaches the root",
                    node.id
                )));
            }
            current = by_id[parent_id];
        }
    }

    let mut file_ids: HashSet<&FileId> = HashSet::new();
    for file in &manifest.files {
        file.validate().map_err(|e| validation(e.to_string()))?;
        if !by_id.contains_key(&file.node_id) {
            return Err(validation(format!(
                "file {} references unknown node {}",
                file.id, file.node_id
            )));
        }
        if !file_ids.insert(&file.id) {
            return Err(validation(format!("duplicate file id {}", file.id)));
        }
    }

    Ok(())
}

/// Creates the channel partition on disk. Partitions are immutable after
/// import; re-importing an existing channel is a conflict, not an update.
pub fn import_channel(root: &Path, manifest: &ChannelManifest) -> Result<PathBuf, StoreError> {
    validate_manifest(manifest)?;

    let final_path = partition_path(root, &manifest.channel.id);
    if final_path.exists() {
        return Err(StoreError::new(
            StoreErrorCode::Conflict,
            format!(
                "channel {} is already imported and must not be overwritten",
                manifest.channel.id
            ),
        ));
    }
    // The blobs directory appears only once blobs are staged; partitions
    // without staged blobs are served on the availability flag alone.
    let dir = channel_dir(root, &manifest.channel.id);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&e))?;

    let tmp_path = dir.join("channel.sqlite.tmp");
    let written = write_partition_sqlite(&tmp_path, manifest);
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, &final_path).map_err(|e| StoreError::io(&e))?;
    info!(
        channel = %manifest.channel.id,
        nodes = manifest.nodes.len(),
        files = manifest.files.len(),
        "imported channel partition"
    );
    Ok(final_path)
}

fn write_partition_sqlite(path: &Path, manifest: &ChannelManifest) -> Result<(), StoreError> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| StoreError::io(&e))?;
    }
    let mut conn = Connection::open(path).map_err(|e| StoreError::sql(&e))?;
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=OFF;
        PRAGMA locking_mode=EXCLUSIVE;
        PRAGMA temp_store=MEMORY;
        CREATE TABLE channel_meta (
          k TEXT PRIMARY KEY,
          v TEXT NOT NULL
        ) WITHOUT ROWID;
        CREATE TABLE content_node (
          id TEXT PRIMARY KEY,
          parent_id TEXT,
          kind TEXT NOT NULL,
          title TEXT NOT NULL,
          description TEXT NOT NULL,
          sort_order INTEGER NOT NULL
        ) WITHOUT ROWID;
        CREATE TABLE node_relation (
          kind TEXT NOT NULL,
          src_id TEXT NOT NULL,
          dst_id TEXT NOT NULL,
          PRIMARY KEY (kind, src_id, dst_id)
        ) WITHOUT ROWID;
        CREATE TABLE file (
          id TEXT PRIMARY KEY,
          node_id TEXT NOT NULL,
          available INTEGER NOT NULL,
          checksum TEXT NOT NULL,
          extension TEXT NOT NULL,
          file_size INTEGER NOT NULL
        ) WITHOUT ROWID;
        ",
    )
    .map_err(|e| StoreError::sql(&e))?;
    conn.execute_batch(&format!("PRAGMA user_version={SQLITE_SCHEMA_VERSION};"))
        .map_err(|e| StoreError::sql(&e))?;

    let tx = conn.transaction().map_err(|e| StoreError::sql(&e))?;
    {
        let mut meta_stmt = tx
            .prepare("INSERT INTO channel_meta (k, v) VALUES (?1, ?2)")
            .map_err(|e| StoreError::sql(&e))?;
        let schema_version = SQLITE_SCHEMA_VERSION.to_string();
        for (k, v) in [
            ("channel_id", manifest.channel.id.as_str()),
            ("name", manifest.channel.name.as_str()),
            ("root_id", manifest.channel.root_id.as_str()),
            ("schema_version", schema_version.as_str()),
        ] {
            meta_stmt
                .execute(params![k, v])
                .map_err(|e| StoreError::sql(&e))?;
        }

        let mut node_stmt = tx
            .prepare(
                "INSERT INTO content_node (id, parent_id, kind, title, description, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| StoreError::sql(&e))?;
        let mut relation_stmt = tx
            .prepare("INSERT INTO node_relation (kind, src_id, dst_id) VALUES (?1, ?2, ?3)")
            .map_err(|e| StoreError::sql(&e))?;
        for node in &manifest.nodes {
            node_stmt
                .execute(params![
                    node.id.as_str(),
                    node.parent_id.as_ref().map(coppice_model::NodeId::as_str),
                    node.kind.as_str(),
                    node.title,
                    node.description,
                    node.sort_order,
                ])
                .map_err(|e| StoreError::sql(&e))?;
            for target in &node.prerequisite_ids {
                relation_stmt
                    .execute(params![RELATION_PREREQUISITE, node.id.as_str(), target.as_str()])
                    .map_err(|e| StoreError::sql(&e))?;
            }
            for target in &node.related_ids {
                relation_stmt
                    .execute(params![RELATION_RELATED, node.id.as_str(), target.as_str()])
                    .map_err(|e| StoreError::sql(&e))?;
            }
        }

        let mut file_stmt = tx
            .prepare(
                "INSERT INTO file (id, node_id, available, checksum, extension, file_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .map_err(|e| StoreError::sql(&e))?;
        for file in &manifest.files {
            let file_size = i64::try_from(file.file_size).map_err(|_| {
                validation(format!(
                    "file {} size {} exceeds the storable range",
                    file.id, file.file_size
                ))
            })?;
            file_stmt
                .execute(params![
                    file.id.as_str(),
                    file.node_id.as_str(),
                    i64::from(file.available),
                    file.checksum,
                    file.extension,
                    file_size,
                ])
                .map_err(|e| StoreError::sql(&e))?;
        }
    }
    tx.commit().map_err(|e| StoreError::sql(&e))?;

    conn.execute_batch(
        "
        CREATE INDEX idx_content_node_parent ON content_node(parent_id, sort_order, id);
        CREATE INDEX idx_node_relation_src ON node_relation(src_id);
        CREATE INDEX idx_file_node ON file(node_id);
        CREATE INDEX idx_file_available ON file(available);
        ANALYZE;
        ",
    )
    .map_err(|e| StoreError::sql(&e))?;

    // Close cleanly so WAL side files are checkpointed before the rename.
    conn.execute_batch("PRAGMA journal_mode=DELETE;")
        .map_err(|e| StoreError::sql(&e))?;
    drop(conn);
    Ok(())
}

/// Writes one blob into the channel's content-addressed store, refusing bytes
/// whose sha256 does not match the file record.
pub fn stage_blob(
    root: &Path,
    channel: &ChannelId,
    file: &File,
    bytes: &[u8],
) -> Result<PathBuf, StoreError> {
    let actual = sha256_hex(bytes);
    if actual != file.checksum {
        return Err(StoreError::new(
            StoreErrorCode::Validation,
            format!(
                "blob checksum mismatch for file {}: expected {}, got {actual}",
                file.id, file.checksum
            ),
        ));
    }
    let path = blob_path(&channel_dir(root, channel), file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(&e))?;
    }
    fs::write(&path, bytes).map_err(|e| StoreError::io(&e))?;
    Ok(path)
}
