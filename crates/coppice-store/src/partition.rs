use crate::error::{StoreError, StoreErrorCode};
use crate::paths::{blob_path, partition_path};
use coppice_core::sha256_hex;
use coppice_model::{Channel, ChannelId, ContentNode, File, FileId, NodeId, NodeKind};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const SQLITE_SCHEMA_VERSION: i64 = 1;

pub const RELATION_PREREQUISITE: &str = "prerequisite";
pub const RELATION_RELATED: &str = "related";

/// Title/description substring predicate for `list_nodes`. Empty filter
/// matches every node in the partition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NodeFilter {
    pub title_contains: Option<String>,
    pub description_contains: Option<String>,
}

impl NodeFilter {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title_contains.is_none() && self.description_contains.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
    pub sort_order: i64,
}

/// Adjacency dump of one partition, the input to index building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub root_id: NodeId,
    pub nodes: Vec<TopologyNode>,
    pub prerequisites: Vec<(NodeId, NodeId)>,
    pub related: Vec<(NodeId, NodeId)>,
}

/// One opened channel partition: a read-only sqlite handle plus the channel
/// directory for blob probing. Shared across threads behind the connection
/// mutex; never written after import.
#[derive(Debug)]
pub struct ChannelPartition {
    channel_id: ChannelId,
    dir: PathBuf,
    conn: Mutex<Connection>,
}

fn apply_readonly_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA query_only=ON; PRAGMA journal_mode=OFF; PRAGMA synchronous=OFF; PRAGMA temp_store=MEMORY; PRAGMA cache_size=-16000;",
    )
    .map_err(|e| StoreError::sql(&e))
}

struct NodeRow {
    id: String,
    parent_id: Option<String>,
    kind: String,
    title: String,
    description: String,
    sort_order: i64,
}

fn parse_node_id(raw: &str) -> Result<NodeId, StoreError> {
    NodeId::parse(raw)
        .map_err(|e| StoreError::new(StoreErrorCode::Corrupt, format!("bad stored node id: {e}")))
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '!' | '%' | '_' => {
                out.push('!');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

impl ChannelPartition {
    pub fn open(root: &Path, channel_id: ChannelId) -> Result<Self, StoreError> {
        let path = partition_path(root, &channel_id);
        if !path.is_file() {
            return Err(StoreError::partition_not_found(&channel_id));
        }
        let conn = Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| StoreError::sql(&e))?;
        apply_readonly_pragmas(&conn)?;
        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let partition = Self::from_connection(channel_id, dir, conn)?;
        Ok(partition)
    }

    /// Wraps an already-open connection. Used by the import verifier and by
    /// tests that build in-memory partitions.
    pub fn from_connection(
        channel_id: ChannelId,
        dir: PathBuf,
        conn: Connection,
    ) -> Result<Self, StoreError> {
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| StoreError::sql(&e))?;
        if version != SQLITE_SCHEMA_VERSION {
            return Err(StoreError::new(
                StoreErrorCode::Corrupt,
                format!(
                    "partition schema version {version} does not match expected {SQLITE_SCHEMA_VERSION}"
                ),
            ));
        }
        let partition = Self {
            channel_id,
            dir,
            conn: Mutex::new(conn),
        };
        let meta_id = partition.meta("channel_id")?;
        if meta_id != partition.channel_id.as_str() {
            return Err(StoreError::new(
                StoreErrorCode::Corrupt,
                format!(
                    "partition metadata names channel {meta_id}, expected {}",
                    partition.channel_id
                ),
            ));
        }
        Ok(partition)
    }

    #[must_use]
    pub const fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn conn_guard(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Queries only read; a poisoned lock still holds a usable connection.
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn meta(&self, key: &str) -> Result<String, StoreError> {
        let conn = self.conn_guard();
        conn.query_row(
            "SELECT v FROM channel_meta WHERE k = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| StoreError::sql(&e))?
        .ok_or_else(|| {
            StoreError::new(
                StoreErrorCode::Corrupt,
                format!("partition metadata missing key {key}"),
            )
        })
    }

    pub fn channel(&self) -> Result<Channel, StoreError> {
        let name = self.meta("name")?;
        let root_raw = self.meta("root_id")?;
        let root_id = parse_node_id(&root_raw)?;
        Channel::new(self.channel_id.clone(), &name, root_id)
            .map_err(|e| StoreError::new(StoreErrorCode::Corrupt, e.to_string()))
    }

    pub fn node_exists(&self, node: &NodeId) -> Result<bool, StoreError> {
        let conn = self.conn_guard();
        conn.query_row(
            "SELECT 1 FROM content_node WHERE id = ?1",
            params![node.as_str()],
            |_| Ok(()),
        )
        .optional()
        .map_err(|e| StoreError::sql(&e))
        .map(|found| found.is_some())
    }

    pub fn get_node(&self, node: &NodeId) -> Result<ContentNode, StoreError> {
        let row = {
            let conn = self.conn_guard();
            conn.query_row(
                "SELECT id, parent_id, kind, title, description, sort_order
                 FROM content_node WHERE id = ?1",
                params![node.as_str()],
                |row| {
                    Ok(NodeRow {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        description: row.get(4)?,
                        sort_order: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StoreError::sql(&e))?
            .ok_or_else(|| StoreError::node_not_found(node))?
        };
        self.finish_node(row)
    }

    /// Batch resolve; the output preserves input order. Every id is expected
    /// to exist, so an absent row surfaces as `NodeNotFound`.
    pub fn get_nodes(&self, nodes: &[NodeId]) -> Result<Vec<ContentNode>, StoreError> {
        nodes.iter().map(|id| self.get_node(id)).collect()
    }

    pub fn list_nodes(&self, filter: &NodeFilter) -> Result<Vec<ContentNode>, StoreError> {
        let mut sql = String::from(
            "SELECT id, parent_id, kind, title, description, sort_order FROM content_node",
        );
        let mut where_parts: Vec<String> = Vec::new();
        let mut params_vec: Vec<String> = Vec::new();
        if let Some(term) = &filter.title_contains {
            where_parts.push("title LIKE ? ESCAPE '!'".to_string());
            params_vec.push(format!("%{}%", escape_like(term)));
        }
        if let Some(term) = &filter.description_contains {
            where_parts.push("description LIKE ? ESCAPE '!'".to_string());
            params_vec.push(format!("%{}%", escape_like(term)));
        }
        if !where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_parts.join(" AND "));
        }
        sql.push_str(" ORDER BY sort_order ASC, id ASC");

        let rows = {
            let conn = self.conn_guard();
            let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::sql(&e))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
                    Ok(NodeRow {
                        id: row.get(0)?,
                        parent_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        description: row.get(4)?,
                        sort_order: row.get(5)?,
                    })
                })
                .map_err(|e| StoreError::sql(&e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::sql(&e))?;
            rows
        };
        rows.into_iter().map(|row| self.finish_node(row)).collect()
    }

    fn finish_node(&self, row: NodeRow) -> Result<ContentNode, StoreError> {
        let id = parse_node_id(&row.id)?;
        let parent_id = row.parent_id.as_deref().map(parse_node_id).transpose()?;
        let kind = NodeKind::parse(&row.kind)
            .map_err(|e| StoreError::new(StoreErrorCode::Corrupt, e.to_string()))?;
        let prerequisite_ids = self.relation_targets(RELATION_PREREQUISITE, &id)?;
        let related_ids = self.relation_targets(RELATION_RELATED, &id)?;
        Ok(ContentNode {
            id,
            channel_id: self.channel_id.clone(),
            kind,
            title: row.title,
            description: row.description,
            parent_id,
            sort_order: row.sort_order,
            prerequisite_ids,
            related_ids,
        })
    }

    fn relation_targets(&self, kind: &str, node: &NodeId) -> Result<Vec<NodeId>, StoreError> {
        let conn = self.conn_guard();
        let mut stmt = conn
            .prepare(
                "SELECT dst_id FROM node_relation WHERE kind = ?1 AND src_id = ?2 ORDER BY dst_id ASC",
            )
            .map_err(|e| StoreError::sql(&e))?;
        let raw = stmt
            .query_map(params![kind, node.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| StoreError::sql(&e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::sql(&e))?;
        raw.iter().map(|s| parse_node_id(s)).collect()
    }

    pub fn get_file(&self, file: &FileId) -> Result<File, StoreError> {
        let row = {
            let conn = self.conn_guard();
            conn.query_row(
                "SELECT id, node_id, available, checksum, extension, file_size
                 FROM file WHERE id = ?1",
                params![file.as_str()],
                map_file_row,
            )
            .optional()
            .map_err(|e| StoreError::sql(&e))?
            .ok_or_else(|| StoreError::file_not_found(file))?
        };
        finish_file(row)
    }

    pub fn list_files(&self, node: &NodeId) -> Result<Vec<File>, StoreError> {
        if !self.node_exists(node)? {
            return Err(StoreError::node_not_found(node));
        }
        self.files_for(node)
    }

    /// Files of one node without the existence check; callers that already
    /// hold the node id from the index use this.
    pub fn files_for(&self, node: &NodeId) -> Result<Vec<File>, StoreError> {
        let rows = {
            let conn = self.conn_guard();
            let mut stmt = conn
                .prepare(
                    "SELECT id, node_id, available, checksum, extension, file_size
                     FROM file WHERE node_id = ?1 ORDER BY id ASC",
                )
                .map_err(|e| StoreError::sql(&e))?;
            let rows = stmt
                .query_map(params![node.as_str()], map_file_row)
                .map_err(|e| StoreError::sql(&e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::sql(&e))?;
            rows
        };
        rows.into_iter().map(finish_file).collect()
    }

    pub fn load_topology(&self) -> Result<Topology, StoreError> {
        let root_raw = self.meta("root_id")?;
        let root_id = parse_node_id(&root_raw)?;

        let node_rows = {
            let conn = self.conn_guard();
            let mut stmt = conn
                .prepare("SELECT id, parent_id, kind, sort_order FROM content_node")
                .map_err(|e| StoreError::sql(&e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|e| StoreError::sql(&e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::sql(&e))?;
            rows
        };
        let mut nodes = Vec::with_capacity(node_rows.len());
        for (id, parent_id, kind, sort_order) in node_rows {
            nodes.push(TopologyNode {
                id: parse_node_id(&id)?,
                parent_id: parent_id.as_deref().map(parse_node_id).transpose()?,
                kind: NodeKind::parse(&kind)
                    .map_err(|e| StoreError::new(StoreErrorCode::Corrupt, e.to_string()))?,
                sort_order,
            });
        }

        let relation_rows = {
            let conn = self.conn_guard();
            let mut stmt = conn
                .prepare("SELECT kind, src_id, dst_id FROM node_relation")
                .map_err(|e| StoreError::sql(&e))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(|e| StoreError::sql(&e))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::sql(&e))?;
            rows
        };
        let mut prerequisites = Vec::new();
        let mut related = Vec::new();
        for (kind, src, dst) in relation_rows {
            let edge = (parse_node_id(&src)?, parse_node_id(&dst)?);
            match kind.as_str() {
                RELATION_PREREQUISITE => prerequisites.push(edge),
                RELATION_RELATED => related.push(edge),
                other => {
                    return Err(StoreError::new(
                        StoreErrorCode::Corrupt,
                        format!("unknown relation kind: {other}"),
                    ))
                }
            }
        }

        Ok(Topology {
            root_id,
            nodes,
            prerequisites,
            related,
        })
    }

    /// True when the channel carries a content-addressed blob store at all.
    /// Partitions imported without staged blobs rely on the availability
    /// flag alone.
    #[must_use]
    pub fn has_blob_store(&self) -> bool {
        self.dir.join(crate::paths::BLOBS_DIR).is_dir()
    }

    /// Storage probe: true when the backing blob exists on disk.
    #[must_use]
    pub fn blob_present(&self, file: &File) -> bool {
        blob_path(&self.dir, file).is_file()
    }

    /// Reads the blob and compares its sha256 against the file record.
    pub fn verify_blob(&self, file: &File) -> Result<bool, StoreError> {
        let path = blob_path(&self.dir, file);
        let bytes = fs::read(&path).map_err(|e| StoreError::io(&e))?;
        Ok(sha256_hex(&bytes) == file.checksum)
    }
}

type FileRow = (String, String, i64, String, String, i64);

fn map_file_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn finish_file(row: FileRow) -> Result<File, StoreError> {
    let (id, node_id, available, checksum, extension, file_size) = row;
    let id = FileId::parse(&id)
        .map_err(|e| StoreError::new(StoreErrorCode::Corrupt, format!("bad stored file id: {e}")))?;
    let node_id = parse_node_id(&node_id)?;
    let file_size = u64::try_from(file_size).map_err(|_| {
        StoreError::new(
            StoreErrorCode::Corrupt,
            format!("file {id} has a negative stored size {file_size}"),
        )
    })?;
    Ok(File {
        id,
        node_id,
        available: available != 0,
        checksum,
        extension,
        file_size,
    })
}
