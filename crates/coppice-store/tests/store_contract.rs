use coppice_core::sha256_hex;
use coppice_model::{Channel, ChannelId, ContentNode, File, FileId, NodeId, NodeKind};
use coppice_store::{
    blob_path, channel_dir, import_channel, partition_path, stage_blob, validate_manifest,
    ChannelManifest, ChannelPartition, NodeFilter, PartitionRegistry, StoreErrorCode,
};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn cid(raw: &str) -> ChannelId {
    ChannelId::parse(raw).expect("channel id")
}

fn nid(raw: &str) -> NodeId {
    NodeId::parse(raw).expect("node id")
}

fn mk_node(channel: &ChannelId, id: &str, kind: NodeKind, parent: Option<&str>) -> ContentNode {
    ContentNode {
        id: nid(id),
        channel_id: channel.clone(),
        kind,
        title: format!("Node {id}"),
        description: format!("About {id}"),
        parent_id: parent.map(nid),
        sort_order: 0,
        prerequisite_ids: Vec::new(),
        related_ids: Vec::new(),
    }
}

fn mk_file(id: &str, node: &str, bytes: &[u8]) -> File {
    File {
        id: FileId::parse(id).expect("file id"),
        node_id: nid(node),
        available: true,
        checksum: sha256_hex(bytes),
        extension: "pdf".to_string(),
        file_size: bytes.len() as u64,
    }
}

fn mk_manifest(channel_id: &ChannelId) -> ChannelManifest {
    let channel = Channel::new(channel_id.clone(), "Science", nid("root")).expect("channel");
    ChannelManifest {
        channel,
        nodes: vec![
            mk_node(channel_id, "root", NodeKind::Topic, None),
            mk_node(channel_id, "physics", NodeKind::Topic, Some("root")),
            mk_node(channel_id, "optics", NodeKind::Leaf, Some("physics")),
        ],
        files: vec![mk_file("f-optics", "optics", b"lesson body")],
    }
}

#[test]
fn import_writes_a_readable_partition() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    let path = import_channel(root.path(), &mk_manifest(&channel_id)).expect("import");
    assert!(path.exists(), "channel.sqlite must exist");
    assert_eq!(path, partition_path(root.path(), &channel_id));

    let partition = ChannelPartition::open(root.path(), channel_id).expect("open");
    let channel = partition.channel().expect("channel meta");
    assert_eq!(channel.name, "Science");
    assert_eq!(channel.root_id.as_str(), "root");

    let node = partition.get_node(&nid("optics")).expect("node");
    assert_eq!(node.kind, NodeKind::Leaf);
    assert_eq!(node.parent_id, Some(nid("physics")));
}

#[test]
fn import_rejects_overwrite_of_existing_channel() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    import_channel(root.path(), &mk_manifest(&channel_id)).expect("first import");

    let err = import_channel(root.path(), &mk_manifest(&channel_id))
        .expect_err("second import must fail");
    assert_eq!(err.code, StoreErrorCode::Conflict);
    assert_eq!(err.code.as_str(), "conflict");
}

#[test]
fn import_leaves_no_partial_file_behind_on_validation_failure() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    let mut manifest = mk_manifest(&channel_id);
    manifest.nodes.pop();

    let err = import_channel(root.path(), &manifest).expect_err("dangling file owner");
    assert_eq!(err.code, StoreErrorCode::Validation);
    assert!(!partition_path(root.path(), &channel_id).exists());
}

#[test]
fn manifest_validation_names_the_violated_rule() {
    let channel_id = cid("science");

    let mut no_root = mk_manifest(&channel_id);
    no_root.nodes.retain(|n| n.id.as_str() != "root");
    let err = validate_manifest(&no_root).expect_err("missing root");
    assert_eq!(err.code, StoreErrorCode::Validation);
    assert!(err.message.contains("root"), "message was: {}", err.message);

    let mut leaf_parent = mk_manifest(&channel_id);
    leaf_parent
        .nodes
        .push(mk_node(&channel_id, "orphan", NodeKind::Leaf, Some("optics")));
    let err = validate_manifest(&leaf_parent).expect_err("leaf used as parent");
    assert_eq!(err.code, StoreErrorCode::Validation);

    let mut dup = mk_manifest(&channel_id);
    let copy = dup.nodes[2].clone();
    dup.nodes.push(copy);
    let err = validate_manifest(&dup).expect_err("duplicate node id");
    assert_eq!(err.code, StoreErrorCode::Validation);

    let mut foreign = mk_manifest(&channel_id);
    foreign.nodes[1].channel_id = cid("other");
    let err = validate_manifest(&foreign).expect_err("foreign channel id");
    assert_eq!(err.code, StoreErrorCode::Validation);
}

#[test]
fn import_rejects_file_sizes_beyond_the_storable_range() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    let mut manifest = mk_manifest(&channel_id);
    manifest.files[0].file_size = u64::MAX;

    let err = import_channel(root.path(), &manifest).expect_err("oversized file");
    assert_eq!(err.code, StoreErrorCode::Validation);
    assert!(!partition_path(root.path(), &channel_id).exists());
}

#[test]
fn negative_stored_file_size_reads_as_corrupt() {
    let conn = rusqlite::Connection::open_in_memory().expect("open memory db");
    conn.execute_batch(&format!(
        "
        PRAGMA user_version={};
        CREATE TABLE channel_meta (k TEXT PRIMARY KEY, v TEXT NOT NULL) WITHOUT ROWID;
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
        INSERT INTO channel_meta VALUES ('channel_id', 'science');
        INSERT INTO channel_meta VALUES ('name', 'Science');
        INSERT INTO channel_meta VALUES ('root_id', 'root');
        INSERT INTO content_node VALUES ('root', NULL, 'topic', 'Root', '', 0);
        INSERT INTO file VALUES ('f-bad', 'root', 1, '{}', 'pdf', -12);
        ",
        coppice_store::SQLITE_SCHEMA_VERSION,
        "ab".repeat(32)
    ))
    .expect("schema");
    let partition =
        ChannelPartition::from_connection(cid("science"), std::env::temp_dir(), conn)
            .expect("partition");

    let bad = FileId::parse("f-bad").expect("file id");
    let err = partition.get_file(&bad).expect_err("negative size");
    assert_eq!(err.code, StoreErrorCode::Corrupt);
}

#[test]
fn open_of_absent_channel_reports_partition_not_found() {
    let root = tempdir().expect("tempdir");
    let err = ChannelPartition::open(root.path(), cid("ghost")).expect_err("absent partition");
    assert_eq!(err.code, StoreErrorCode::PartitionNotFound);
    assert_eq!(err.code.as_str(), "partition_not_found");
}

#[test]
fn node_and_file_lookups_use_stable_error_codes() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    import_channel(root.path(), &mk_manifest(&channel_id)).expect("import");
    let partition = ChannelPartition::open(root.path(), channel_id).expect("open");

    let err = partition.get_node(&nid("ghost")).expect_err("absent node");
    assert_eq!(err.code, StoreErrorCode::NodeNotFound);
    assert_eq!(err.code.as_str(), "node_not_found");

    let err = partition.list_files(&nid("ghost")).expect_err("absent node");
    assert_eq!(err.code, StoreErrorCode::NodeNotFound);

    let ghost_file = FileId::parse("f-ghost").expect("file id");
    let err = partition.get_file(&ghost_file).expect_err("absent file");
    assert_eq!(err.code, StoreErrorCode::FileNotFound);
    assert_eq!(err.code.as_str(), "file_not_found");
}

#[test]
fn list_nodes_filters_match_substrings_and_escape_wildcards() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    let mut manifest = mk_manifest(&channel_id);
    manifest.nodes[2].title = "Optics 50% off".to_string();
    import_channel(root.path(), &manifest).expect("import");
    let partition = ChannelPartition::open(root.path(), channel_id).expect("open");

    let all = partition.list_nodes(&NodeFilter::default()).expect("all nodes");
    assert_eq!(all.len(), 3);

    let filter = NodeFilter {
        title_contains: Some("50% off".to_string()),
        ..NodeFilter::default()
    };
    let hits = partition.list_nodes(&filter).expect("title filter");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id.as_str(), "optics");

    // A LIKE wildcard in the needle must not match everything.
    let filter = NodeFilter {
        title_contains: Some("%".to_string()),
        ..NodeFilter::default()
    };
    let hits = partition.list_nodes(&filter).expect("escaped filter");
    assert_eq!(hits.len(), 1, "only the literal percent title matches");
}

#[test]
fn registry_opens_partitions_lazily_and_caches_the_handle() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    import_channel(root.path(), &mk_manifest(&channel_id)).expect("import");

    let registry = PartitionRegistry::new(root.path().to_path_buf());
    assert!(registry.cached_channels().is_empty());

    let first = registry.partition(&channel_id).expect("open");
    let second = registry.partition(&channel_id).expect("cached");
    assert!(Arc::ptr_eq(&first, &second), "handle must be shared");
    assert_eq!(registry.cached_channels(), vec![channel_id.clone()]);

    assert!(registry.evict(&channel_id));
    assert!(!registry.evict(&channel_id), "second evict finds nothing");
    assert!(registry.cached_channels().is_empty());
}

#[test]
fn registry_reports_unknown_channels_without_caching() {
    let root = tempdir().expect("tempdir");
    let registry = PartitionRegistry::new(root.path().to_path_buf());

    let err = registry.partition(&cid("ghost")).expect_err("unknown channel");
    assert_eq!(err.code, StoreErrorCode::PartitionNotFound);
    assert!(registry.cached_channels().is_empty());
    assert!(!registry.channel_exists(&cid("ghost")));
}

#[test]
fn registry_lists_only_directories_holding_a_partition() {
    let root = tempdir().expect("tempdir");
    import_channel(root.path(), &mk_manifest(&cid("science"))).expect("import");
    std::fs::create_dir(root.path().join("empty-dir")).expect("stray dir");
    std::fs::write(root.path().join("stray.txt"), b"noise").expect("stray file");

    let registry = PartitionRegistry::new(root.path().to_path_buf());
    assert_eq!(registry.list_channels().expect("list"), vec![cid("science")]);
}

#[test]
fn listing_a_missing_data_root_yields_no_channels() {
    let root = tempdir().expect("tempdir");
    let registry = PartitionRegistry::new(root.path().join("never-created"));
    assert!(registry.list_channels().expect("list").is_empty());
}

#[test]
fn concurrent_first_access_shares_one_partition_handle() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    import_channel(root.path(), &mk_manifest(&channel_id)).expect("import");
    let registry = Arc::new(PartitionRegistry::new(root.path().to_path_buf()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let channel_id = channel_id.clone();
        handles.push(thread::spawn(move || {
            registry.partition(&channel_id).expect("partition")
        }));
    }
    let partitions: Vec<Arc<ChannelPartition>> =
        handles.into_iter().map(|h| h.join().expect("thread")).collect();
    for partition in &partitions[1..] {
        assert!(Arc::ptr_eq(partition, &partitions[0]));
    }
}

#[test]
fn stage_blob_verifies_the_checksum_before_writing() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    import_channel(root.path(), &mk_manifest(&channel_id)).expect("import");
    let file = mk_file("f-optics", "optics", b"lesson body");

    let err = stage_blob(root.path(), &channel_id, &file, b"tampered bytes")
        .expect_err("checksum mismatch");
    assert_eq!(err.code, StoreErrorCode::Validation);

    let partition = ChannelPartition::open(root.path(), channel_id.clone()).expect("open");
    assert!(
        !partition.has_blob_store(),
        "a rejected blob must not create the blob store"
    );

    let path = stage_blob(root.path(), &channel_id, &file, b"lesson body").expect("stage");
    assert!(path.exists());
    assert!(partition.has_blob_store());
    assert!(partition.blob_present(&file));
    assert!(partition.verify_blob(&file).expect("verify"));
}

#[test]
fn blob_paths_fan_out_on_the_checksum_prefix() {
    let root = tempdir().expect("tempdir");
    let channel_id = cid("science");
    let file = mk_file("f-optics", "optics", b"lesson body");
    let dir = channel_dir(root.path(), &channel_id);
    let path = blob_path(&dir, &file);

    let fanout = path.parent().expect("fanout dir");
    assert_eq!(
        fanout.file_name().and_then(|s| s.to_str()),
        Some(&file.checksum[..2])
    );
    assert_eq!(
        path.file_name().and_then(|s| s.to_str()),
        Some(file.blob_name().as_str())
    );
}
