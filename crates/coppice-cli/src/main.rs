#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use coppice_api::{
    map_error, parse_skip, ApiError, CatalogService, ChannelListDto, FileListDto, NodeListDto,
    NodeListParams, SkipField,
};
use coppice_core::{resolve_data_root, ExitCode, ENV_COPPICE_LOG};
use coppice_store::{import_channel, stage_blob, ChannelManifest, NodeFilter, StoreErrorCode};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coppice")]
#[command(about = "Coppice content catalog CLI")]
struct Cli {
    /// Emit compact machine-readable JSON instead of pretty output.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    /// Partition root. Defaults to COPPICE_DATA_ROOT, then the XDG data home.
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a channel manifest into the partition root.
    Import {
        #[arg(long)]
        manifest: PathBuf,
        /// Directory holding blob payloads named `<checksum>.<extension>`.
        #[arg(long)]
        blobs: Option<PathBuf>,
    },
    Channels {
        #[command(subcommand)]
        command: ChannelsCommand,
    },
    Channel {
        #[command(subcommand)]
        command: ChannelCommand,
    },
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },
}

#[derive(Subcommand)]
enum ChannelsCommand {
    /// List every imported channel.
    List,
}

#[derive(Subcommand)]
enum ChannelCommand {
    /// Show channel metadata.
    Show { channel: String },
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Show a single node with its embedded sections.
    Show {
        channel: String,
        node: String,
        #[arg(long)]
        skip: Option<String>,
    },
    /// List nodes of a channel, optionally filtered by substring.
    List {
        channel: String,
        #[arg(long)]
        title_contains: Option<String>,
        #[arg(long)]
        description_contains: Option<String>,
        #[arg(long)]
        skip: Option<String>,
    },
    /// List the files owned by a node.
    Files { channel: String, node: String },
    /// Topic ancestors of a node, root first.
    Ancestors { channel: String, node: String },
    /// Direct children in sibling order.
    Children { channel: String, node: String },
    /// Every leaf in the subtree, document order.
    Leaves { channel: String, node: String },
    /// Transitive prerequisite closure.
    Prerequisites { channel: String, node: String },
    /// Directly related nodes.
    Related { channel: String, node: String },
    /// Files in the subtree that cannot currently be served.
    MissingFiles { channel: String, node: String },
}

#[derive(Debug)]
struct CliError {
    exit: ExitCode,
    message: String,
}

impl CliError {
    fn new(exit: ExitCode, message: impl Into<String>) -> Self {
        Self {
            exit,
            message: message.into(),
        }
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        let exit = match map_error(&err).status_code {
            400 | 404 => ExitCode::Validation,
            _ => ExitCode::Internal,
        };
        Self::new(exit, err.to_string())
    }
}

impl From<coppice_store::StoreError> for CliError {
    fn from(err: coppice_store::StoreError) -> Self {
        let exit = match err.code {
            StoreErrorCode::Validation | StoreErrorCode::Conflict => ExitCode::Validation,
            StoreErrorCode::Io | StoreErrorCode::Sql => ExitCode::DependencyFailure,
            _ => ExitCode::Internal,
        };
        Self::new(exit, err.to_string())
    }
}

fn main() -> ProcessExitCode {
    init_tracing();
    match run() {
        Ok(()) => ProcessExitCode::from(ExitCode::Success as u8),
        Err(err) => {
            eprintln!("{}", err.message);
            ProcessExitCode::from(err.exit as u8)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(ENV_COPPICE_LOG)
        .unwrap_or_else(|_| EnvFilter::new("coppice=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let data_root = cli.data_root.clone().unwrap_or_else(resolve_data_root);

    match cli.command {
        Commands::Import { manifest, blobs } => run_import(&data_root, &manifest, blobs.as_deref()),
        Commands::Channels {
            command: ChannelsCommand::List,
        } => {
            let service = CatalogService::new(data_root);
            let channels = ChannelListDto {
                channels: service.list_channels()?,
            };
            emit(cli.json, &serde_json::to_value(channels).map_err(internal)?)
        }
        Commands::Channel {
            command: ChannelCommand::Show { channel },
        } => {
            let service = CatalogService::new(data_root);
            let channel = service.get_channel(&channel)?;
            emit(cli.json, &serde_json::to_value(channel).map_err(internal)?)
        }
        Commands::Node { command } => run_node(cli.json, data_root, command),
    }
}

fn run_node(as_json: bool, data_root: PathBuf, command: NodeCommand) -> Result<(), CliError> {
    let service = CatalogService::new(data_root);
    let no_skip = BTreeSet::new();
    let value = match command {
        NodeCommand::Show {
            channel,
            node,
            skip,
        } => {
            let skip = parse_skip_flag(skip.as_deref())?;
            serde_json::to_value(service.get_node(&channel, &node, &skip)?).map_err(internal)?
        }
        NodeCommand::List {
            channel,
            title_contains,
            description_contains,
            skip,
        } => {
            let params = NodeListParams {
                filter: NodeFilter {
                    title_contains,
                    description_contains,
                },
                skip: parse_skip_flag(skip.as_deref())?,
            };
            node_list(service.list_nodes(&channel, &params)?)?
        }
        NodeCommand::Files { channel, node } => file_list(service.list_files(&channel, &node)?)?,
        NodeCommand::Ancestors { channel, node } => {
            node_list(service.ancestor_topics(&channel, &node, &no_skip)?)?
        }
        NodeCommand::Children { channel, node } => {
            node_list(service.immediate_children(&channel, &node, &no_skip)?)?
        }
        NodeCommand::Leaves { channel, node } => {
            node_list(service.leaves(&channel, &node, &no_skip)?)?
        }
        NodeCommand::Prerequisites { channel, node } => {
            node_list(service.all_prerequisites(&channel, &node, &no_skip)?)?
        }
        NodeCommand::Related { channel, node } => {
            node_list(service.all_related(&channel, &node, &no_skip)?)?
        }
        NodeCommand::MissingFiles { channel, node } => {
            file_list(service.missing_files(&channel, &node)?)?
        }
    };
    emit(as_json, &value)
}

fn node_list(nodes: Vec<coppice_api::NodeDto>) -> Result<Value, CliError> {
    serde_json::to_value(NodeListDto { nodes }).map_err(internal)
}

fn file_list(files: Vec<coppice_api::FileDto>) -> Result<Value, CliError> {
    serde_json::to_value(FileListDto { files }).map_err(internal)
}

fn run_import(
    data_root: &std::path::Path,
    manifest_path: &std::path::Path,
    blobs: Option<&std::path::Path>,
) -> Result<(), CliError> {
    let bytes = fs::read(manifest_path).map_err(|e| {
        CliError::new(
            ExitCode::Usage,
            format!("cannot read manifest {}: {e}", manifest_path.display()),
        )
    })?;
    let manifest: ChannelManifest = serde_json::from_slice(&bytes).map_err(|e| {
        CliError::new(
            ExitCode::Validation,
            format!("malformed manifest {}: {e}", manifest_path.display()),
        )
    })?;

    let partition = import_channel(data_root, &manifest)?;
    tracing::info!(
        channel = manifest.channel.id.as_str(),
        path = %partition.display(),
        "channel imported"
    );

    let mut staged = 0usize;
    if let Some(blob_dir) = blobs {
        for file in &manifest.files {
            let source = blob_dir.join(file.blob_name());
            if !source.is_file() {
                tracing::warn!(file = file.id.as_str(), "blob payload not provided, skipping");
                continue;
            }
            let bytes = fs::read(&source).map_err(|e| {
                CliError::new(
                    ExitCode::DependencyFailure,
                    format!("cannot read blob {}: {e}", source.display()),
                )
            })?;
            stage_blob(data_root, &manifest.channel.id, file, &bytes)?;
            staged += 1;
        }
    }

    println!(
        "imported channel {} ({} nodes, {} files, {staged} blobs staged)",
        manifest.channel.id,
        manifest.nodes.len(),
        manifest.files.len()
    );
    Ok(())
}

fn parse_skip_flag(raw: Option<&str>) -> Result<BTreeSet<SkipField>, CliError> {
    match raw {
        Some(raw) => Ok(parse_skip(raw)?),
        None => Ok(BTreeSet::new()),
    }
}

fn emit(as_json: bool, value: &Value) -> Result<(), CliError> {
    let rendered = if as_json {
        serde_json::to_string(value).map_err(internal)?
    } else {
        serde_json::to_string_pretty(value).map_err(internal)?
    };
    println!("{rendered}");
    Ok(())
}

fn internal(err: serde_json::Error) -> CliError {
    CliError::new(ExitCode::Internal, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use coppice_api::ApiErrorCode;

    const MANIFEST_JSON: &str = r#"{
      "channel": {"id": "demo", "name": "Demo", "root_id": "root"},
      "nodes": [
        {"id": "root", "channel_id": "demo", "kind": "topic", "title": "Root",
         "description": "", "parent_id": null, "sort_order": 0,
         "prerequisite_ids": [], "related_ids": []},
        {"id": "intro", "channel_id": "demo", "kind": "leaf", "title": "Intro",
         "description": "", "parent_id": "root", "sort_order": 0,
         "prerequisite_ids": [], "related_ids": []}
      ],
      "files": []
    }"#;

    #[test]
    fn import_reads_a_json_manifest_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, MANIFEST_JSON).expect("write manifest");
        let data_root = dir.path().join("data");

        run_import(&data_root, &manifest_path, None).expect("import");
        assert!(data_root.join("demo").join("channel.sqlite").exists());

        let err = run_import(&data_root, &manifest_path, None).expect_err("reimport");
        assert_eq!(err.exit, ExitCode::Validation);
    }

    #[test]
    fn missing_manifest_is_a_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run_import(dir.path(), &dir.path().join("absent.json"), None)
            .expect_err("missing manifest");
        assert_eq!(err.exit, ExitCode::Usage);
    }

    #[test]
    fn malformed_manifest_is_a_validation_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest_path = dir.path().join("manifest.json");
        fs::write(&manifest_path, b"{\"channel\": 7}").expect("write manifest");
        let err =
            run_import(dir.path(), &manifest_path, None).expect_err("malformed manifest");
        assert_eq!(err.exit, ExitCode::Validation);
    }

    #[test]
    fn command_output_wraps_collections_in_their_envelope() {
        let value = node_list(Vec::new()).expect("node envelope");
        assert_eq!(value, serde_json::json!({ "nodes": [] }));

        let value = file_list(Vec::new()).expect("file envelope");
        assert_eq!(value, serde_json::json!({ "files": [] }));
    }

    #[test]
    fn api_errors_map_onto_process_exit_codes() {
        let not_found = ApiError::new(
            ApiErrorCode::ChannelNotFound,
            "channel history not found",
            serde_json::Value::Null,
        );
        assert_eq!(CliError::from(not_found).exit, ExitCode::Validation);

        let internal = ApiError::new(
            ApiErrorCode::Internal,
            "partition corrupt",
            serde_json::Value::Null,
        );
        assert_eq!(CliError::from(internal).exit, ExitCode::Internal);
    }
}
