#![forbid(unsafe_code)]

mod convert;
mod dto;
mod error;
mod error_mapping;
mod params;
mod service;

pub use convert::{channel_dto, file_dto, node_dto};
pub use dto::{ChannelDto, ChannelListDto, FileDto, FileListDto, NodeDto, NodeListDto};
pub use error::{ApiError, ApiErrorCode};
pub use error_mapping::{map_error, ApiErrorMapping};
pub use params::{parse_node_list_params, parse_skip, NodeListParams, SkipField, ALLOWED_SKIP};
pub use service::CatalogService;

pub const CRATE_NAME: &str = "coppice-api";
