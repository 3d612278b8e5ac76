#![forbid(unsafe_code)]
//! Coppice model SSOT.

mod channel;
mod file;
mod ids;
mod node;

pub use channel::{Channel, CHANNEL_NAME_MAX_LEN};
pub use file::{File, CHECKSUM_LEN, EXTENSION_MAX_LEN};
pub use ids::{ChannelId, FileId, NodeId, ValidationError, ID_MAX_LEN};
pub use node::{ContentNode, NodeKind, TITLE_MAX_LEN};

pub const CRATE_NAME: &str = "coppice-model";
